use crate::{
    gql::GraphQlTransport,
    mirror::{
        RefreshOutcome,
        StateMirror,
    },
    notification::{
        Notification,
        NotificationSource,
    },
    watermark::HeightGate,
};
use sps_store::KeyValueStore;
use std::{
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
        atomic::{
            AtomicBool,
            Ordering,
        },
    },
    time::Duration,
};
use tokio::{
    sync::oneshot,
    task::JoinHandle,
    time::{
        self,
        Instant,
    },
};
use tracing::{
    debug,
    info,
    warn,
};

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(150);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2500);

#[derive(Clone, Copy, Debug)]
pub struct SyncConfig {
    /// Window in which bursts of new-block notifications collapse into one
    /// trailing refresh.
    pub debounce: Duration,
    /// Backstop refresh period while the gate is unlocked.
    pub poll_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Owns the mirror together with the height gate guarding it.
pub struct Synchronizer<T, S> {
    transport: T,
    gate: Mutex<HeightGate<S>>,
    mirror: StateMirror,
    alive: AtomicBool,
}

impl<T: GraphQlTransport, S: KeyValueStore> Synchronizer<T, S> {
    pub fn new(transport: T, gate: HeightGate<S>) -> Self {
        Self {
            transport,
            gate: Mutex::new(gate),
            mirror: StateMirror::new(),
            alive: AtomicBool::new(true),
        }
    }

    fn gate(&self) -> MutexGuard<'_, HeightGate<S>> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn mirror(&self) -> &StateMirror {
        &self.mirror
    }

    pub fn is_unlocked(&self) -> bool {
        self.gate().is_unlocked()
    }

    pub fn watermark(&self) -> u64 {
        self.gate().watermark()
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// After this every refresh and notification is ignored.
    pub fn shut_down(&self) {
        self.alive.store(false, Ordering::Release);
    }

    /// Refreshes the mirror, or resets it while the gate is locked.
    pub async fn refresh(&self) -> RefreshOutcome {
        if !self.is_alive() {
            return RefreshOutcome::Skipped;
        }
        if !self.is_unlocked() {
            self.mirror.reset();
            return RefreshOutcome::Locked;
        }
        self.mirror.refresh(&self.transport).await
    }

    /// Feeds a notification's height to the gate. Returns true when a
    /// refresh should be scheduled for it.
    pub fn handle_notification(&self, notification: &Notification) -> bool {
        if !self.is_alive() {
            return false;
        }
        let mut gate = self.gate();
        match notification.height() {
            Some(height) => {
                gate.observe(height);
            }
            None => debug!("notification without a usable height"),
        }
        notification.is_new_block() && gate.is_unlocked()
    }
}

/// Handle on a running sync worker. Dropping it stops the worker.
pub struct SyncHandle {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// Stops the worker, abandoning any refresh still waiting on the network.
    pub async fn shutdown(self) {
        let _ = self.stop.send(());
        if let Err(err) = self.task.await {
            warn!(?err, "sync worker ended abnormally");
        }
    }
}

pub fn spawn_sync_worker<T, S, N>(
    sync: Arc<Synchronizer<T, S>>,
    notifications: N,
    config: SyncConfig,
) -> SyncHandle
where
    T: GraphQlTransport + 'static,
    S: KeyValueStore + 'static,
    N: NotificationSource + 'static,
{
    let (stop, stop_rx) = oneshot::channel();
    let task = tokio::spawn(sync_worker(sync, notifications, config, stop_rx));
    SyncHandle { stop, task }
}

async fn sync_worker<T, S, N>(
    sync: Arc<Synchronizer<T, S>>,
    mut notifications: N,
    config: SyncConfig,
    mut stop: oneshot::Receiver<()>,
) where
    T: GraphQlTransport,
    S: KeyValueStore,
    N: NotificationSource,
{
    let mut ticker = time::interval(config.poll_interval);
    ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
    let debounce = time::sleep(config.debounce);
    tokio::pin!(debounce);
    let mut debounce_armed = false;
    let mut notifications_open = true;

    if !sync.is_unlocked() {
        sync.mirror().reset();
    }
    info!(watermark = sync.watermark(), "sync worker started");

    loop {
        let refresh_due = tokio::select! {
            _ = ticker.tick() => sync.is_unlocked(),
            () = &mut debounce, if debounce_armed => {
                debounce_armed = false;
                true
            }
            notification = notifications.next_notification(), if notifications_open => {
                match notification {
                    Some(notification) => {
                        if sync.handle_notification(&notification) && !debounce_armed {
                            debounce.as_mut().reset(Instant::now() + config.debounce);
                            debounce_armed = true;
                        }
                    }
                    None => {
                        warn!("notification stream closed; relying on periodic refresh");
                        notifications_open = false;
                    }
                }
                false
            }
            _ = &mut stop => break,
        };
        if refresh_due {
            tokio::select! {
                _ = sync.refresh() => {}
                _ = &mut stop => {
                    debug!("stopping with a refresh in flight");
                    break;
                }
            }
        }
    }

    sync.shut_down();
    info!("sync worker stopped");
}
