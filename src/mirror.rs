use crate::{
    gql::{
        GraphQlTransport,
        MATCH_VIEW_QUERY,
    },
    model::{
        FinalResult,
        MatchView,
    },
};
use std::sync::{
    Arc,
    Mutex,
    PoisonError,
    atomic::{
        AtomicBool,
        Ordering,
    },
};
use tokio::sync::watch;
use tracing::{
    debug,
    info,
    warn,
};

/// A published mirror value. `version` increases on every change.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MirrorSnapshot {
    pub version: u64,
    pub view: MatchView,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The query succeeded and the view changed.
    Updated,
    /// The query succeeded but returned what was already mirrored.
    Unchanged,
    /// Another refresh was in flight; no request was issued.
    Skipped,
    /// The query failed; the error text became the last notification.
    Failed,
    /// The sync gate is locked; the view was reset instead.
    Locked,
}

struct Inner {
    view: watch::Sender<MirrorSnapshot>,
    final_result: Mutex<Option<FinalResult>>,
    in_flight: AtomicBool,
}

/// Local copy of the application's match state. Cloning shares the mirror.
#[derive(Clone)]
pub struct StateMirror {
    inner: Arc<Inner>,
}

struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Default for StateMirror {
    fn default() -> Self {
        Self::new()
    }
}

impl StateMirror {
    pub fn new() -> Self {
        let (view, _) = watch::channel(MirrorSnapshot::default());
        Self {
            inner: Arc::new(Inner {
                view,
                final_result: Mutex::new(None),
                in_flight: AtomicBool::new(false),
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<MirrorSnapshot> {
        self.inner.view.subscribe()
    }

    pub fn view(&self) -> MatchView {
        self.inner.view.borrow().view.clone()
    }

    pub fn version(&self) -> u64 {
        self.inner.view.borrow().version
    }

    pub fn final_result(&self) -> Option<FinalResult> {
        self.inner
            .final_result
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Keeps `result` unless it equals the one already recorded. Returns true
    /// when the recorded value changed.
    pub fn record_final_result(&self, result: FinalResult) -> bool {
        if !result.is_terminal() {
            return false;
        }
        let mut guard = self
            .inner
            .final_result
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if guard.as_ref() == Some(&result) {
            return false;
        }
        info!(?result, "recorded final result");
        *guard = Some(result);
        true
    }

    /// Replaces the whole view. Subscribers are only woken when it differs.
    pub fn apply(&self, view: MatchView) -> bool {
        if let Some(result) = view.final_result() {
            self.record_final_result(result);
        }
        self.replace_with(|current| *current = view)
    }

    /// Clears live match state. The last notification and the recorded final
    /// result are kept.
    pub fn reset(&self) -> bool {
        self.replace_with(|current| {
            let last_notification = current.last_notification.take();
            *current = MatchView {
                last_notification,
                ..MatchView::default()
            };
        })
    }

    fn note_error(&self, message: String) -> bool {
        self.replace_with(|current| current.last_notification = Some(message))
    }

    fn replace_with(&self, update: impl FnOnce(&mut MatchView)) -> bool {
        self.inner.view.send_if_modified(|snapshot| {
            let mut next = snapshot.view.clone();
            update(&mut next);
            if next == snapshot.view {
                return false;
            }
            snapshot.view = next;
            snapshot.version += 1;
            true
        })
    }

    /// Runs the batched match query and mirrors the result. Overlapping calls
    /// return [`RefreshOutcome::Skipped`] without touching the network.
    pub async fn refresh<T: GraphQlTransport>(&self, transport: &T) -> RefreshOutcome {
        if self
            .inner
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("refresh already in flight; skipping");
            return RefreshOutcome::Skipped;
        }
        let _guard = InFlight(&self.inner.in_flight);

        let fetched = match transport.execute(MATCH_VIEW_QUERY).await {
            Ok(data) => serde_json::from_value::<MatchView>(data).map_err(crate::Error::from),
            Err(err) => Err(err),
        };
        match fetched {
            Ok(view) => {
                if self.apply(view) {
                    RefreshOutcome::Updated
                } else {
                    RefreshOutcome::Unchanged
                }
            }
            Err(err) => {
                warn!(error = %err, "match refresh failed");
                self.note_error(err.to_string());
                RefreshOutcome::Failed
            }
        }
    }
}
