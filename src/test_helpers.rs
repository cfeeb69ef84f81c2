use crate::{
    Error,
    Result,
    gql::GraphQlTransport,
    notification::Notification,
    session::Session,
    sync::{
        SyncConfig,
        SyncHandle,
        Synchronizer,
        spawn_sync_worker,
    },
    watermark::HeightGate,
};
use serde_json::{
    Value,
    json,
};
use sps_store::{
    InMemoryStore,
    PersistedState,
};
use std::{
    sync::{
        Arc,
        Mutex,
    },
    time::Duration,
};
use tokio::sync::{
    Semaphore,
    mpsc,
};

pub const TEST_CHAIN_ID: &str = "C1";
pub const TEST_APPLICATION_ID: &str = "app";
pub const MATCH_QUERY_MARKER: &str = "lastNotification";

enum Scripted {
    Data(Value),
    GraphQl(Vec<String>),
    Transport(String),
}

impl Scripted {
    fn from_result(result: Result<Value>) -> Self {
        match result {
            Ok(value) => Scripted::Data(value),
            Err(Error::GraphQl(messages)) => Scripted::GraphQl(messages),
            Err(other) => Scripted::Transport(other.to_string()),
        }
    }

    fn to_result(&self) -> Result<Value> {
        match self {
            Scripted::Data(value) => Ok(value.clone()),
            Scripted::GraphQl(messages) => Err(Error::GraphQl(messages.clone())),
            Scripted::Transport(message) => Err(Error::Transport(message.clone())),
        }
    }
}

struct Rule {
    pattern: String,
    response: Scripted,
    once: bool,
}

#[derive(Default)]
struct FakeState {
    rules: Vec<Rule>,
    requests: Vec<String>,
    gates: Vec<(String, Arc<Semaphore>)>,
}

/// Scripted GraphQL transport. Responses are matched by substring; one-shot
/// responses win over standing ones and the most recent standing response
/// wins among those.
#[derive(Clone, Default)]
pub struct FakeTransport {
    state: Arc<Mutex<FakeState>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond_to(&self, pattern: &str, response: Result<Value>) {
        self.push_rule(pattern, response, false);
    }

    pub fn respond_once(&self, pattern: &str, response: Result<Value>) {
        self.push_rule(pattern, response, true);
    }

    fn push_rule(&self, pattern: &str, response: Result<Value>, once: bool) {
        self.state.lock().unwrap().rules.push(Rule {
            pattern: pattern.to_string(),
            response: Scripted::from_result(response),
            once,
        });
    }

    /// Answers the batched match query with `view`.
    pub fn serve_view(&self, view: Value) {
        self.respond_to(MATCH_QUERY_MARKER, Ok(view));
    }

    /// Requests containing `pattern` wait until the returned semaphore gets a
    /// permit.
    pub fn hold(&self, pattern: &str) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.state
            .lock()
            .unwrap()
            .gates
            .push((pattern.to_string(), gate.clone()));
        gate
    }

    pub fn requests(&self) -> Vec<String> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn count_matching(&self, pattern: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .requests
            .iter()
            .filter(|r| r.contains(pattern))
            .count()
    }

    pub fn match_queries(&self) -> usize {
        self.count_matching(MATCH_QUERY_MARKER)
    }

    fn answer(&self, query: &str) -> Result<Value> {
        let mut state = self.state.lock().unwrap();
        if let Some(pos) = state
            .rules
            .iter()
            .position(|r| r.once && query.contains(&r.pattern))
        {
            let rule = state.rules.remove(pos);
            return rule.response.to_result();
        }
        state
            .rules
            .iter()
            .rev()
            .find(|r| !r.once && query.contains(&r.pattern))
            .map(|r| r.response.to_result())
            .unwrap_or_else(|| Err(Error::Transport(format!("no scripted response for {query}"))))
    }
}

impl GraphQlTransport for FakeTransport {
    async fn execute(&self, query: &str) -> Result<Value> {
        let gate = {
            let mut state = self.state.lock().unwrap();
            state.requests.push(query.to_string());
            state
                .gates
                .iter()
                .find(|(pattern, _)| query.contains(pattern))
                .map(|(_, gate)| gate.clone())
        };
        if let Some(gate) = gate {
            gate.acquire()
                .await
                .map_err(|_| Error::Transport("held request abandoned".into()))?
                .forget();
        }
        self.answer(query)
    }
}

/// A match view as the application would return it.
pub fn view_json(my_score: u32, opponent_score: u32, last_round: Option<u32>) -> Value {
    let record = last_round.map(|round| {
        json!({
            "round": round,
            "hostChoice": "STONE",
            "guestChoice": "SCISSORS",
            "outcome": "HOST_WINS",
            "hostScore": my_score,
            "guestScore": opponent_score,
            "timestamp": "1700000000000000"
        })
    });
    json!({
        "game": {
            "matchId": "match-1",
            "hostChainId": TEST_CHAIN_ID,
            "status": "ACTIVE",
            "players": [
                { "chainId": TEST_CHAIN_ID, "name": "Ann" },
                { "chainId": "C2", "name": "Bo" }
            ],
            "round": last_round.unwrap_or(0) + 1,
            "hostScore": my_score,
            "guestScore": opponent_score,
            "lastOutcome": null,
            "winnerChainId": null,
            "history": []
        },
        "matchStatus": "ACTIVE",
        "isHost": true,
        "opponentChainId": "C2",
        "myReady": false,
        "opponentReady": false,
        "myChoice": null,
        "opponentChoice": null,
        "myScore": my_score,
        "opponentScore": opponent_score,
        "lastRoundRecord": record,
        "roundHistory": [],
        "lastNotification": null
    })
}

/// What the application answers while this chain has no game: every
/// game-derived field is null.
pub fn no_game_json(last_notification: Option<&str>) -> Value {
    json!({
        "game": null,
        "matchStatus": null,
        "isHost": false,
        "opponentChainId": null,
        "myReady": false,
        "opponentReady": false,
        "myChoice": null,
        "opponentChoice": null,
        "myScore": null,
        "opponentScore": null,
        "lastRoundRecord": null,
        "roundHistory": [],
        "lastNotification": last_notification
    })
}

pub struct TestContext {
    pub transport: FakeTransport,
    pub store: InMemoryStore,
    pub sync: Arc<Synchronizer<FakeTransport, InMemoryStore>>,
}

impl TestContext {
    pub fn new() -> Self {
        Self::new_with_entries(Vec::<(String, String)>::new())
    }

    /// Context whose store is pre-seeded, e.g. with a persisted sync height.
    pub fn new_with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let transport = FakeTransport::new();
        let store = InMemoryStore::new_with_entries(entries);
        let gate = HeightGate::load(TEST_CHAIN_ID, PersistedState::new(store.clone()));
        let sync = Arc::new(Synchronizer::new(transport.clone(), gate));
        Self {
            transport,
            store,
            sync,
        }
    }

    pub fn with_sync_height(height: u64) -> Self {
        Self::new_with_entries([(format!("sync_height:{TEST_CHAIN_ID}"), height.to_string())])
    }

    pub fn session(&self) -> Session {
        Session::new(TEST_CHAIN_ID, "00".repeat(32), TEST_APPLICATION_ID, "MM", "http://faucet")
    }

    pub fn persisted(&self) -> PersistedState<InMemoryStore> {
        PersistedState::new(self.store.clone())
    }

    /// Spawns the sync worker fed by the returned notification sender.
    pub fn spawn_worker(&self) -> (SyncHandle, mpsc::UnboundedSender<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = spawn_sync_worker(self.sync.clone(), rx, SyncConfig::default());
        (handle, tx)
    }

    pub fn spawn_worker_with(
        &self,
        debounce: Duration,
        poll_interval: Duration,
    ) -> (SyncHandle, mpsc::UnboundedSender<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let config = SyncConfig {
            debounce,
            poll_interval,
        };
        let handle = spawn_sync_worker(self.sync.clone(), rx, config);
        (handle, tx)
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}
