use crate::{
    Result,
    choice::ChoiceMapper,
    gql::{
        GraphQlTransport,
        escape_gql_string,
    },
    mirror::RefreshOutcome,
    model::{
        Choice,
        default_player_name,
    },
    session::Session,
    sync::Synchronizer,
};
use sps_store::{
    KeyValueStore,
    PersistedState,
};
use std::{
    collections::HashSet,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
    },
};
use tracing::{
    info,
    warn,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The room is our own chain; hosts stay where they are.
    OwnRoom,
    AlreadyJoined,
    Joined,
}

/// Issues match mutations for the local player and refreshes the mirror
/// after each one.
pub struct GameClient<T, S> {
    session: Session,
    sync: Arc<Synchronizer<T, S>>,
    choices: ChoiceMapper,
    state: Mutex<PersistedState<S>>,
    joined_rooms: Mutex<HashSet<String>>,
}

impl<T: GraphQlTransport, S: KeyValueStore> GameClient<T, S> {
    pub fn new(session: Session, sync: Arc<Synchronizer<T, S>>, state: PersistedState<S>) -> Self {
        Self {
            session,
            sync,
            choices: ChoiceMapper::new(),
            state: Mutex::new(state),
            joined_rooms: Mutex::new(HashSet::new()),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn sync(&self) -> &Arc<Synchronizer<T, S>> {
        &self.sync
    }

    fn state(&self) -> MutexGuard<'_, PersistedState<S>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn joined_rooms(&self) -> MutexGuard<'_, HashSet<String>> {
        self.joined_rooms
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// The stored display name, or `Player-<chain prefix>` when none is set.
    pub fn player_name(&self) -> String {
        match self.state().player_name() {
            Ok(Some(name)) => name,
            Ok(None) => default_player_name(self.session.chain_id()),
            Err(err) => {
                warn!(?err, "failed to read player name");
                default_player_name(self.session.chain_id())
            }
        }
    }

    pub fn set_player_name(&self, name: &str) -> Result<()> {
        self.state().set_player_name(name.trim())?;
        Ok(())
    }

    /// Uses `name` when it is non-blank (remembering it), the stored name
    /// otherwise.
    fn resolve_name(&self, name: Option<&str>) -> Result<String> {
        match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => {
                self.set_player_name(name)?;
                Ok(name.to_string())
            }
            None => Ok(self.player_name()),
        }
    }

    async fn mutate(&self, mutation: String) -> Result<RefreshOutcome> {
        self.sync.transport().execute(&mutation).await?;
        Ok(self.sync.refresh().await)
    }

    pub async fn create_match(&self, name: Option<&str>) -> Result<RefreshOutcome> {
        let name = self.resolve_name(name)?;
        info!(%name, "creating match");
        self.mutate(format!(
            r#"mutation {{ createMatch(hostName: "{}") }}"#,
            escape_gql_string(&name)
        ))
        .await
    }

    pub async fn join_match(&self, host_chain_id: &str, name: Option<&str>) -> Result<RefreshOutcome> {
        let name = self.resolve_name(name)?;
        info!(%host_chain_id, %name, "joining match");
        self.mutate(format!(
            r#"mutation {{ joinMatch(hostChainId: "{}", playerName: "{}") }}"#,
            escape_gql_string(host_chain_id.trim()),
            escape_gql_string(&name)
        ))
        .await
    }

    /// Asks the matchmaker chain to pair us with another searching player.
    pub async fn search_player(&self, name: Option<&str>) -> Result<RefreshOutcome> {
        let name = self.resolve_name(name)?;
        info!(%name, matchmaker = %self.session.matchmaker_chain_id(), "searching for a player");
        self.mutate(format!(
            r#"mutation {{ searchPlayer(orchestratorChainId: "{}", playerName: "{}") }}"#,
            escape_gql_string(self.session.matchmaker_chain_id()),
            escape_gql_string(&name)
        ))
        .await
    }

    pub async fn pick_and_ready(&self, choice: Choice) -> Result<RefreshOutcome> {
        info!(%choice, "picking");
        self.choices.submit(self.sync.transport(), choice).await?;
        Ok(self.sync.refresh().await)
    }

    pub async fn leave_match(&self) -> Result<RefreshOutcome> {
        info!("leaving match");
        let outcome = self.mutate("mutation { leaveMatch }".to_string()).await?;
        self.joined_rooms().clear();
        Ok(outcome)
    }

    /// Joins `room_id` unless it is our own chain or was already joined. A
    /// failed join can be retried.
    pub async fn join_room(&self, room_id: &str, name: Option<&str>) -> Result<JoinOutcome> {
        let room_id = room_id.trim();
        if room_id == self.session.chain_id() {
            return Ok(JoinOutcome::OwnRoom);
        }
        if !self.joined_rooms().insert(room_id.to_string()) {
            return Ok(JoinOutcome::AlreadyJoined);
        }
        match self.join_match(room_id, name).await {
            Ok(_) => Ok(JoinOutcome::Joined),
            Err(err) => {
                self.joined_rooms().remove(room_id);
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::{
        Error,
        test_helpers::{
            TEST_CHAIN_ID,
            TestContext,
            view_json,
        },
    };
    use serde_json::json;
    use sps_store::InMemoryStore;

    fn client(ctx: &TestContext) -> GameClient<crate::test_helpers::FakeTransport, InMemoryStore> {
        GameClient::new(ctx.session(), ctx.sync.clone(), ctx.persisted())
    }

    #[tokio::test]
    async fn player_name__defaults_to_chain_prefix_then_remembers() {
        // given
        let ctx = TestContext::new();
        let client = client(&ctx);
        let default = client.player_name();

        // when
        client.set_player_name("  Zed ").unwrap();

        // then
        assert_eq!(default, format!("Player-{TEST_CHAIN_ID}"));
        assert_eq!(client.player_name(), "Zed");
        assert_eq!(ctx.persisted().player_name().unwrap().as_deref(), Some("Zed"));
    }

    #[tokio::test]
    async fn create_match__escapes_name_and_refreshes() {
        // given
        let ctx = TestContext::new();
        ctx.transport.respond_to("createMatch", Ok(json!({ "createMatch": null })));
        ctx.transport.serve_view(view_json(0, 0, None));
        let client = client(&ctx);

        // when
        let outcome = client.create_match(Some("A \"quoted\" name")).await.unwrap();

        // then
        assert_eq!(outcome, RefreshOutcome::Updated);
        assert_eq!(
            ctx.transport.requests()[0],
            r#"mutation { createMatch(hostName: "A \"quoted\" name") }"#
        );
        assert_eq!(client.player_name(), "A \"quoted\" name");
    }

    #[tokio::test]
    async fn search_player__targets_matchmaker_chain() {
        // given
        let ctx = TestContext::new();
        ctx.transport.respond_to("searchPlayer", Ok(json!({})));
        ctx.transport.serve_view(view_json(0, 0, None));
        let client = client(&ctx);

        // when
        client.search_player(None).await.unwrap();

        // then
        assert_eq!(
            ctx.transport.requests()[0],
            r#"mutation { searchPlayer(orchestratorChainId: "MM", playerName: "Player-C1") }"#
        );
    }

    #[tokio::test]
    async fn mutation__failure_propagates_without_refresh() {
        // given
        let ctx = TestContext::new();
        ctx.transport
            .respond_to("leaveMatch", Err(Error::GraphQl(vec!["not in a match".into()])));
        let client = client(&ctx);

        // when
        let result = client.leave_match().await;

        // then
        assert_eq!(result.unwrap_err().to_string(), "not in a match");
        assert_eq!(ctx.transport.match_queries(), 0);
    }

    #[tokio::test]
    async fn join_room__own_chain_is_a_no_op() {
        // given
        let ctx = TestContext::new();
        let client = client(&ctx);

        // when
        let outcome = client.join_room(TEST_CHAIN_ID, None).await.unwrap();

        // then
        assert_eq!(outcome, JoinOutcome::OwnRoom);
        assert!(ctx.transport.requests().is_empty());
    }

    #[tokio::test]
    async fn join_room__joins_each_room_once() {
        // given
        let ctx = TestContext::new();
        ctx.transport.respond_to("joinMatch", Ok(json!({})));
        ctx.transport.serve_view(view_json(0, 0, None));
        let client = client(&ctx);

        // when
        let first = client.join_room("C2", Some("Bo")).await.unwrap();
        let second = client.join_room("C2", Some("Bo")).await.unwrap();

        // then
        assert_eq!(first, JoinOutcome::Joined);
        assert_eq!(second, JoinOutcome::AlreadyJoined);
        assert_eq!(ctx.transport.count_matching("joinMatch"), 1);
    }

    #[tokio::test]
    async fn join_room__failed_join_can_be_retried() {
        // given
        let ctx = TestContext::new();
        ctx.transport
            .respond_once("joinMatch", Err(Error::Transport("timeout".into())));
        ctx.transport.respond_to("joinMatch", Ok(json!({})));
        ctx.transport.serve_view(view_json(0, 0, None));
        let client = client(&ctx);

        // when
        let failed = client.join_room("C2", None).await;
        let retried = client.join_room("C2", None).await.unwrap();

        // then
        assert!(failed.is_err());
        assert_eq!(retried, JoinOutcome::Joined);
        assert_eq!(ctx.transport.count_matching("joinMatch"), 2);
    }
}
