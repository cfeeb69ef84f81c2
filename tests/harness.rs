#![allow(non_snake_case)]

use serde_json::json;
use sps_client::{
    Error,
    client::{
        GameClient,
        JoinOutcome,
    },
    model::{
        Choice,
        MatchStatus,
        RevealLabel,
    },
    notification::Notification,
    reveal::{
        RevealAnimator,
        RevealEvent,
        RevealTimings,
    },
    test_helpers::*,
};
use sps_store::InMemoryStore;
use std::time::Duration;
use tokio::time;

const UNKNOWN_PAPER: &str = r#"enumeration type "Choice" does not contain the value "Paper""#;

fn client(ctx: &TestContext) -> GameClient<FakeTransport, InMemoryStore> {
    GameClient::new(ctx.session(), ctx.sync.clone(), ctx.persisted())
}

fn enum_names(names: &[&str]) -> serde_json::Value {
    let values: Vec<_> = names.iter().map(|n| json!({ "name": n })).collect();
    json!({ "__type": { "enumValues": values } })
}

#[tokio::test(start_paused = true)]
async fn match__rounds_are_revealed_and_final_result_survives_leaving() {
    // given
    let ctx = TestContext::new();
    ctx.transport.respond_to("createMatch", Ok(json!({})));
    ctx.transport.respond_to("leaveMatch", Ok(json!({})));
    ctx.transport.serve_view(view_json(0, 0, None));
    let client = client(&ctx);
    let (worker, blocks) = ctx.spawn_worker();
    let (mut animator, mut events) =
        RevealAnimator::new(ctx.sync.mirror().clone(), RevealTimings::default());
    client.create_match(Some("Ann")).await.unwrap();

    // when
    ctx.transport.serve_view(view_json(3, 1, Some(4)));
    blocks.send(Notification::new_block(1)).unwrap();
    time::sleep(Duration::from_millis(200)).await;
    animator.observe(&ctx.sync.mirror().view()).await;
    time::sleep(Duration::from_secs(4)).await;

    // then
    assert_eq!(ctx.sync.mirror().view().my_score, 3);
    assert_eq!(events.recv().await, Some(RevealEvent::Finished { round: 4 }));
    let Some(RevealEvent::NavigateToResult(result)) = events.recv().await else {
        panic!("expected navigation to the result view");
    };
    assert!(result.did_win());

    // when
    ctx.transport.serve_view(no_game_json(None));
    client.leave_match().await.unwrap();

    // then
    assert_eq!(ctx.sync.mirror().view().game, None);
    assert_eq!(ctx.sync.mirror().final_result(), Some(result));
    worker.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn restart__waits_for_persisted_height_before_mirroring() {
    // given
    let first = TestContext::new();
    first.transport.serve_view(view_json(0, 0, None));
    first.sync.handle_notification(&Notification::new_block(10));
    let persisted = first.store.entries().lock().unwrap().clone();

    let ctx = TestContext::new_with_entries(persisted);
    ctx.transport.serve_view(view_json(1, 0, Some(1)));
    let (worker, blocks) = ctx.spawn_worker();

    // when
    blocks.send(Notification::new_block(9)).unwrap();
    time::sleep(Duration::from_millis(300)).await;
    let while_behind = ctx.transport.match_queries();
    blocks.send(Notification::new_block(10)).unwrap();
    time::sleep(Duration::from_millis(300)).await;

    // then
    assert_eq!(while_behind, 0);
    assert_eq!(ctx.transport.match_queries(), 1);
    assert_eq!(ctx.sync.mirror().view().my_score, 1);
    worker.shutdown().await;
}

#[tokio::test]
async fn pick_and_ready__retries_once_with_refreshed_names() {
    // given
    let ctx = TestContext::new();
    ctx.transport
        .respond_once("__type", Ok(enum_names(&["Stone", "Paper", "Scissors"])));
    ctx.transport
        .respond_to("__type", Ok(enum_names(&["STONE", "PAPER", "SCISSORS"])));
    ctx.transport.respond_to(
        "pickAndReady(choice: Paper)",
        Err(Error::GraphQl(vec![UNKNOWN_PAPER.into()])),
    );
    ctx.transport
        .respond_to("pickAndReady(choice: PAPER)", Ok(json!({})));
    ctx.transport.serve_view(view_json(0, 0, None));
    let client = client(&ctx);

    // when
    client.pick_and_ready(Choice::Paper).await.unwrap();

    // then
    assert_eq!(ctx.transport.count_matching("pickAndReady"), 2);
    assert_eq!(ctx.transport.count_matching("__type"), 2);
    assert_eq!(ctx.transport.match_queries(), 1);
}

#[tokio::test]
async fn pick_and_ready__second_rejection_returns_first_error() {
    // given
    let ctx = TestContext::new();
    ctx.transport
        .respond_to("__type", Ok(enum_names(&["Stone", "Paper", "Scissors"])));
    ctx.transport.respond_once(
        "pickAndReady",
        Err(Error::GraphQl(vec![UNKNOWN_PAPER.into()])),
    );
    ctx.transport.respond_to(
        "pickAndReady",
        Err(Error::GraphQl(vec!["second failure".into()])),
    );
    let client = client(&ctx);

    // when
    let err = client.pick_and_ready(Choice::Paper).await.unwrap_err();

    // then
    assert!(err.is_unknown_enum_value());
    assert_eq!(ctx.transport.count_matching("pickAndReady"), 2);
    assert_eq!(ctx.transport.match_queries(), 0);
}

#[tokio::test(start_paused = true)]
async fn match_found__guest_joins_announced_host_once() {
    // given
    let ctx = TestContext::new();
    ctx.transport.respond_to("searchPlayer", Ok(json!({})));
    ctx.transport.respond_to("joinMatch", Ok(json!({})));
    let mut announced = view_json(0, 0, None);
    announced["lastNotification"] = json!("Match found. Host: C7");
    announced["matchStatus"] = json!("WAITING_FOR_PLAYER");
    ctx.transport.serve_view(announced);
    let client = client(&ctx);

    // when
    client.search_player(Some("Bo")).await.unwrap();
    let view = ctx.sync.mirror().view();
    let host = view.match_found_host().unwrap().to_string();
    client.join_room(&host, None).await.unwrap();
    client.join_room(&host, None).await.unwrap();

    // then
    assert_eq!(view.match_status, Some(MatchStatus::WaitingForPlayer));
    assert_eq!(host, "C7");
    assert_eq!(ctx.transport.count_matching("joinMatch"), 1);
    assert!(
        ctx.transport
            .requests()
            .iter()
            .any(|r| r.contains(r#"joinMatch(hostChainId: "C7", playerName: "Bo")"#))
    );
}

#[tokio::test]
async fn search_player__guest_without_game_sees_announced_host() {
    // given
    let ctx = TestContext::new();
    ctx.transport.respond_to("searchPlayer", Ok(json!({})));
    ctx.transport.respond_to("joinMatch", Ok(json!({})));
    ctx.transport
        .serve_view(no_game_json(Some("Match found. Host: C7")));
    let client = client(&ctx);

    // when
    client.search_player(Some("Bo")).await.unwrap();
    let view = ctx.sync.mirror().view();
    let joined = client
        .join_room(view.match_found_host().unwrap(), None)
        .await
        .unwrap();

    // then
    assert_eq!(view.game, None);
    assert_eq!(view.match_found_host(), Some("C7"));
    assert_eq!(joined, JoinOutcome::Joined);
}

#[tokio::test(start_paused = true)]
async fn reveal__guest_sees_loss_for_host_win() {
    // given
    let ctx = TestContext::new();
    let mut raw = view_json(0, 1, Some(1));
    raw["isHost"] = json!(false);
    ctx.transport.serve_view(raw);
    let (mut animator, _events) =
        RevealAnimator::new(ctx.sync.mirror().clone(), RevealTimings::default());
    let frames = animator.subscribe_frames();

    // when
    ctx.sync.refresh().await;
    animator.observe(&ctx.sync.mirror().view()).await;
    time::sleep(Duration::from_millis(1500)).await;

    // then
    assert_eq!(frames.borrow().label, Some(RevealLabel::Lose));
}
