use clap::Parser;
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use sps_client::{
    client::{
        GameClient,
        JoinOutcome,
    },
    command::{
        Command,
        HELP,
    },
    config::{
        AppConfig,
        Args,
    },
    gql::HttpTransport,
    mirror::MirrorSnapshot,
    model::{
        MatchView,
        result_scores,
    },
    notification::NodeHeightPoller,
    reveal::{
        AnimationState,
        RevealAnimator,
        RevealEvent,
        RevealTimings,
    },
    session::{
        NodeServiceConnector,
        Session,
    },
    sync::{
        SyncConfig,
        Synchronizer,
        spawn_sync_worker,
    },
    watermark::HeightGate,
};
use sps_store::{
    PersistedState,
    SledStore,
};
use std::{
    path::Path,
    sync::{
        Arc,
        OnceLock,
    },
    time::Duration,
};
use tokio::io::{
    AsyncBufReadExt,
    BufReader,
};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling,
};
use tracing_subscriber::{
    EnvFilter,
    fmt,
};

const TIP_POLL_INTERVAL: Duration = Duration::from_secs(1);

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

type Client = GameClient<HttpTransport, SledStore>;

fn init_tracing(log_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(log_dir)
        .wrap_err_with(|| format!("creating log dir {}", log_dir.display()))?;
    let appender = rolling::daily(log_dir, "sps-client.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = LOG_GUARD.set(guard);
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sps_client=info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|e| eyre!("installing tracing subscriber: {e}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let config = AppConfig::try_from(Args::parse()).wrap_err("invalid configuration")?;
    init_tracing(&config.log_dir)?;

    std::fs::create_dir_all(&config.data_dir)
        .wrap_err_with(|| format!("creating data dir {}", config.data_dir.display()))?;
    let store = SledStore::open(config.data_dir.join("state"))
        .map_err(|e| eyre!("opening client state: {e:#}"))?;
    let mut state = PersistedState::new(store);
    if let Some(name) = &config.player_name {
        state
            .set_player_name(name)
            .map_err(|e| eyre!("saving player name: {e:#}"))?;
    }

    let connector = NodeServiceConnector::new(&config.node_url)?;
    let session = Session::establish(&config.session, &mut state, &connector, |stage| {
        println!("{stage}")
    })
    .await
    .wrap_err("could not connect")?;

    let app = HttpTransport::for_application(
        &config.node_url,
        session.chain_id(),
        session.application_id(),
    )?;
    let node = HttpTransport::new(&config.node_url)?;
    let gate = HeightGate::load(session.chain_id(), state.clone());
    let sync = Arc::new(Synchronizer::new(app, gate));
    let poller = NodeHeightPoller::new(node, session.chain_id(), TIP_POLL_INTERVAL);
    let worker = spawn_sync_worker(sync.clone(), poller, SyncConfig::default());

    let client = GameClient::new(session, sync, state);
    println!("Chain {}", client.session().chain_id());
    println!("Playing as {}", client.player_name());
    println!("{HELP}");

    let res = run_loop(&client).await;
    worker.shutdown().await;
    tracing::info!("client stopped");
    res
}

async fn run_loop(client: &Client) -> Result<()> {
    let mirror = client.sync().mirror().clone();
    let mut views = mirror.subscribe();
    let (mut animator, mut reveal_events) =
        RevealAnimator::new(mirror.clone(), RevealTimings::default());
    let mut frames = animator.subscribe_frames();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.wrap_err("reading stdin")? else {
                    break;
                };
                match line.parse::<Command>() {
                    Ok(Command::Quit) => break,
                    Ok(command) => {
                        if let Err(err) = run_command(client, command).await {
                            tracing::warn!(%err, "command failed");
                            println!("Error: {err}");
                        }
                    }
                    Err(err) => println!("{err}"),
                }
            }
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = views.borrow_and_update().clone();
                render_view(client, &snapshot);
                animator.observe(&snapshot.view).await;
                if let Some(host) = snapshot.view.match_found_host() {
                    auto_join(client, host).await;
                }
            }
            changed = frames.changed() => {
                if changed.is_err() {
                    break;
                }
                let frame = frames.borrow_and_update().clone();
                render_frame(&frame);
            }
            Some(event) = reveal_events.recv() => match event {
                RevealEvent::Finished { round } => {
                    tracing::debug!(round, "reveal finished");
                    animator.observe(&mirror.view()).await;
                }
                RevealEvent::NavigateToResult(result) => {
                    let verdict = if result.did_win() { "You won!" } else { "You lost." };
                    println!(
                        "Match over: {} - {}. {verdict}",
                        result.my_score, result.opponent_score
                    );
                }
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received interrupt, exiting");
                break;
            }
        }
    }
    Ok(())
}

async fn auto_join(client: &Client, host: &str) {
    match client.join_room(host, None).await {
        Ok(JoinOutcome::Joined) => println!("Match found; joined {host}"),
        Ok(JoinOutcome::OwnRoom) => println!("Match found; waiting in your room"),
        Ok(JoinOutcome::AlreadyJoined) => {}
        Err(err) => {
            tracing::warn!(%err, %host, "auto-join failed");
            println!("Could not join {host}: {err}");
        }
    }
}

async fn run_command(client: &Client, command: Command) -> sps_client::Result<()> {
    match command {
        Command::Create { name } => {
            client.create_match(name.as_deref()).await?;
            println!("Match created; share your chain id {}", client.session().chain_id());
        }
        Command::Join { host, name } => {
            client.join_room(&host, name.as_deref()).await?;
        }
        Command::Search { name } => {
            client.search_player(name.as_deref()).await?;
            println!("Searching for an opponent...");
        }
        Command::Pick(choice) => {
            client.pick_and_ready(choice).await?;
            println!("Picked {choice}");
        }
        Command::Leave => {
            client.leave_match().await?;
            println!("Left the match");
        }
        Command::Status => print_status(client),
        Command::Name(name) => {
            client.set_player_name(&name)?;
            println!("Playing as {}", client.player_name());
        }
        Command::Help => println!("{HELP}"),
        Command::Quit => {}
    }
    Ok(())
}

fn print_status(client: &Client) {
    let session = client.session();
    let sync = client.sync();
    println!(
        "chain {} | app {} | faucet {} | synced to {}{}",
        session.chain_id(),
        session.application_id(),
        session.faucet_url(),
        sync.watermark(),
        if sync.is_unlocked() { "" } else { " (catching up)" },
    );
    let view = sync.mirror().view();
    describe_match(client, &view);
    let result = result_scores(sync.mirror().final_result().as_ref(), &view);
    if result.is_terminal() {
        println!("last result {} - {}", result.my_score, result.opponent_score);
    }
}

fn describe_match(client: &Client, view: &MatchView) {
    let Some(game) = &view.game else {
        println!("not in a match");
        return;
    };
    let opponent = view.opponent_name(client.session().chain_id());
    let status = view.match_status.unwrap_or(game.status);
    println!(
        "match {} ({status:?}) vs {opponent}: {} - {} | you {} | them {}",
        game.match_id,
        view.my_score,
        view.opponent_score,
        if view.my_ready { "ready" } else { "thinking" },
        if view.opponent_ready { "ready" } else { "thinking" },
    );
}

fn render_view(client: &Client, snapshot: &MirrorSnapshot) {
    tracing::debug!(version = snapshot.version, "match view changed");
    describe_match(client, &snapshot.view);
    if let Some(note) = &snapshot.view.last_notification {
        println!("> {note}");
    }
}

fn render_frame(frame: &AnimationState) {
    let Some(round) = frame.round else {
        return;
    };
    match frame.label {
        Some(label) if frame.show => println!("Round {round}: {label}"),
        _ if frame.rotate != 0 => tracing::trace!(round, rotate = frame.rotate, "wobble"),
        _ => {}
    }
}
