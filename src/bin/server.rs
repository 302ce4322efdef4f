use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;

use anyhow::{bail, Context, Result};
use clap::Parser;
use loothound_server::app::{AppOptions, Application};
use loothound_server::config::{self, Args};
use loothound_server::constants::{SERVER_ADDRESS, SERVER_PORT};
use loothound_server::db::Database;
use loothound_server::logger;
use loothound_server::server::{self, ServerState, SharedState};
use tokio::sync::Mutex;

const DB_URL_ENV_NAME: &str = "GAME_DB_URL";

#[tokio::main]
async fn main() {
    let args = Args::parse();
    match run(args).await {
        Ok(()) => logger::server_exited(0),
        Err(error) => {
            logger::server_exited_with_error(&error);
            std::process::exit(1);
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let (mut game, extra) = config::load_game(&args.config_file)?;
    game.set_random_spawn(args.randomize_spawn_points);

    if !args.www_root.is_dir() {
        bail!("static files root {} not found", args.www_root.display());
    }

    let db_url = std::env::var(DB_URL_ENV_NAME)
        .with_context(|| format!("{DB_URL_ENV_NAME} environment variable not found"))?;
    let num_threads = thread::available_parallelism()
        .map(|count| count.get() as u32)
        .unwrap_or(1);
    let db = Database::connect(num_threads, &db_url).await?;

    let mut app = Application::new(
        game,
        db,
        AppOptions {
            manual_tick: args.tick_period.is_none(),
            state_file: args.state_file.clone(),
            save_period_ms: args.save_state_period,
        },
    );
    app.restore_state()?;

    let state: SharedState = Arc::new(Mutex::new(ServerState { app, extra }));
    if let Some(period_ms) = args.tick_period {
        server::start_tick_loop(state.clone(), period_ms);
    }

    let router = server::router(state.clone(), args.www_root.clone());
    let bind_addr = format!("{SERVER_ADDRESS}:{SERVER_PORT}");
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    logger::server_started(SERVER_ADDRESS, SERVER_PORT);
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server runtime failed")?;

    // One final snapshot before exit.
    let guard = state.lock().await;
    guard.app.save_state()?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };
    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
