//! Relaydeck: transparent record/replay API proxy entry point.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tikv_jemallocator::Jemalloc;
use tracing::{error, info, warn};

use relaydeck_proxy::{
    export_import::{self, MergeStrategy},
    reload::wait_for_shutdown_signal,
    Cli, Command, Dispatcher,
};

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

const DEFAULT_CONFIG_PATH: &str = "relaydeck.toml";
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run(cli))
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.clone().unwrap_or_else(|| DEFAULT_CONFIG_PATH.into());
    let config = relaydeck_config::load(&config_path)
        .with_context(|| format!("loading configuration from {}", config_path.display()))?;

    let validation = relaydeck_config::validate_config(&config);
    for warning in &validation.warnings {
        warn!(message = %warning.message, "configuration warning");
    }
    if !validation.is_ok() {
        for error in &validation.errors {
            error!(category = ?error.category, message = %error.message, "configuration error");
        }
        anyhow::bail!("invalid configuration, refusing to start");
    }

    let pool = relaydeck_store::create_pool(&format!("sqlite://{}", config.database.path)).await?;
    let store = relaydeck_store::Store::new(pool);

    match cli.command.unwrap_or_default() {
        Command::Serve | Command::Web => serve(&config, store).await,
        Command::Replay { session, target_host, target_port, protocol } => {
            replay(&config, &store, &session, &target_host, target_port, &protocol).await
        }
        Command::Export { session, out } => export(&store, &session, &out).await,
        Command::Import { file, strategy } => import(&store, &file, &strategy).await,
        Command::ListSessions => list_sessions(&store).await,
        Command::Clear { session } => clear(&store, session.as_deref()).await,
    }
}

async fn serve(config: &relaydeck_config::Config, store: relaydeck_store::Store) -> Result<()> {
    let http_addr: SocketAddr = ([0, 0, 0, 0], config.server.listen_port).into();
    let grpc_addr: SocketAddr = ([0, 0, 0, 0], config.server.grpc_port_or_default()).into();

    let dispatcher = Dispatcher::build(config, store, grpc_addr, DRAIN_TIMEOUT).await?;

    let http_task = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { dispatcher.serve_http(http_addr).await })
    };
    let grpc_task = {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { dispatcher.serve_grpc(grpc_addr).await })
    };

    info!(%http_addr, %grpc_addr, "relaydeck serving");

    wait_for_shutdown_signal().await;
    dispatcher.reload.request_shutdown();
    info!("shutdown signal received, draining in-flight requests");
    dispatcher.reload.wait_for_drain().await;

    http_task.abort();
    grpc_task.abort();
    Ok(())
}

fn convert_validation_strategy(strategy: relaydeck_config::ValidationStrategy) -> relaydeck_engine::ValidationStrategy {
    match strategy {
        relaydeck_config::ValidationStrategy::Exact => relaydeck_engine::ValidationStrategy::Exact,
        relaydeck_config::ValidationStrategy::Fuzzy => relaydeck_engine::ValidationStrategy::Fuzzy,
        relaydeck_config::ValidationStrategy::StatusCode => relaydeck_engine::ValidationStrategy::StatusCode,
    }
}

async fn replay(
    config: &relaydeck_config::Config,
    store: &relaydeck_store::Store,
    session_name: &str,
    target_host: &str,
    target_port: u16,
    protocol: &str,
) -> Result<()> {
    let session = store.get_session(session_name).await?;
    let interactions = store.get_interactions_by_session(session.id).await?;

    let client = reqwest::Client::builder().build()?;
    let engine = relaydeck_engine::ReplayEngine::new(
        client,
        convert_validation_strategy(config.replay.validation_strategy),
        config.replay.fail_fast,
        config.replay.max_concurrency,
        config.replay.ignore_timestamps,
        Duration::from_secs(config.replay.timeout_seconds),
        config.replay.grpc_max_message_size,
    );

    let report = if protocol.eq_ignore_ascii_case("grpc") {
        let target = relaydeck_engine::GrpcReplayTarget { host: target_host.to_string(), port: target_port };
        engine.replay_grpc_session(session_name, &target, interactions).await?
    } else {
        let scheme = if protocol.eq_ignore_ascii_case("https") { "https" } else { "http" };
        let target = relaydeck_engine::ReplayTarget { base_url: format!("{scheme}://{target_host}:{target_port}") };
        engine.replay_session(session_name, &target, interactions).await
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.failure_count > 0 {
        std::process::exit(1);
    }
    Ok(())
}

async fn export(store: &relaydeck_store::Store, session_name: &str, out: &std::path::Path) -> Result<()> {
    let doc = export_import::export_session(store, session_name).await?;
    let json = serde_json::to_string_pretty(&doc)?;
    tokio::fs::write(out, json).await?;
    info!(session = session_name, path = %out.display(), "exported session");
    Ok(())
}

async fn import(store: &relaydeck_store::Store, file: &std::path::Path, strategy: &str) -> Result<()> {
    let contents = tokio::fs::read_to_string(file).await?;
    let doc: export_import::ExportDocument = serde_json::from_str(&contents)?;
    let strategy = if strategy.eq_ignore_ascii_case("replace") { MergeStrategy::Replace } else { MergeStrategy::Append };
    let session_id = export_import::import_document(store, &doc, strategy).await?;
    info!(?session_id, path = %file.display(), "imported session");
    Ok(())
}

async fn list_sessions(store: &relaydeck_store::Store) -> Result<()> {
    let sessions = store.list_sessions().await?;
    println!("{}", serde_json::to_string_pretty(&sessions)?);
    Ok(())
}

async fn clear(store: &relaydeck_store::Store, session: Option<&str>) -> Result<()> {
    match session {
        Some(name) => {
            store.clear_session(name).await?;
            info!(session = name, "cleared session");
        }
        None => {
            store.clear_all().await?;
            info!("cleared all sessions");
        }
    }
    Ok(())
}
