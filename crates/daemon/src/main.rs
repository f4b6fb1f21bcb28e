use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;
use wbo_backup_core::CycleOutcome;
use wbo_backup_daemon::config::{self, Config, Settings};
use wbo_backup_daemon::scheduler::scheduler_loop;
use wbo_backup_daemon::{build_router, AppState};
use wbo_backup_storage::{BackupEngine, FsBackupStore};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let (cfg, mode) = parse_args()?;
    let settings = Settings::resolve(&cfg)?;

    let store = FsBackupStore::new(&settings.board_dir, &settings.backup_dir);
    store.ensure_dirs().await?;
    store.remove_stale_partials().await?;
    let engine = Arc::new(BackupEngine::new(
        Arc::new(store),
        settings.enabled,
        settings.policy,
    ));

    match mode {
        Mode::RunOnce => run_once(&engine).await,
        Mode::Service => run_service(engine, &settings).await,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Scheduler plus HTTP API.
    Service,
    /// One cycle, then exit.
    RunOnce,
}

/// Reads `[--config <path>] [run-once]` and loads the config file if given.
fn parse_args() -> Result<(Config, Mode)> {
    let mut args = env::args().skip(1);
    let mut config_path: Option<PathBuf> = None;
    let mut mode = Mode::Service;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let Some(path) = args.next() else {
                    bail!("--config requires a path argument");
                };
                config_path = Some(PathBuf::from(path));
            }
            "run-once" => mode = Mode::RunOnce,
            other => bail!("unknown argument {other:?}, expected `--config <path>` or `run-once`"),
        }
    }

    let cfg = match config_path {
        Some(path) => {
            info!(?path, "loading config file");
            config::load_config(&path)?
        }
        None => Config::default(),
    };

    Ok((cfg, mode))
}

async fn run_once(engine: &Arc<BackupEngine>) -> Result<()> {
    match engine.run_cycle().await? {
        CycleOutcome::Completed(summary) => {
            info!(backed_up = summary.backed_up, deleted = summary.deleted, failed = summary.failed, "backup cycle complete")
        }
        CycleOutcome::Skipped(reason) => info!(?reason, "backup cycle skipped"),
    }
    Ok(())
}

async fn run_service(engine: Arc<BackupEngine>, settings: &Settings) -> Result<()> {
    if settings.enabled {
        tokio::spawn(scheduler_loop(Arc::clone(&engine), settings.cycle_interval));
    } else {
        info!("automatic backups disabled");
    }

    let state = AppState {
        engine,
        api_token: settings.api_token.clone(),
    };

    let addr: SocketAddr = settings
        .listen
        .parse()
        .with_context(|| format!("invalid listen address: {}", settings.listen))?;
    let app = build_router(state);

    info!(%addr, "starting backup daemon API server");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
