use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use tokio::sync::OnceCell;
use tracing::{error, info, warn};

use ordoro_sync::config::Config;
use ordoro_sync::ordoro::OrdoroClient;
use ordoro_sync::sync::{self, SyncOptions};
use ordoro_sync::warehouse::{self, SnowflakeSink, SqliteSink};
use ordoro_sync::{Result, SyncError};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Copy Ordoro inventory and products into Snowflake, then exit"
)]
struct Args {
    /// Fetch and transform only; write nothing
    #[arg(long)]
    dry_run: bool,

    /// Load into this SQLite file instead of Snowflake
    #[arg(long, value_name = "PATH", conflicts_with = "dry_run")]
    sqlite: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Before logging init so RUST_LOG may come from .env too.
    let dotenv_result = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    if let Err(err) = dotenv_result {
        if !err.not_found() {
            warn!(error = %err, "ignoring unreadable .env file");
        }
    }

    let started = Instant::now();
    match execute(&args).await {
        Ok(()) => {
            info!(elapsed = %sync::format_elapsed(started.elapsed()), "done");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, elapsed = %sync::format_elapsed(started.elapsed()), "sync failed");
            ExitCode::from(err.exit_code())
        }
    }
}

async fn execute(args: &Args) -> Result<()> {
    let cfg = Config::from_env()?;
    info!(ordoro = ?cfg.ordoro, snowflake = ?cfg.snowflake, "configuration loaded");

    let limit = cfg.run.timeout;
    let deadline = async move {
        match limit {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending::<()>().await,
        }
    };

    // Outside the `select!` so an aborted run still logs out.
    let session = OnceCell::new();
    let res = tokio::select! {
        res = run_job(&cfg, args, &session) => res,
        _ = shutdown_signal() => Err(SyncError::Aborted("received shutdown signal")),
        _ = deadline => Err(SyncError::Aborted("wall-clock limit reached")),
    };
    if let Some(sink) = session.get() {
        sink.close().await;
    }
    res
}

async fn run_job(cfg: &Config, args: &Args, session: &OnceCell<SnowflakeSink>) -> Result<()> {
    let client = OrdoroClient::new(&cfg.ordoro)?;
    let opts = SyncOptions::from_config(&cfg.ordoro);

    // Every page is read before anything is written.
    let snapshot = sync::fetch_snapshot(&client, &opts).await?;

    if args.dry_run {
        info!(
            products = snapshot.products.len(),
            warehouse_rows = snapshot.inventory.len(),
            "dry run, nothing written"
        );
        return Ok(());
    }

    let report = match &args.sqlite {
        Some(path) => {
            let sink = SqliteSink::connect(&path.to_string_lossy()).await?;
            warehouse::load(&sink, &snapshot).await?
        }
        None => {
            let sink = session
                .get_or_try_init(|| SnowflakeSink::connect(&cfg.snowflake))
                .await?;
            warehouse::load(sink, &snapshot).await?
        }
    };
    info!(
        product_rows = report.product_rows,
        warehouse_rows = report.warehouse_rows,
        "sync completed"
    );
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
