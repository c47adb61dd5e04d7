use clap::Parser;
use pipeline::{Mode, Pipeline};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod pipeline;

#[derive(Debug, Parser)]
#[command(name = "pagefeed_worker")]
struct Args {
    /// Which page family to refresh.
    #[arg(value_enum)]
    pipeline: Pipeline,

    #[arg(long, value_enum, default_value_t = Mode::Run)]
    mode: Mode,

    /// Snapshot JSON path. Defaults to the pipeline's usual location.
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Documents to patch; repeatable. Defaults to the pipeline's usual pages.
    #[arg(long = "target")]
    targets: Vec<PathBuf>,

    /// Fetch and compute everything but write nothing to disk.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = pagefeed_core::config::Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let args = Args::parse();

    let mut cfg = args.pipeline.default_config();
    if let Some(path) = args.snapshot {
        cfg.snapshot_path = path;
    }
    if !args.targets.is_empty() {
        cfg.targets = args.targets;
    }

    let started = chrono::Utc::now();
    tracing::info!(
        pipeline = ?args.pipeline,
        mode = ?args.mode,
        dry_run = args.dry_run,
        %started,
        "page refresh started"
    );

    let summary = match pipeline::run(&settings, args.pipeline, args.mode, &cfg, args.dry_run, started).await {
        Ok(summary) => summary,
        Err(err) => {
            sentry_anyhow::capture_anyhow(&err);
            tracing::error!(pipeline = ?args.pipeline, error = %format!("{err:#}"), "page refresh failed");
            return Err(err);
        }
    };

    tracing::info!(
        pipeline = ?args.pipeline,
        entities = summary.entities,
        written = summary.written.len(),
        failed = summary.failed.len(),
        stale_anchors = summary.stale_anchors,
        "page refresh finished"
    );

    if !summary.failed.is_empty() {
        let failed = summary
            .failed
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        let err = anyhow::anyhow!("failed to update: {failed}");
        sentry_anyhow::capture_anyhow(&err);
        return Err(err);
    }

    Ok(())
}

fn init_sentry(settings: &pagefeed_core::config::Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}
