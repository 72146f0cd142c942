use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, info_span, warn, Instrument};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

mod aggregate;
mod breakdown;
mod cache;
mod config;
mod error;
mod export;
mod models;
mod periods;
mod pipeline;
mod report;
mod snapshot;
mod states;
mod timestamps;
mod transactions;

use cache::SnapshotCache;
use config::{Settings, DEFAULT_BUCKET, DEFAULT_KEY, MAX_TTL_SECS};
use models::{Granularity, ReportView};
use pipeline::RenderRequest;
use transactions::InvalidRowPolicy;

#[derive(Parser)]
#[command(name = "fraud-report")]
#[command(about = "Fraud detection report over scored payment snapshots", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SourceArgs {
    /// Bucket holding the scored snapshot
    #[arg(long, env = "AIRFLOW_S3_BUCKET", default_value = DEFAULT_BUCKET)]
    bucket: String,
    /// Object key of the scored snapshot
    #[arg(long, default_value = DEFAULT_KEY)]
    key: String,
    /// Read a local parquet snapshot instead of the bucket
    #[arg(long)]
    file: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = Granularity::Day)]
    granularity: Granularity,
    /// What to do with rows whose prediction or amount is unusable
    #[arg(long, value_enum, default_value_t = InvalidRowPolicy::Reject)]
    on_invalid: InvalidRowPolicy,
    /// Refetch the snapshot once it is older than this
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..=MAX_TTL_SECS))]
    cache_ttl_secs: Option<u64>,
}

impl SourceArgs {
    fn into_settings(self) -> Settings {
        Settings {
            bucket: self.bucket,
            key: self.key,
            file: self.file,
            granularity: self.granularity,
            policy: self.on_invalid,
            cache_ttl: Settings::cache_ttl_from_secs(self.cache_ttl_secs),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Render the HTML report and the fraud export
    Report {
        #[command(flatten)]
        source: SourceArgs,
        #[arg(long, default_value = ".")]
        out: PathBuf,
        /// Also write the computed view as report.json
        #[arg(long)]
        json: bool,
    },
    /// Print the KPIs and the fraud rate per period
    Summary {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Re-render on commands read from stdin (hour, day, week, month, reload, render, quit)
    Explore {
        #[command(flatten)]
        source: SourceArgs,
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },
}

fn env_bool(name: &str, default: bool) -> bool {
    std::env::var(name)
        .ok()
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(default)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    if env_bool("FRAUD_REPORT_LOG_JSON", false) {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer.json())
            .init();
    } else {
        tracing_subscriber::registry().with(filter).with(layer).init();
    }
}

async fn render(
    cache: &mut SnapshotCache,
    settings: &Settings,
    granularity: Granularity,
    out: Option<&Path>,
    json: bool,
) -> anyhow::Result<ReportView> {
    let render_id = Uuid::new_v4();
    let span = info_span!("render", %render_id, granularity = granularity.label());
    render_view(cache, settings, granularity, render_id, out, json)
        .instrument(span)
        .await
}

async fn render_view(
    cache: &mut SnapshotCache,
    settings: &Settings,
    granularity: Granularity,
    render_id: Uuid,
    out: Option<&Path>,
    json: bool,
) -> anyhow::Result<ReportView> {
    let now = Utc::now();
    let table = cache.get_or_fetch(now).await?;
    debug!(fetched_at = ?cache.fetched_at(), "snapshot ready");

    let location = cache.source().location();
    let request = RenderRequest {
        source: &location,
        granularity,
        policy: settings.policy,
        generated_at: now,
        render_id,
    };
    let view = pipeline::run(&table, &request)?;

    if let Some(dir) = out {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
        let html_path = dir.join("report.html");
        std::fs::write(&html_path, report::build_report(&view))
            .with_context(|| format!("failed to write {}", html_path.display()))?;
        export::export_to_dir(dir, &table, &view.frauds)?;
        if json {
            let json_path = dir.join("report.json");
            std::fs::write(&json_path, serde_json::to_string_pretty(&view)?)
                .with_context(|| format!("failed to write {}", json_path.display()))?;
        }
        info!(dir = %dir.display(), frauds = view.frauds.len(), "report written");
    }

    Ok(view)
}

async fn explore(settings: Settings, out: PathBuf) -> anyhow::Result<()> {
    let mut cache = settings.cache().await;
    let mut granularity = settings.granularity;

    let view = render(&mut cache, &settings, granularity, Some(out.as_path()), false).await?;
    print!("{}", report::build_summary(&view));
    println!("Commands: hour | day | week | month | reload | render | quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = line.trim();
        match command {
            "" => continue,
            "quit" | "exit" => break,
            "reload" => cache.invalidate(),
            "render" => {}
            other => match Granularity::from_str(other, true) {
                Ok(selected) => granularity = selected,
                Err(_) => {
                    warn!(command = other, "unknown command");
                    continue;
                }
            },
        }

        match render(&mut cache, &settings, granularity, Some(out.as_path()), false).await {
            Ok(view) => {
                print!("{}", report::build_summary(&view));
                print!("{}", report::build_series_listing(&view.series));
            }
            Err(err) => eprintln!("render failed: {err:#}"),
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Report { source, out, json } => {
            let settings = source.into_settings();
            let mut cache = settings.cache().await;
            let view = render(
                &mut cache,
                &settings,
                settings.granularity,
                Some(out.as_path()),
                json,
            )
            .await?;
            print!("{}", report::build_summary(&view));
            println!("Report written to {}.", out.display());
        }
        Commands::Summary { source } => {
            let settings = source.into_settings();
            let mut cache = settings.cache().await;
            let view = render(&mut cache, &settings, settings.granularity, None, false).await?;
            print!("{}", report::build_summary(&view));
            print!("{}", report::build_series_listing(&view.series));
        }
        Commands::Explore { source, out } => {
            explore(source.into_settings(), out).await?;
        }
    }

    Ok(())
}
