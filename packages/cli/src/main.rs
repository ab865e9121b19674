use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use actors::{BatchHandle, DownloadReport, ResultDispatcher};
use anyhow::{Context, Result, anyhow};
use batch_core::{BatchReport, DispatchMode, EntrySummary, PipelineConfig, SourceFile};
use clap::Parser;
use serde::Serialize;
use storage::{OutputConfig, OutputStore};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;
use transforms::{TransformOptions, builtin_registry};

#[derive(Parser)]
#[command(name = "batchkit")]
#[command(about = "Run a transform over a batch of files and download the results", long_about = None)]
struct Cli {
    /// Files to process, in order
    #[arg(required_unless_present = "list_transforms")]
    files: Vec<PathBuf>,

    /// Transform to apply
    #[arg(short, long, default_value = "identity")]
    transform: String,

    /// Download directory (overrides OUTPUT_DIR)
    #[arg(short, long)]
    out_dir: Option<PathBuf>,

    /// JPEG quality for to-jpeg and resize
    #[arg(long, default_value_t = 80, value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: u8,

    /// Longest edge in pixels for resize
    #[arg(long, default_value_t = 1920)]
    max_edge: u32,

    /// Pause between downloads (overrides BATCH_DOWNLOAD_DELAY_MS)
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Per-file transform timeout (overrides BATCH_TRANSFORM_TIMEOUT_SECS)
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Save all results at once instead of one by one
    #[arg(long)]
    parallel: bool,

    /// Print the outcome as JSON
    #[arg(long)]
    json: bool,

    /// List available transforms and exit
    #[arg(long)]
    list_transforms: bool,
}

#[derive(Serialize)]
struct RunSummary<'a> {
    report: &'a BatchReport,
    entries: Vec<EntrySummary>,
    downloads: &'a DownloadReport,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    match run(Cli::parse()).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn pipeline_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::from_env()?;
    if let Some(delay_ms) = cli.delay_ms {
        config = config.with_download_delay_ms(delay_ms);
    }
    if let Some(secs) = cli.timeout_secs {
        config.transform_timeout_secs = (secs > 0).then_some(secs);
    }
    if cli.parallel {
        config = config.with_dispatch_mode(DispatchMode::Parallel);
    }
    Ok(config)
}

fn output_config(cli: &Cli) -> Result<OutputConfig> {
    let env = OutputConfig::from_env()?;
    Ok(match &cli.out_dir {
        Some(dir) => OutputConfig {
            prefix: env.prefix,
            ..OutputConfig::filesystem(dir)
        },
        None => env,
    })
}

async fn read_sources(paths: &[PathBuf]) -> Result<Vec<SourceFile>> {
    let mut sources = Vec::with_capacity(paths.len());
    for path in paths {
        let content = tokio::fs::read(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow!("{} has no file name", path.display()))?;
        sources.push(SourceFile::new(name, content));
    }
    Ok(sources)
}

/// Returns whether every file was processed and downloaded.
async fn run(cli: Cli) -> Result<bool> {
    let registry = builtin_registry(&TransformOptions {
        jpeg_quality: cli.quality,
        max_edge: cli.max_edge,
    });

    if cli.list_transforms {
        for name in registry.names() {
            println!("{name}");
        }
        return Ok(true);
    }

    let transform = registry.resolve(&cli.transform)?;

    let config = pipeline_config(&cli)?;
    let output = OutputStore::new(output_config(&cli)?).await?;
    let sources = read_sources(&cli.files).await?;

    let (batch, join) = BatchHandle::start(config).await?;

    let mut events = batch.subscribe().await?;
    let progress = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => tracing::info!("{}", event.description()),
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!("Progress output skipped {} events", missed)
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    batch.add_files(sources).await?;
    let report = batch.run_batch(transform).await?;
    let entries = batch.entries().await?;

    let dispatcher = ResultDispatcher::new(batch.clone(), Arc::new(output));
    let downloads = dispatcher.download_all().await?;

    if cli.json {
        let summary = RunSummary {
            report: &report,
            entries: entries.iter().map(|e| e.summary()).collect(),
            downloads: &downloads,
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        for entry in &entries {
            let detail = match (entry.download_name(), entry.error_message()) {
                (Some(name), _) => format!("-> {name}"),
                (None, Some(message)) => format!("({message})"),
                (None, None) => String::new(),
            };
            println!("{:<10} {} {}", entry.kind().label(), entry.name, detail);
        }
        println!(
            "{} done, {} failed, {} downloaded in {}ms",
            report.done,
            report.failed,
            downloads.delivered.len(),
            report.duration_ms
        );
    }

    batch.shutdown()?;
    let _ = join.await;
    progress.abort();

    Ok(report.failed == 0 && downloads.failed.is_empty())
}
