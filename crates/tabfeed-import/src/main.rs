//! tabfeed-import - command-line front end for the import pipeline

use std::path::PathBuf;
use std::process;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tabfeed_common::config::Settings;
use tabfeed_common::logging::{init_logging, LogConfig, LogLevel};
use tabfeed_common::types::{ImportRequest, ProgressEvent};
use tabfeed_common::{Result, TabfeedError};
use tabfeed_import::{run_import, ClusterMonitor, ElasticClient, ParserRegistry};
use tokio::sync::mpsc;
use tracing::error;

/// Import a CSV or Excel file into an Elasticsearch index.
#[derive(Parser, Debug)]
#[command(name = "tabfeed-import", version, about)]
struct Cli {
    /// File to import (.csv, .xlsx or .xls)
    file: PathBuf,

    /// Target index name
    index: String,

    /// Type-mapping name written into the bulk action headers
    #[arg(long, default_value = "default")]
    mapping: String,

    /// 1-based row number of the header row
    #[arg(long, default_value_t = 1)]
    offset: u32,

    /// Delete the target index before importing
    #[arg(long)]
    clear: bool,

    /// Base URL of the Elasticsearch cluster
    #[arg(long, env = "TABFEED_ELASTIC_URL", default_value = tabfeed_common::config::DEFAULT_ELASTIC_URL)]
    elastic_url: String,

    /// Request timeout in seconds
    #[arg(long, env = "TABFEED_TIMEOUT_SECS", default_value_t = tabfeed_common::config::DEFAULT_TIMEOUT_SECS)]
    timeout: u64,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Suppress the progress bar
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::with_level(LogLevel::Debug)
    } else {
        LogConfig::from_env().unwrap_or_default()
    };
    let _ = init_logging(&log_config);

    if let Err(e) = run(&cli).await {
        error!(error = %e, "import failed");
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let settings = Settings {
        elastic_url: cli.elastic_url.clone(),
        timeout_secs: cli.timeout,
    };
    let client = ElasticClient::new(&settings)?;

    // One probe before any parsing: a dead cluster fails the run up front
    // instead of after the file has been validated.
    let monitor = ClusterMonitor::spawn(client.clone());
    match monitor.first_status().await {
        Some(status) if status.reachable => {
            if !cli.quiet {
                if let Some(version) = &status.version {
                    eprintln!("Connected to Elasticsearch {}", version);
                }
            }
        },
        _ => {
            monitor.shutdown();
            return Err(TabfeedError::ElasticResponse(format!(
                "cluster at {} is not reachable",
                settings.elastic_url()
            )));
        },
    }
    monitor.shutdown();

    let file_name = cli
        .file
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| TabfeedError::InvalidFileName(cli.file.display().to_string()))?;

    let request = ImportRequest::new(&cli.file, file_name, &cli.index)
        .with_mapping(&cli.mapping)
        .with_header_offset(cli.offset)
        .with_clear_existing(cli.clear);

    let registry = ParserRegistry::with_builtins();

    let (sender, receiver) = mpsc::channel::<ProgressEvent>(16);
    let reporter = if cli.quiet {
        tokio::spawn(drain_progress(receiver))
    } else {
        tokio::spawn(render_progress(receiver))
    };

    let summary = run_import(&registry, &client, &request, Some(&sender)).await;
    drop(sender);
    let _ = reporter.await;

    let summary = summary?;
    println!(
        "Imported {} row(s) into '{}' in {} batch(es)",
        summary.rows_written, summary.index, summary.batches
    );
    Ok(())
}

async fn render_progress(mut receiver: mpsc::Receiver<ProgressEvent>) {
    let mut bar: Option<ProgressBar> = None;

    while let Some(event) = receiver.recv().await {
        let bar = bar.get_or_insert_with(|| {
            let pb = ProgressBar::new(event.rows_total as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta})")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            pb.set_message("Importing rows".to_string());
            pb
        });
        bar.set_position(event.rows_submitted as u64);
    }

    if let Some(bar) = bar {
        bar.finish_and_clear();
    }
}

async fn drain_progress(mut receiver: mpsc::Receiver<ProgressEvent>) {
    while receiver.recv().await.is_some() {}
}
