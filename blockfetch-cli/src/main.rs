//! Blockfetch CLI - download content over parallel HTTP range requests.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use blockfetch::config::{DEFAULT_BLOCK_SIZE, DEFAULT_MAX_IN_FLIGHT, DEFAULT_MAX_RETRIES};
use blockfetch::{
    ContentClient, DownloadConfig, ProgressReceiver, ReqwestTransport, SourceEndpoint,
};

/// Download content over parallel HTTP range requests.
#[derive(Parser, Debug)]
#[command(name = "blockfetch", version = blockfetch::VERSION, about)]
struct Args {
    /// Source URL of the content.
    url: String,

    /// Destination file (defaults to the URL's last path segment).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write the content to stdout instead of a file.
    #[arg(long, conflicts_with = "output")]
    stdout: bool,

    /// Block size in bytes for parallel fetching.
    #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE)]
    block_size: u64,

    /// Maximum number of blocks fetched concurrently.
    #[arg(short = 'j', long, default_value_t = DEFAULT_MAX_IN_FLIGHT)]
    parallel: usize,

    /// Consecutive failures tolerated per stream before giving up.
    #[arg(long, default_value_t = DEFAULT_MAX_RETRIES)]
    retries: u32,

    /// Replace the destination file if it already exists.
    #[arg(long)]
    overwrite: bool,

    /// Suppress the progress bar and informational logging.
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Logs go to stderr so `--stdout` keeps the content stream clean.
    let filter = if args.quiet {
        EnvFilter::new("warn")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("blockfetch=info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(error) = run(args).await {
        eprintln!("error: {}", error);
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let endpoint = SourceEndpoint::parse(&args.url)?;
    let transport = Arc::new(ReqwestTransport::new()?);

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, cancelling download");
            interrupt.cancel();
        }
    });

    let config = DownloadConfig::default()
        .with_block_size(args.block_size)
        .with_max_in_flight(args.parallel)
        .with_max_retries(args.retries);
    let client = ContentClient::new(transport, config).with_cancellation(cancel);

    if args.stdout {
        let mut stdout = tokio::io::stdout();
        let summary = client.download_to(&endpoint, None, &mut stdout, None).await?;
        tracing::info!(bytes = summary.bytes_transferred, "Download finished");
        return Ok(());
    }

    let output = args
        .output
        .unwrap_or_else(|| default_output_name(&endpoint));

    let bar = (!args.quiet).then(transfer_bar);
    let progress: Option<ProgressReceiver> = bar.clone().map(|bar| -> ProgressReceiver {
        Box::new(move |total| bar.set_position(total))
    });

    let result = client
        .download_to_file(&endpoint, &output, args.overwrite, progress)
        .await;
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }
    let summary = result?;

    println!(
        "Fetched {} bytes in {} blocks -> {}",
        summary.bytes_transferred,
        summary.blocks,
        output.display()
    );
    Ok(())
}

/// Spinner showing cumulative transferred bytes; the total is unknown
/// until discovery, so no percentage bar.
fn transfer_bar() -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.green} {bytes} ({bytes_per_sec}) {wide_msg}")
            .expect("valid progress template"),
    );
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

fn default_output_name(endpoint: &SourceEndpoint) -> PathBuf {
    endpoint
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("download.bin"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output_name_from_url() {
        let endpoint = SourceEndpoint::parse("https://host.test/media/recording.mp4").unwrap();
        assert_eq!(default_output_name(&endpoint), PathBuf::from("recording.mp4"));
    }

    #[test]
    fn test_default_output_name_without_path() {
        let endpoint = SourceEndpoint::parse("https://host.test/").unwrap();
        assert_eq!(default_output_name(&endpoint), PathBuf::from("download.bin"));
    }

    #[test]
    fn test_args_parse_defaults() {
        let args = Args::parse_from(["blockfetch", "https://host.test/file.bin"]);
        assert_eq!(args.block_size, DEFAULT_BLOCK_SIZE);
        assert_eq!(args.parallel, DEFAULT_MAX_IN_FLIGHT);
        assert_eq!(args.retries, DEFAULT_MAX_RETRIES);
        assert!(!args.overwrite);
        assert!(!args.stdout);
    }

    #[test]
    fn test_args_reject_stdout_with_output() {
        let result = Args::try_parse_from([
            "blockfetch",
            "https://host.test/file.bin",
            "--stdout",
            "--output",
            "out.bin",
        ]);
        assert!(result.is_err());
    }
}
