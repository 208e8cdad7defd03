use anyhow::Result;
use clap::{Parser, Subcommand};
use s3transport::transfer::PartSpec;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;

use cli::commands::{self, PutSource};

#[derive(Parser)]
#[command(name = "s3transport")]
#[command(version, about = "Signed S3 object transport with endpoint warm-up", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(long, global = true)]
    config: Option<String>,

    /// Profile to use from config
    #[arg(long, global = true)]
    profile: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Disable SSL certificate verification
    #[arg(long, global = true)]
    insecure: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload an object or part
    Put {
        /// Object key
        key: String,

        /// File to upload
        #[arg(long, conflicts_with = "size")]
        file: Option<PathBuf>,

        /// Size of a random payload (e.g., 1024, 64K, 10M)
        #[arg(long, default_value = "1K")]
        size: String,

        /// Part number of a multipart upload
        #[arg(long, requires = "upload_id")]
        part_number: Option<u32>,

        /// Upload id of the multipart upload
        #[arg(long)]
        upload_id: Option<String>,

        /// Show progress bar
        #[arg(short, long)]
        progress: bool,
    },

    /// Download an object, part or range
    Get {
        /// Object key
        key: String,

        /// Output file (bytes are discarded when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Inclusive byte range (start-end)
        #[arg(long)]
        range: Option<String>,

        /// Part number to download
        #[arg(long)]
        part_number: Option<u32>,

        /// Show progress bar
        #[arg(short, long)]
        progress: bool,
    },

    /// Warm the DNS cache for N concurrent transfers
    Warm {
        /// Anticipated concurrent transfers
        transfers: usize,
    },

    /// Show the bucket endpoint and resolved addresses
    Endpoint,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| cli.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Transfers run as tasks on the client's runtime, so use worker threads
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async_main(cli))
}

async fn async_main(cli: Cli) -> Result<()> {
    // Load configuration
    let mut config =
        s3transport::config::load_config(cli.config.as_deref(), cli.profile.as_deref())?;
    if cli.insecure {
        config.transport.insecure_tls = true;
    }

    // Initialize core
    let core = s3transport::core::Core::new(config, cli.profile.as_deref()).await?;

    match cli.command {
        Commands::Put {
            key,
            file,
            size,
            part_number,
            upload_id,
            progress,
        } => {
            let source = match &file {
                Some(path) => PutSource::File(path.as_path()),
                None => PutSource::Random(commands::parse_size(&size)?),
            };
            let part = part_number.map(|part_number| PartSpec {
                part_number,
                upload_id,
            });
            commands::cmd_put(&core, &key, source, part, progress, cli.json).await?;
        }
        Commands::Get {
            key,
            output,
            range,
            part_number,
            progress,
        } => {
            let range = range.as_deref().map(commands::parse_range).transpose()?;
            let part = part_number.map(|part_number| PartSpec {
                part_number,
                upload_id: None,
            });
            commands::cmd_get(&core, &key, output.as_deref(), range, part, progress, cli.json)
                .await?;
        }
        Commands::Warm { transfers } => {
            commands::cmd_warm(&core, transfers, cli.json).await?;
        }
        Commands::Endpoint => {
            commands::cmd_endpoint(&core, cli.json)?;
        }
    }

    Ok(())
}
