// Copyright 2025 coScene
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use offline_recorder::config::{load_config_with_env, LoggingConfig};
use offline_recorder::{FlushWorker, Recorder, SenderFactory};

/// Offline Recorder - Buffer records on disk and deliver them in batches
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/default.yaml")]
    config: PathBuf,

    /// Buffer directory (overrides config file)
    #[arg(short, long)]
    directory: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Buffer one record
    Put {
        /// Destination stream
        #[arg(short, long)]
        stream: String,

        /// Record payload as text
        #[arg(long, conflicts_with = "file")]
        data: Option<String>,

        /// Read the record payload from a file
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Drain all buffered records once
    Submit,
    /// Show disk usage
    Status,
    /// Delete all buffered records
    Clear,
    /// Keep draining in the background until Ctrl+C
    Run,
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(logging.level.to_lowercase()));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.format == "compact" {
        builder.compact().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Load configuration from file
    let mut config = load_config_with_env(&args.config)?;

    // Apply CLI overrides
    if let Some(directory) = args.directory {
        config.recorder.storage.directory = directory;
    }

    init_tracing(&config.logging);

    info!("Loaded configuration from: {:?}", args.config);
    info!("Sender backend: {}", config.sender.backend);

    let sender = SenderFactory::create(&config.sender)?;
    let recorder = Arc::new(
        Recorder::new(&config.recorder, sender.clone()).context("Failed to open record store")?,
    );

    match args.command {
        Command::Put { stream, data, file } => {
            let payload = match (data, file) {
                (Some(data), _) => data.into_bytes(),
                (None, Some(path)) => std::fs::read(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                (None, None) => bail!("either --data or --file is required"),
            };
            if recorder.save_record(&payload, &stream)? {
                println!("buffered {} bytes for stream '{}'", payload.len(), stream);
            } else {
                println!(
                    "store full ({} of {} bytes), record dropped",
                    recorder.disk_bytes_used(),
                    recorder.disk_byte_limit()
                );
            }
        }

        Command::Submit => {
            sender.initialize().await?;
            let report = recorder.submit_all_records().await?;
            println!(
                "delivered {} records in {} batches",
                report.records_delivered, report.batches_delivered
            );
            if let Some(stream) = report.stalled_stream {
                println!(
                    "stream '{}' still refusing {} records, retry later",
                    stream, report.records_pending
                );
            }
        }

        Command::Status => {
            println!(
                "{}: {} of {} bytes used",
                recorder.store().path().display(),
                recorder.disk_bytes_used(),
                recorder.disk_byte_limit()
            );
        }

        Command::Clear => {
            recorder.delete_all_records().await?;
            println!("deleted all buffered records");
        }

        Command::Run => {
            sender.initialize().await?;
            let worker = FlushWorker::spawn(recorder.clone(), config.recorder.flush_policy.clone());

            tokio::signal::ctrl_c()
                .await
                .context("Failed to listen for Ctrl+C")?;
            info!("Received Ctrl+C, shutting down");

            worker.shutdown().await?;
            info!(
                "Offline Recorder shut down with {} bytes buffered",
                recorder.disk_bytes_used()
            );
        }
    }

    Ok(())
}
