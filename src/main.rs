//! dcc-check - Bounded-time DCC checksum reputation client.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tokio::io::AsyncReadExt;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use dcc_check::check::{CheckClient, CheckOutcome, CheckRequest, UNKNOWN_CLIENT_IP};
use dcc_check::config::{ConfigLoader, DccConfig};

#[derive(Parser)]
#[command(
    name = "dcc-check",
    about = "Ask a DCC backend whether a message is bulk",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Config file (default: ./.dcc-check.toml, then the user config dir).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check one message.
    Check {
        /// Message file, or - for stdin.
        #[arg(default_value = "-")]
        file: PathBuf,
        /// Connecting client IP.
        #[arg(long, default_value = UNKNOWN_CLIENT_IP)]
        ip: String,
        /// HELO value.
        #[arg(long, default_value = "")]
        helo: String,
        /// Envelope sender.
        #[arg(long, default_value = "")]
        sender: String,
        /// Envelope recipient (repeatable).
        #[arg(long = "rcpt")]
        recipients: Vec<String>,
        /// Override the timeout in seconds.
        #[arg(long)]
        timeout: Option<u64>,
        /// Print the outcome as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Show which transport would be used.
    Detect,
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_config(path: Option<PathBuf>) -> Result<DccConfig, String> {
    let loader = path.map_or_else(ConfigLoader::new, ConfigLoader::with_path);
    loader.load().map_err(|e| e.to_string())
}

async fn read_message(file: &Path) -> std::io::Result<Vec<u8>> {
    if file.as_os_str() == "-" {
        let mut buf = Vec::new();
        tokio::io::stdin().read_to_end(&mut buf).await?;
        Ok(buf)
    } else {
        tokio::fs::read(file).await
    }
}

fn print_outcome(outcome: &CheckOutcome, json: bool) {
    if json {
        match serde_json::to_string_pretty(outcome) {
            Ok(s) => println!("{s}"),
            Err(e) => eprintln!("Failed to serialize outcome: {e}"),
        }
        return;
    }
    match outcome {
        CheckOutcome::Hit(_) => println!("hit"),
        CheckOutcome::Miss(_) => println!("miss"),
        CheckOutcome::Indeterminate(reason) => println!("indeterminate: {reason}"),
    }
    if let Some(tags) = outcome.tags() {
        println!("{}", tags.header_line());
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = match load_config(cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(2);
        }
    };

    match cli.command {
        Commands::Detect => {
            let client = CheckClient::new(config);
            println!("{}", client.transport_kind());
            ExitCode::SUCCESS
        }
        Commands::Check {
            file,
            ip,
            helo,
            sender,
            recipients,
            timeout,
            json,
        } => {
            if let Some(secs) = timeout {
                config.timeout_secs = secs;
                if let Err(e) = config.validate() {
                    eprintln!("{e}");
                    return ExitCode::from(2);
                }
            }

            let message = match read_message(&file).await {
                Ok(message) => message,
                Err(e) => {
                    eprintln!("Failed to read {}: {e}", file.display());
                    return ExitCode::from(2);
                }
            };

            let request = CheckRequest::new(message)
                .client_ip(ip)
                .helo(helo)
                .envelope_sender(sender)
                .recipients(recipients);
            let thresholds = config.thresholds;
            let client = CheckClient::new(config);
            tracing::info!(
                kind = %client.transport_kind(),
                bytes = request.message().len(),
                "Checking message"
            );

            let outcome = client.check(&request, &thresholds).await;
            print_outcome(&outcome, json);
            if outcome.is_hit() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            }
        }
    }
}
