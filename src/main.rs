use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use fgbridge_lib::commands::{self, EchoDelegate};

#[derive(Parser)]
#[command(name = "fgbridge", version, about = "Call into a native library through the fgbridge protocol")]
struct Cli {
    /// Native library to load
    #[arg(long, global = true, env = "FG_BRIDGE_LIBRARY")]
    lib: Option<PathBuf>,

    /// Answer calls in-process instead of loading a native library
    #[arg(long, global = true)]
    loopback: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Invoke a native method and print the response as JSON
    Call {
        method: String,
        /// Payload given as UTF-8 text
        #[arg(long, conflicts_with = "hex")]
        data: Option<String>,
        /// Payload given as hex digits
        #[arg(long)]
        hex: Option<String>,
    },
    /// Send `ping` and print the response
    Ping,
}

fn main() -> ExitCode {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let bridge = match commands::open_bridge(cli.lib, cli.loopback) {
        Ok(bridge) => bridge,
        Err(err) => {
            log::error!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let delegate = Arc::new(EchoDelegate);
    bridge.set_delegate(&delegate);

    let report = match cli.command {
        Command::Call { method, data, hex } => {
            let payload = match (data, hex) {
                (Some(text), _) => Some(text.into_bytes()),
                (None, Some(hex)) => match commands::parse_hex(&hex) {
                    Ok(bytes) => Some(bytes),
                    Err(err) => {
                        log::error!("{err}");
                        return ExitCode::FAILURE;
                    }
                },
                (None, None) => None,
            };
            commands::call(bridge, &method, payload)
        }
        Command::Ping => commands::ping(bridge),
    };

    match report.map(|report| serde_json::to_string_pretty(&report)) {
        Ok(Ok(json)) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Ok(Err(err)) => {
            log::error!("failed to render response: {err}");
            ExitCode::FAILURE
        }
        Err(err) => {
            log::error!("{err}");
            ExitCode::FAILURE
        }
    }
}
