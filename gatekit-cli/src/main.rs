//! `gatekit`: operator CLI for provisioning VLESS proxy subscriptions.
//!
//! Every subcommand prints one JSON document on stdout. Engine failures are
//! printed as `{"kind": ..., "message": ...}` on stderr with exit code 1.

mod logging;
mod qr;
mod settings;

use std::process::ExitCode;
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use eyre::WrapErr;
use gatekit_core::{
    ConnectionRenderer, GateKitError, PlainUriRenderer, ProvisioningEngine, DEFAULT_PLAN_DAYS,
};
use serde::Serialize;

use crate::qr::SvgQrRenderer;
use crate::settings::DeploymentArgs;

/// Provision, revoke and inspect proxy subscriptions
#[derive(Parser, Debug)]
#[command(name = "gatekit", version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    deployment: DeploymentArgs,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Grant access to a subscriber for a number of days
    Provision {
        /// Subscriber account id
        external_id: i64,

        /// Plan length in days
        #[arg(long, default_value_t = DEFAULT_PLAN_DAYS)]
        plan_days: i64,
    },

    /// Withdraw a subscriber's access
    Revoke {
        /// Subscriber account id
        external_id: i64,
    },

    /// Show a subscriber's stored subscription
    Describe {
        /// Subscriber account id
        external_id: i64,
    },

    /// Show a subscriber's connection URI and its rendered QR code
    Config {
        /// Subscriber account id
        external_id: i64,

        /// Return the bare URI instead of a base64 SVG QR code
        #[arg(long)]
        plain: bool,
    },

    /// List every stored subscription
    List,

    /// Find the subscription holding a client id
    Lookup {
        /// Client credential from the access document
        client_id: String,
    },

    /// Re-grant missing and withdraw stale access entries
    Reconcile,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = logging::init(cli.verbose) {
        eprintln!("failed to initialize logging: {err:#}");
    }

    match run(cli) {
        Ok(Outcome::Done) => ExitCode::SUCCESS,
        Ok(Outcome::Rejected(err)) => {
            tracing::debug!("operation rejected: {err}");
            match serde_json::to_string_pretty(&err.report()) {
                Ok(report) => eprintln!("{report}"),
                Err(_) => eprintln!("{err}"),
            }
            ExitCode::FAILURE
        }
        Err(err) => {
            tracing::error!("{err:#}");
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

/// Separates engine rejections, which are reported as structured JSON, from
/// setup failures.
enum Outcome {
    Done,
    Rejected(GateKitError),
}

fn run(cli: Cli) -> eyre::Result<Outcome> {
    let config = Arc::new(cli.deployment.resolve()?);
    let renderer: Arc<dyn ConnectionRenderer> = match cli.command {
        Commands::Config { plain: true, .. } => Arc::new(PlainUriRenderer),
        _ => Arc::new(SvgQrRenderer),
    };
    let engine =
        ProvisioningEngine::open(config, renderer).wrap_err("opening subscription storage")?;
    tracing::debug!(?engine, "engine ready");

    let printed = match cli.command {
        Commands::Provision {
            external_id,
            plan_days,
        } => engine
            .provision(external_id, plan_days, Utc::now())
            .map(|response| print_json(&response)),
        Commands::Revoke { external_id } => engine
            .revoke(external_id, Utc::now())
            .map(|response| print_json(&response)),
        Commands::Describe { external_id } => engine
            .describe(external_id)
            .map(|response| print_json(&response)),
        Commands::Config { external_id, .. } => engine
            .get_config(external_id)
            .map(|response| print_json(&response)),
        Commands::List => engine.list().map(|responses| print_json(&responses)),
        Commands::Lookup { client_id } => engine
            .lookup_client(&client_id)
            .map(|response| print_json(&response)),
        Commands::Reconcile => engine.reconcile().map(|report| print_json(&report)),
    };

    match printed {
        Ok(written) => {
            written?;
            Ok(Outcome::Done)
        }
        Err(err) => Ok(Outcome::Rejected(err)),
    }
}

fn print_json<T: Serialize>(value: &T) -> eyre::Result<()> {
    let text = serde_json::to_string_pretty(value).wrap_err("serializing response")?;
    println!("{text}");
    Ok(())
}
