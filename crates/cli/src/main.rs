mod commands;
mod config;
mod serve;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use rideshare_domain::{AdminRole, RideStatus};
use rideshare_engine::DriverAction;
use rust_decimal::Decimal;
use time::OffsetDateTime;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// Ride lifecycle engine: status transitions, driver matching, admin tooling.
#[derive(Parser)]
#[command(name = "rideshare", version, about = "Ride lifecycle engine")]
struct Cli {
    /// Path to the TOML configuration file (default: ./rideshare.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Start the JSON HTTP API server
    Serve {
        /// Port to listen on (overrides the config file)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Load rides and drivers from a JSON fixture
    Seed {
        /// Path to a fixture with `rides` and `drivers` arrays
        fixture: PathBuf,
    },

    /// Print one ride
    Show { ride_id: String },

    /// List rides, optionally only those in one status
    List {
        #[arg(long)]
        status: Option<RideStatus>,
    },

    /// Print a ride's status history
    History { ride_id: String },

    /// Query the admin action log
    Audit {
        /// Only actions by this admin
        #[arg(long)]
        admin: Option<String>,
        /// Only actions on this ride
        #[arg(long)]
        ride: Option<String>,
        /// Inclusive lower bound (RFC 3339)
        #[arg(long, value_parser = parse_timestamp)]
        from: Option<OffsetDateTime>,
        /// Exclusive upper bound (RFC 3339)
        #[arg(long, value_parser = parse_timestamp)]
        until: Option<OffsetDateTime>,
        /// Maximum number of actions (0 = all)
        #[arg(long, default_value = "0")]
        limit: usize,
    },

    /// Preview the incentive assignment for an identifier
    Bucket {
        /// Ride or passenger id, depending on `incentive.bucket_by`
        id: String,
        /// Base fare the bonus is computed on
        #[arg(long)]
        fare: Decimal,
    },

    /// Perform a driver action on a ride
    Drive {
        ride_id: String,
        driver_id: String,
        /// accept, decline, arrive, start, finish, or cancel
        #[arg(value_parser = parse_driver_action)]
        action: DriverAction,
        /// Version the driver last saw
        #[arg(long)]
        expected_version: Option<i64>,
        #[arg(long)]
        reason: Option<String>,
    },

    /// Perform an admin mutation on a ride
    Admin {
        ride_id: String,
        #[arg(long)]
        admin_id: String,
        /// support, admin, or super_admin
        #[arg(long, value_parser = parse_role)]
        role: AdminRole,
        #[arg(long)]
        reason: String,
        #[arg(long)]
        expected_version: Option<i64>,
        #[command(subcommand)]
        action: AdminOp,
    },
}

#[derive(Subcommand)]
pub(crate) enum AdminOp {
    /// Cancel a live ride
    Cancel,
    /// Hand the ride to another driver
    Reassign { driver_id: String },
    /// Complete the ride and apply the fare split
    ForceComplete,
    /// Move the ride along a standard edge
    CorrectStatus { status: RideStatus },
}

fn parse_timestamp(s: &str) -> Result<OffsetDateTime, String> {
    OffsetDateTime::parse(s, &time::format_description::well_known::Rfc3339)
        .map_err(|e| format!("expected an RFC 3339 timestamp: {e}"))
}

/// Reuse the wire names so the CLI and the HTTP API agree.
fn parse_snake_case<T: serde::de::DeserializeOwned>(s: &str) -> Result<T, String> {
    serde_json::from_value(serde_json::Value::String(s.to_string())).map_err(|e| e.to_string())
}

fn parse_driver_action(s: &str) -> Result<DriverAction, String> {
    parse_snake_case(s)
}

fn parse_role(s: &str) -> Result<AdminRole, String> {
    parse_snake_case(s)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to start tokio runtime: {e}");
            process::exit(1);
        }
    };
    if let Err(e) = runtime.block_on(commands::run(cli.command, config)) {
        eprintln!("error: {e}");
        process::exit(1);
    }
}
