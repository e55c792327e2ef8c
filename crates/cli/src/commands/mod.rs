//! Subcommand dispatch. Every command prints JSON on stdout.

mod bucket;
mod inspect;
mod mutate;
mod seed;

use std::path::PathBuf;
use std::sync::Arc;

use rideshare_domain::AmountOverflow;
use rideshare_engine::{AdminFacade, EngineError, TransitionEngine};
use rideshare_storage::{InMemoryStorage, RideStorage, StorageError};
use rideshare_store_sqlite::SqliteRideStorage;
use serde::Serialize;

use crate::config::{Backend, Config};
use crate::{serve, Commands};

#[derive(Debug, thiserror::Error)]
pub(crate) enum CommandError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid fixture {path}: {message}")]
    Fixture { path: PathBuf, message: String },

    #[error("{}: {}", .0.code(), .0)]
    Engine(#[from] EngineError),

    #[error("VALIDATION: {0}")]
    Amount(#[from] AmountOverflow),

    #[error("storage: {0}")]
    Storage(#[from] StorageError),

    #[error("cannot encode output: {0}")]
    Output(#[from] serde_json::Error),

    #[error("server: {0}")]
    Server(#[from] std::io::Error),
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<(), CommandError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(crate) fn build_engine<S: RideStorage>(
    storage: Arc<S>,
    config: &Config,
) -> Arc<TransitionEngine<S>> {
    Arc::new(
        TransitionEngine::new(storage)
            .with_fee_policy(config.fees)
            .with_incentive(config.incentive.clone()),
    )
}

pub(crate) async fn run(command: Commands, config: Config) -> Result<(), CommandError> {
    if let Commands::Bucket { id, fare } = &command {
        return bucket::run(id, *fare, &config.incentive);
    }
    match config.storage.backend {
        Backend::Memory => {
            tracing::debug!("using in-memory storage");
            execute(command, &config, Arc::new(InMemoryStorage::new())).await
        }
        Backend::Sqlite => {
            tracing::debug!(path = %config.storage.path.display(), "opening sqlite storage");
            let storage = SqliteRideStorage::open(&config.storage.path)?;
            execute(command, &config, Arc::new(storage)).await
        }
    }
}

async fn execute<S: RideStorage>(
    command: Commands,
    config: &Config,
    storage: Arc<S>,
) -> Result<(), CommandError> {
    match command {
        Commands::Serve { port } => {
            let engine = build_engine(storage, config);
            let port = port.unwrap_or(config.server.port);
            serve::start_server(engine, port, config.server.rate_limit).await?;
            Ok(())
        }
        Commands::Seed { fixture } => seed::run(storage.as_ref(), &fixture).await,
        Commands::Show { ride_id } => inspect::show(storage.as_ref(), &ride_id).await,
        Commands::List { status } => inspect::list(storage.as_ref(), status).await,
        Commands::History { ride_id } => inspect::history(storage.as_ref(), &ride_id).await,
        Commands::Audit {
            admin,
            ride,
            from,
            until,
            limit,
        } => {
            let query = rideshare_domain::AdminActionQuery {
                ride_id: ride,
                admin_id: admin,
                from,
                until,
                limit,
            };
            inspect::audit(storage.as_ref(), &query).await
        }
        Commands::Drive {
            ride_id,
            driver_id,
            action,
            expected_version,
            reason,
        } => {
            let engine = build_engine(storage, config);
            let request = rideshare_engine::DriverRequest {
                ride_id,
                driver_id,
                action,
                expected_version,
                reason,
            };
            mutate::drive(&engine, request).await
        }
        Commands::Admin {
            ride_id,
            admin_id,
            role,
            reason,
            expected_version,
            action,
        } => {
            let facade = AdminFacade::new(build_engine(storage, config));
            let request = rideshare_engine::AdminRequest {
                ride_id,
                admin_id,
                role,
                reason,
                expected_version,
            };
            mutate::admin(&facade, request, action).await
        }
        Commands::Bucket { id, fare } => bucket::run(&id, fare, &config.incentive),
    }
}
