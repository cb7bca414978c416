//! Service bootstrap: config, logging, store, HTTP gateway.
//!
//! Exits non-zero on config load failure or unrecoverable store bootstrap
//! failure; request-level failures are responses, never exits.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use cnop::config::{AppConfig, Environment};
use cnop::gateway::{self, AppState};
use cnop::logging::init_logging;
use cnop::store::{DynamoStore, KeyValueStore, MemoryStore};

const STORE_MAX_RETRY_ATTEMPTS: u32 = 3;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            return ExitCode::FAILURE;
        }
    };

    let _log_guard = init_logging(&config.log);

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("fatal: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    let store: Arc<dyn KeyValueStore> = match config.environment {
        Environment::Prod => Arc::new(
            DynamoStore::connect(
                &config.aws_region,
                config.tables.clone(),
                STORE_MAX_RETRY_ATTEMPTS,
            )
            .await
            .context("store bootstrap failed")?,
        ),
        Environment::Dev => {
            info!("dev environment: using in-memory store");
            Arc::new(MemoryStore::new())
        }
    };

    let state = AppState::new(store, &config.jwt_secret);
    let app = gateway::router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("could not bind {}", config.listen_addr))?;
    info!(addr = %config.listen_addr, "cnop core listening");

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
