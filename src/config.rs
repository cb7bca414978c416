//! Service configuration loaded from the environment.
//!
//! The platform runs one process per service replica; everything a replica
//! needs to talk to the store and the auth collaborator comes in through
//! environment variables. `AWS_REGION` is required, the rest have dev
//! defaults. A missing required variable is a bootstrap failure - the
//! process exits non-zero (see `main.rs`).

use std::env;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    MissingVar(&'static str),

    #[error("invalid value for {var}: '{value}' ({expected})")]
    InvalidValue {
        var: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Prod,
}

impl Environment {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            other => Err(ConfigError::InvalidValue {
                var: "ENVIRONMENT",
                value: other.to_string(),
                expected: "one of: dev, prod",
            }),
        }
    }
}

/// Names of the three logical tables (users, orders, inventory).
#[derive(Debug, Clone)]
pub struct TableNames {
    pub users: String,
    pub orders: String,
    pub inventory: String,
}

/// Logging knobs, consumed by `logging::init_logging`.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub log_dir: String,
    pub log_file: String,
    pub log_level: String,
    pub use_json: bool,
}

/// Complete service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub aws_region: String,
    pub tables: TableNames,
    pub jwt_secret: String,
    pub environment: Environment,
    pub listen_addr: String,
    pub log: LogConfig,
}

impl AppConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let aws_region =
            env::var("AWS_REGION").map_err(|_| ConfigError::MissingVar("AWS_REGION"))?;

        let environment = Environment::parse(&var_or("ENVIRONMENT", "dev"))?;

        // Dev gets a throwaway secret so local bootstrap works out of the box;
        // prod must provide one.
        let jwt_secret = match env::var("JWT_SECRET_KEY") {
            Ok(secret) => secret,
            Err(_) if environment == Environment::Dev => "dev-only-secret".to_string(),
            Err(_) => return Err(ConfigError::MissingVar("JWT_SECRET_KEY")),
        };

        Ok(AppConfig {
            aws_region,
            tables: TableNames {
                users: var_or("USERS_TABLE", "users"),
                orders: var_or("ORDERS_TABLE", "orders"),
                inventory: var_or("INVENTORY_TABLE", "inventory"),
            },
            jwt_secret,
            environment,
            listen_addr: var_or("LISTEN_ADDR", "0.0.0.0:8000"),
            log: LogConfig {
                log_dir: var_or("LOG_DIR", "logs"),
                log_file: var_or("LOG_FILE", "cnop.log"),
                log_level: var_or("LOG_LEVEL", "info"),
                use_json: environment == Environment::Prod,
            },
        })
    }
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}
