//! Optional `tracing` subscriber setup.
//!
//! The crate only emits events; applications that have no subscriber of
//! their own can call [`init_logging`].

use tracing_subscriber::EnvFilter;

use crate::errors::{EncryptionError, Result};

/// Environment variable read when no explicit filter is given.
pub const LOG_ENV_VAR: &str = "DYNAMODB_ENCRYPTION_LOG";

/// Install a global fmt subscriber.
///
/// `filter` uses `EnvFilter` syntax (`"debug"`, `"dynamodb_encryption=trace"`).
/// Without it, `DYNAMODB_ENCRYPTION_LOG` is read, falling back to `warn`.
pub fn init_logging(filter: Option<&str>) -> Result<()> {
    let filter = match filter {
        Some(directives) => EnvFilter::try_new(directives)
            .map_err(|e| EncryptionError::Config(format!("Invalid log filter: {}", e)))?,
        None => EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("warn")),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| EncryptionError::Config(format!("Logging already initialized: {}", e)))
}
