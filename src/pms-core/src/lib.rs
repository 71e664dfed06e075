pub mod config;
pub mod logging;
pub mod models;
pub mod paths;
pub mod redact;
pub mod secrets;

pub use config::{Config, ConfigError, LogLevel, LoggingConfig, MpdConfig, ValidationError};
pub use logging::{init_logging, LoggingError, LoggingGuard};
pub use models::{DefaultFieldRegistry, Field, FieldRegistry, Song};
pub use paths::{AppDirs, DirsError};
pub use secrets::{CredentialStore, SecretsError, SecretsResult};

pub const APP_NAME: &str = "pms";
pub const APP_AUTHOR: &str = "PMS";
pub const APP_QUALIFIER: &str = "org";
