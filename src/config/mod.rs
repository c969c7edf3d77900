//! Configuration: serde schema plus TOML loading.

mod load;
mod schema;

pub use load::{ConfigError, config_path, load_from, load_or_default, write_config};
pub use schema::{Config, LogFormat, LoggingConfig, RouteConfig, SyncConfig};
