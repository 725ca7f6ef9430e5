//! Configuration and path management

pub mod paths;
pub mod settings;

pub use paths::{is_dump_file, strip_sql_suffix, VaultPaths};
pub use settings::{DatabaseSettings, RetentionSettings, Settings, TargetEnvironment};
