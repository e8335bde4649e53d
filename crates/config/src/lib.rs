// Configuration loading

pub mod secrets;
pub mod settings;

pub use settings::{ConfigError, DriveSettings, Settings, StoreConfig};
