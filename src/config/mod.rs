pub mod app_config;
#[cfg(feature = "cli")]
pub mod cli;
pub mod settings;

pub use app_config::AppConfig;
pub use settings::JsonSettingsStore;
