pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::cli::Cli;

pub use app::AutoHosts;
pub use config::AppConfig;
pub use crate::core::{scheduler::Scheduler, supervisor::ProcessSupervisor, sync::SyncOrchestrator};
pub use utils::error::{AutoHostsError, Result};
