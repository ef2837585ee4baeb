pub mod hosts_parser;
pub mod hosts_writer;
pub mod scheduler;
pub mod supervisor;
pub mod sync;

pub use crate::domain::model::{HostsLine, ProcessStatus, Settings, Source, SyncResult};
pub use crate::domain::ports::{HostsFetcher, ProcessTable, SettingsStore, SourceRegistry};
pub use crate::utils::error::Result;
