// Adapters layer: concrete implementations for external systems (storage, http, process table).

pub mod http;
pub mod memory;
pub mod procfs;
pub mod storage;
