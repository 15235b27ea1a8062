// Re-export all items from the submodules
mod processing_config;

pub use processing_config::{
    resolve_worker_count,
    ProcessingConfig,
    ProcessingOptions,
    StatusViewMode,
    TransportKind,
};
