//! Infrastructure layer: storage collaborators, configuration, and the zone
//! structure service that orchestrates them.

pub mod config;
pub mod service;
pub mod store;

pub use config::{ConfigError, EngineConfig};
pub use service::{
    ApplyOptions, ServiceResult, StructureApplied, StructurePreview, StructureServiceError,
    ZoneCreated, ZoneStructureService,
};
