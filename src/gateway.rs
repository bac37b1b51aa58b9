//! Gateway layer: adapter factory and connection manager.

pub mod factory;
pub mod manager;

pub use factory::{create_client, supported_protocols};
pub use manager::{DataManager, SourceStatus};
