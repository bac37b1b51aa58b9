//! Core abstractions for the data acquisition gateway.
//!
//! This module provides the foundational types and traits that all
//! protocol adapters implement.

pub mod config;
pub mod data;
pub mod error;
pub mod metadata;
pub mod quality;
pub mod traits;

pub use config::*;
pub use data::*;
pub use error::{GatewayError, Result};
pub use metadata::*;
pub use quality::*;
pub use traits::*;
