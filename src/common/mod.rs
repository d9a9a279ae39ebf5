//! Shared types for faultline

pub mod config;
pub mod error;

pub use config::{HarnessConfig, DEFAULT_CIDR, DEFAULT_COORDINATION_PORT};
pub use error::{Error, Result};
