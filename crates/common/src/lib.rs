//! Hudburn Common Utilities
//!
//! Shared infrastructure for all Hudburn crates:
//! - Error types and result aliases
//! - Timebase utilities for telemetry/video synchronization
//! - Tracing/logging initialization
//! - Configuration loading

pub mod config;
pub mod error;
pub mod logging;
pub mod timebase;

pub use config::*;
pub use error::*;
pub use timebase::*;
