//! VoicEra Common - Shared configuration, errors, and logging for the playground.
//!
//! This crate provides:
//! - Configuration types and loading (`~/.voicera/config.json` + env overrides)
//! - Configuration validation
//! - Error types and handling utilities
//! - Logging setup and trace-id helpers

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod validation;

pub use config::{
    BackendConfig, ClientConfig, Config, GatewayConfig, NetworkConfig, ObservabilityConfig,
};
pub use error::{Error, Result, ResultExt};
pub use validation::{Validate, ValidationError, ValidationResult};

