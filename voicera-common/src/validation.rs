//! Configuration validation.
//!
//! Catches bad ports, unparseable backend URLs, and unknown log formats
//! before a service starts.

use thiserror::Error;

use crate::config::{BackendConfig, ClientConfig, Config, GatewayConfig, ObservabilityConfig};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid port {port} for {field}")]
    InvalidPort { port: u16, field: String },

    #[error("Invalid URL for {field}: {reason}")]
    InvalidUrl { field: String, reason: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

fn check_url(field: &str, raw: &str) -> ValidationResult<()> {
    let parsed = url::Url::parse(raw).map_err(|e| ValidationError::InvalidUrl {
        field: field.to_string(),
        reason: e.to_string(),
    })?;

    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ValidationError::InvalidUrl {
            field: field.to_string(),
            reason: format!("unsupported scheme '{other}'"),
        }),
    }
}

fn collect(mut errors: Vec<ValidationError>) -> ValidationResult<()> {
    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(ValidationError::Multiple(errors)),
    }
}

impl Validate for GatewayConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();
        if self.port == 0 {
            errors.push(ValidationError::InvalidPort {
                port: self.port,
                field: "gateway.port".into(),
            });
        }
        if self.body_limit_bytes == 0 {
            errors.push(ValidationError::InvalidValue {
                field: "gateway.body_limit_bytes".into(),
                reason: "must be greater than zero".into(),
            });
        }
        if self.contexts.iter().any(|c| c.trim().is_empty()) {
            errors.push(ValidationError::InvalidValue {
                field: "gateway.contexts".into(),
                reason: "context names must not be blank".into(),
            });
        }
        collect(errors)
    }
}

impl Validate for BackendConfig {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();
        if let Err(e) = check_url("backend.search_url", &self.search_url) {
            errors.push(e);
        }
        if let Err(e) = check_url("backend.embed_url", &self.embed_url) {
            errors.push(e);
        }
        if let Some(ref contexts_url) = self.contexts_url {
            if let Err(e) = check_url("backend.contexts_url", contexts_url) {
                errors.push(e);
            }
        }
        collect(errors)
    }
}

impl Validate for ClientConfig {
    fn validate(&self) -> ValidationResult<()> {
        check_url("client.gateway_url", &self.gateway_url)?;
        if self.timeout_secs == Some(0) {
            return Err(ValidationError::InvalidValue {
                field: "client.timeout_secs".into(),
                reason: "must be greater than zero when set".into(),
            });
        }
        Ok(())
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        match self.log_format.as_str() {
            "json" | "pretty" => Ok(()),
            other => Err(ValidationError::InvalidValue {
                field: "observability.log_format".into(),
                reason: format!("expected 'json' or 'pretty', got '{other}'"),
            }),
        }
    }
}

impl Validate for Config {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = Vec::new();

        if self.network.bind.parse::<std::net::IpAddr>().is_err() {
            errors.push(ValidationError::InvalidValue {
                field: "network.bind".into(),
                reason: format!("'{}' is not an IP address", self.network.bind),
            });
        }
        if let Err(e) = self.gateway.validate() {
            errors.push(e);
        }
        if let Err(e) = self.backend.validate() {
            errors.push(e);
        }
        if let Err(e) = self.client.validate() {
            errors.push(e);
        }
        if let Err(e) = self.observability.validate() {
            errors.push(e);
        }

        collect(errors)
    }
}
