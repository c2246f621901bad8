//! Error types for the provisioning core

use std::time::Duration;
use thiserror::Error;

use crate::environment::DeploymentStatus;

/// Provisioning result type
pub type Result<T> = std::result::Result<T, ProvisionError>;

/// Errors that can occur while provisioning or rolling out an environment
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// Transport-level failure talking to the platform API
    #[error("transport error: {message}")]
    Transport {
        /// Human-readable failure description
        message: String,
        /// HTTP status code, when the failure carried one
        status: Option<u16>,
    },

    /// The platform accepted the call but returned errors in the payload
    #[error("platform API error: {0}")]
    Api(String),

    /// Payload decode failure
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error (missing input, bad ordering, name conflicts)
    #[error("configuration error: {0}")]
    Config(String),

    /// The created environment never satisfied the readiness invariant
    #[error("environment '{name}' not ready after {attempts} poll attempts")]
    EnvironmentNeverReady {
        /// Destination environment name
        name: String,
        /// Poll attempts performed before giving up
        attempts: u32,
    },

    /// A deployment reached a terminal failure status
    #[error("deployment {id} finished with status {status}")]
    DeploymentFailed {
        /// Deployment identity
        id: String,
        /// The terminal status the platform reported
        status: DeploymentStatus,
    },

    /// No terminal deployment status arrived within the configured wait
    #[error("deployment {id} did not complete within {waited:?}")]
    WatchTimeout {
        /// Deployment identity
        id: String,
        /// How long the watcher waited
        waited: Duration,
    },
}

impl ProvisionError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a platform API error
    pub fn api(msg: impl Into<String>) -> Self {
        Self::Api(msg.into())
    }

    /// Create a transport error without a status code
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport {
            message: msg.into(),
            status: None,
        }
    }

    /// Whether this is a gateway-timeout-class transport failure.
    ///
    /// The platform's environment creation is eventually consistent: the
    /// gateway can time out while creation still proceeds server-side. The
    /// creation call site treats this class as recoverable and falls back to
    /// readiness polling; every other call site treats it as fatal.
    pub fn is_gateway_timeout(&self) -> bool {
        match self {
            Self::Transport { status, message } => {
                matches!(status, Some(502) | Some(504)) || message.contains("504")
            }
            _ => false,
        }
    }
}

impl From<reqwest::Error> for ProvisionError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport {
            message: err.to_string(),
            status: err.status().map(|s| s.as_u16()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_timeout_classification() {
        let err = ProvisionError::Transport {
            message: "gateway timeout".to_string(),
            status: Some(504),
        };
        assert!(err.is_gateway_timeout());

        let err = ProvisionError::Transport {
            message: "bad gateway".to_string(),
            status: Some(502),
        };
        assert!(err.is_gateway_timeout());

        let err = ProvisionError::Transport {
            message: "server error".to_string(),
            status: Some(500),
        };
        assert!(!err.is_gateway_timeout());
    }

    #[test]
    fn test_gateway_timeout_from_message() {
        // Some proxies surface the 504 only in the error body
        let err = ProvisionError::transport("HTTP 504: upstream timed out");
        assert!(err.is_gateway_timeout());
    }

    #[test]
    fn test_non_transport_errors_are_fatal() {
        assert!(!ProvisionError::config("missing project id").is_gateway_timeout());
        assert!(!ProvisionError::api("environment not found").is_gateway_timeout());
    }
}
