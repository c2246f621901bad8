//! Operation configuration
//!
//! Every component takes its configuration explicitly at construction; there
//! is no ambient global state. One [`Config`] value describes one
//! environment-lifecycle operation.

use std::time::Duration;

use serde_json::{Map, Value};

use crate::error::{ProvisionError, Result};
use crate::poll::PollConfig;

/// Default platform GraphQL endpoint
pub const DEFAULT_ENDPOINT: &str = "https://backboard.railway.app/graphql/v2";

/// Default maximum wait for a single deployment to reach a terminal status
pub const DEFAULT_DEPLOY_MAX_WAIT_SECS: u64 = 900;

/// Service names tried for the externally-facing service when none is
/// configured explicitly
pub const DEFAULT_API_SERVICE_FALLBACKS: [&str; 3] = ["app", "backend", "web"];

/// Configuration for one environment-lifecycle operation
#[derive(Debug, Clone)]
pub struct Config {
    /// Platform GraphQL endpoint
    pub endpoint: String,

    /// Bearer credential attached to every call
    pub token: String,

    /// Project the environment lives in
    pub project_id: String,

    /// Destination environment name (the human-facing correlation key)
    pub dest_env_name: String,

    /// Source environment name, resolved to an id when no id is given
    pub source_env_name: Option<String>,

    /// Source environment id, used directly when present
    pub source_env_id: Option<String>,

    /// Branch reference propagated to every deployment trigger
    pub branch: String,

    /// Variable set upserted onto every service instance
    pub variables: Map<String, Value>,

    /// Explicitly configured externally-facing service name
    pub api_service_name: Option<String>,

    /// Fallback names tried when no explicit API service name is configured
    pub api_service_fallbacks: Vec<String>,

    /// Explicit deployment order; when present, services deploy one at a
    /// time, each gated on the previous deployment's terminal status
    pub deployment_order: Option<Vec<String>>,

    /// Service names excluded from deployment
    pub ignore_services: Vec<String>,

    /// Maximum wait per watched deployment
    pub deploy_max_wait: Duration,

    /// Readiness polling parameters
    pub poll: PollConfig,
}

impl Config {
    /// Create a config with the required identifying inputs and defaults for
    /// everything else
    pub fn new(
        token: impl Into<String>,
        project_id: impl Into<String>,
        dest_env_name: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            token: token.into(),
            project_id: project_id.into(),
            dest_env_name: dest_env_name.into(),
            source_env_name: None,
            source_env_id: None,
            branch: String::new(),
            variables: Map::new(),
            api_service_name: None,
            api_service_fallbacks: DEFAULT_API_SERVICE_FALLBACKS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            deployment_order: None,
            ignore_services: Vec::new(),
            deploy_max_wait: Duration::from_secs(DEFAULT_DEPLOY_MAX_WAIT_SECS),
            poll: PollConfig::default(),
        }
    }

    /// Set the platform endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Set the source environment name
    pub fn with_source_env_name(mut self, name: impl Into<String>) -> Self {
        self.source_env_name = Some(name.into());
        self
    }

    /// Set the source environment id
    pub fn with_source_env_id(mut self, id: impl Into<String>) -> Self {
        self.source_env_id = Some(id.into());
        self
    }

    /// Set the branch reference propagated to deployment triggers
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    /// Set the variable set upserted onto every service instance
    pub fn with_variables(mut self, variables: Map<String, Value>) -> Self {
        self.variables = variables;
        self
    }

    /// Set the explicit externally-facing service name
    pub fn with_api_service_name(mut self, name: impl Into<String>) -> Self {
        self.api_service_name = Some(name.into());
        self
    }

    /// Replace the API-service fallback names
    pub fn with_api_service_fallbacks(mut self, names: Vec<String>) -> Self {
        self.api_service_fallbacks = names;
        self
    }

    /// Set an explicit deployment order
    pub fn with_deployment_order(mut self, order: Vec<String>) -> Self {
        self.deployment_order = if order.is_empty() { None } else { Some(order) };
        self
    }

    /// Set the service names excluded from deployment
    pub fn with_ignore_services(mut self, names: Vec<String>) -> Self {
        self.ignore_services = names;
        self
    }

    /// Set the maximum wait per watched deployment
    pub fn with_deploy_max_wait(mut self, wait: Duration) -> Self {
        self.deploy_max_wait = wait;
        self
    }

    /// Set the readiness polling parameters
    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Parse the serialized variable-set payload (a JSON object of
    /// string-valued variables) as supplied by the host pipeline
    pub fn parse_variables(payload: &str) -> Result<Map<String, Value>> {
        let value: Value = serde_json::from_str(payload)?;
        match value {
            Value::Object(map) => Ok(map),
            other => Err(ProvisionError::config(format!(
                "variable payload must be a JSON object, got {other}"
            ))),
        }
    }

    /// Validate the identifying inputs a create operation needs, before any
    /// network call is made
    pub fn validate_for_create(&self) -> Result<()> {
        if self.project_id.is_empty() {
            return Err(ProvisionError::config("project id is required"));
        }
        if self.dest_env_name.is_empty() {
            return Err(ProvisionError::config(
                "destination environment name is required",
            ));
        }
        if self.source_env_id.is_none() && self.source_env_name.is_none() {
            return Err(ProvisionError::config(
                "a source environment id or name is required",
            ));
        }
        if self.branch.is_empty() {
            return Err(ProvisionError::config("branch reference is required"));
        }
        Ok(())
    }

    /// Validate the identifying inputs a destroy operation needs
    pub fn validate_for_destroy(&self) -> Result<()> {
        if self.project_id.is_empty() {
            return Err(ProvisionError::config("project id is required"));
        }
        if self.dest_env_name.is_empty() {
            return Err(ProvisionError::config(
                "destination environment name is required",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config::new("token", "proj-1", "pr-42")
            .with_source_env_name("staging")
            .with_branch("feat-thing")
    }

    #[test]
    fn test_create_validation_accepts_complete_config() {
        assert!(base_config().validate_for_create().is_ok());
    }

    #[test]
    fn test_create_validation_requires_source() {
        let config = Config::new("token", "proj-1", "pr-42").with_branch("feat-thing");
        assert!(matches!(
            config.validate_for_create(),
            Err(ProvisionError::Config(_))
        ));
    }

    #[test]
    fn test_create_validation_requires_branch() {
        let config = Config::new("token", "proj-1", "pr-42").with_source_env_id("env-src");
        assert!(matches!(
            config.validate_for_create(),
            Err(ProvisionError::Config(_))
        ));
    }

    #[test]
    fn test_create_validation_requires_project_and_name() {
        let config = Config::new("token", "", "pr-42");
        assert!(config.validate_for_create().is_err());

        let config = Config::new("token", "proj-1", "");
        assert!(config.validate_for_create().is_err());
    }

    #[test]
    fn test_source_id_alone_is_sufficient() {
        let config = Config::new("token", "proj-1", "pr-42")
            .with_source_env_id("env-src")
            .with_branch("feat-thing");
        assert!(config.validate_for_create().is_ok());
    }

    #[test]
    fn test_parse_variables() {
        let map = Config::parse_variables(r#"{"DATABASE_URL":"postgres://x","FLAG":"1"}"#).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["FLAG"], "1");
    }

    #[test]
    fn test_parse_variables_rejects_non_object() {
        assert!(Config::parse_variables("[1,2]").is_err());
        assert!(Config::parse_variables("\"nope\"").is_err());
    }

    #[test]
    fn test_default_api_service_fallbacks() {
        let config = base_config();
        assert_eq!(config.api_service_fallbacks, vec!["app", "backend", "web"]);
    }

    #[test]
    fn test_empty_deployment_order_means_unordered() {
        let config = base_config().with_deployment_order(vec![]);
        assert!(config.deployment_order.is_none());
    }
}
