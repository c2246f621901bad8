//! Environment domain model
//!
//! Types describing what the platform holds for a project: environments,
//! the service instances and deployment triggers inside them, and the
//! status lifecycle of a deployment.
//!
//! ## Readiness
//!
//! Environment creation is eventually consistent. The creation call can
//! return before service instances and deployment triggers are wired up, so
//! an environment missing either is *still provisioning*, not broken. See
//! [`Environment::is_ready`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lightweight environment listing entry (id + correlation name only)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentSummary {
    /// Environment ID
    pub id: String,

    /// Environment name, unique within the project
    pub name: String,
}

/// Full environment description
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Environment {
    /// Environment ID
    pub id: String,

    /// Environment name, unique within the project
    pub name: String,

    /// Server-side creation timestamp, when the platform returned one
    pub created_at: Option<DateTime<Utc>>,

    /// Service instances provisioned into this environment
    pub service_instances: Vec<ServiceInstance>,

    /// Deployment triggers wired into this environment
    pub deployment_triggers: Vec<DeploymentTrigger>,
}

impl Environment {
    /// Readiness invariant: a usable environment has at least one service
    /// instance and at least one deployment trigger.
    pub fn is_ready(&self) -> bool {
        !self.service_instances.is_empty() && !self.deployment_triggers.is_empty()
    }
}

/// One deployable service as it exists inside a specific environment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInstance {
    /// Service instance ID
    pub id: String,

    /// ID of the logical service this instantiates
    pub service_id: String,

    /// Published network addresses. May be empty even on a ready instance
    /// (not yet allocated) - a normal, non-error condition.
    pub domains: Vec<String>,
}

/// Per-service configuration of which source branch deployments build from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentTrigger {
    /// Trigger ID
    pub id: String,

    /// Branch the trigger currently points at
    pub branch: Option<String>,
}

/// Project metadata (name plus its logical services)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Project ID
    pub id: String,

    /// Project name
    pub name: String,

    /// Logical services defined on the project
    pub services: Vec<ProjectService>,
}

/// One logical service as listed on the project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectService {
    /// Service ID
    pub id: String,

    /// Service name
    pub name: String,
}

/// Deployment status lifecycle as reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentStatus {
    /// Waiting in the build queue
    Queued,
    /// Waiting on an upstream condition
    Waiting,
    /// Build environment is being prepared
    Initializing,
    /// Image build in progress
    Building,
    /// Rollout onto the service instance in progress
    Deploying,
    /// Terminal: the deployment is live
    Success,
    /// Terminal: the build or rollout failed
    Failed,
    /// Terminal: the deployed process crashed
    Crashed,
    /// Any status string this client does not recognize
    #[serde(other)]
    Unknown,
}

impl DeploymentStatus {
    /// Parse a platform status string; unrecognized values map to `Unknown`
    pub fn parse(s: &str) -> Self {
        match s {
            "QUEUED" => Self::Queued,
            "WAITING" => Self::Waiting,
            "INITIALIZING" => Self::Initializing,
            "BUILDING" => Self::Building,
            "DEPLOYING" => Self::Deploying,
            "SUCCESS" => Self::Success,
            "FAILED" => Self::Failed,
            "CRASHED" => Self::Crashed,
            _ => Self::Unknown,
        }
    }

    /// Whether this status ends the deployment's lifecycle
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Crashed)
    }
}

impl std::fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Queued => "QUEUED",
            Self::Waiting => "WAITING",
            Self::Initializing => "INITIALIZING",
            Self::Building => "BUILDING",
            Self::Deploying => "DEPLOYING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::Crashed => "CRASHED",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// One status update pushed on a deployment's subscription channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentEvent {
    /// Deployment ID the update belongs to
    pub id: String,

    /// Reported status
    pub status: DeploymentStatus,
}
