//! # Ephem Orchestrator
//!
//! Ephemeral preview-environment provisioning for automated pipelines.
//!
//! ## Architecture
//!
//! ```text
//! RolloutManager (one lifecycle operation)
//! ├── ApiClient          ←──  platform GraphQL API
//! ├── ReadinessPoller         (create fallback: bounded backoff)
//! ├── DeploymentWatcher       (bounded wait on the status channel)
//! └── RolloutPlan             (ignore set + explicit ordering)
//! ```
//!
//! One invocation creates (or destroys) exactly one environment: derive it
//! from a source environment, upsert a variable set onto every service,
//! point every deployment trigger at a branch, then deploy - either as an
//! ordered chain gated on each deployment's terminal status, or as one
//! concurrent batch.
//!
//! ## Eventually-consistent creation
//!
//! The platform's creation call can return before the environment is
//! actually populated, or time out at the gateway while creation proceeds
//! server-side. The orchestrator escalates both cases to the
//! [`ReadinessPoller`], which re-fetches the environment with exponential
//! backoff until it holds service instances and deployment triggers.
//!
//! ## Deployment watching
//!
//! Each deployment exposes a push-style status channel. The
//! [`DeploymentWatcher`] resolves it exactly once: success, failure
//! (carrying the terminal status), soft completion when the channel closes
//! early, or a timeout once the bounded wait elapses.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod config;
pub mod environment;
pub mod error;
pub mod plan;
pub mod poll;
pub mod rollout;
pub mod watch;

#[cfg(test)]
mod test_helpers;

// Error handling
pub use error::{ProvisionError, Result};

// Platform access
pub use client::{ApiClient, DeploymentStream, PlatformApi};

// Domain model
pub use environment::{
    DeploymentEvent, DeploymentStatus, DeploymentTrigger, Environment, EnvironmentSummary,
    Project, ProjectService, ServiceInstance,
};

// Operation configuration
pub use config::{Config, DEFAULT_API_SERVICE_FALLBACKS, DEFAULT_ENDPOINT};

// Readiness polling
pub use poll::{PollConfig, ReadinessPoller, DEFAULT_INITIAL_DELAY_MS, DEFAULT_MAX_ATTEMPTS};

// Deployment watching
pub use watch::{DeploymentOutcome, DeploymentWatcher, DEFAULT_MAX_WAIT_SECS};

// Rollout planning and orchestration
pub use plan::{PlannedService, RolloutPlan};
pub use rollout::{CreateOutcome, RolloutManager};
