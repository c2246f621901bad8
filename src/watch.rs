//! Deployment completion watching
//!
//! Consumes one deployment's push-style status channel and resolves it to a
//! single outcome within a bounded wait:
//!
//! ```text
//! watching ──▶ resolved-success      (SUCCESS pushed)
//!          ──▶ resolved-failure      (FAILED or CRASHED pushed)
//!          ──▶ resolved-unknown      (channel closed, no terminal status)
//!          ──▶ timed-out             (wait elapsed)
//! ```
//!
//! Exactly one outcome fires per subscription. Every exit path returns out
//! of the select loop, dropping both the pinned deadline timer and the
//! stream, so neither can fire or buffer after resolution.

use std::time::Duration;

use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::client::DeploymentStream;
use crate::environment::DeploymentStatus;
use crate::error::{ProvisionError, Result};

/// Default maximum wait for a deployment to reach a terminal status
pub const DEFAULT_MAX_WAIT_SECS: u64 = 900;

/// How one watched deployment resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentOutcome {
    /// The platform reported SUCCESS
    Succeeded,

    /// The platform reported a terminal failure, carrying the status
    Failed(DeploymentStatus),

    /// The channel closed before any terminal status was observed. A soft
    /// terminal state, not a failure.
    UnknownCompleted,
}

/// Watches a single deployment's status channel to resolution
pub struct DeploymentWatcher {
    max_wait: Duration,
}

impl DeploymentWatcher {
    /// Create a watcher with the default maximum wait (15 minutes)
    pub fn new() -> Self {
        Self::with_max_wait(Duration::from_secs(DEFAULT_MAX_WAIT_SECS))
    }

    /// Create a watcher with a custom maximum wait
    pub fn with_max_wait(max_wait: Duration) -> Self {
        Self { max_wait }
    }

    /// Get the configured maximum wait
    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    /// Drive the channel to resolution.
    ///
    /// Non-terminal statuses keep the channel open and are logged only.
    /// A deployment that never reaches a terminal status must not block the
    /// rollout indefinitely, so the wait is bounded: once `max_wait`
    /// elapses, the watch fails with [`ProvisionError::WatchTimeout`].
    pub async fn watch(
        &self,
        deployment_id: &str,
        mut events: DeploymentStream,
    ) -> Result<DeploymentOutcome> {
        info!(
            deployment_id,
            max_wait_secs = self.max_wait.as_secs(),
            "watching deployment"
        );

        let deadline = tokio::time::sleep(self.max_wait);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => {
                    warn!(deployment_id, "no terminal status within the wait");
                    return Err(ProvisionError::WatchTimeout {
                        id: deployment_id.to_string(),
                        waited: self.max_wait,
                    });
                }

                event = events.next() => match event {
                    None => {
                        info!(deployment_id, "channel closed without a terminal status");
                        return Ok(DeploymentOutcome::UnknownCompleted);
                    }
                    Some(event) => match event.status {
                        DeploymentStatus::Success => {
                            info!(deployment_id, "deployment succeeded");
                            return Ok(DeploymentOutcome::Succeeded);
                        }
                        status if status.is_terminal() => {
                            warn!(deployment_id, %status, "deployment failed");
                            return Ok(DeploymentOutcome::Failed(status));
                        }
                        status => {
                            debug!(deployment_id, %status, "deployment in progress");
                        }
                    },
                },
            }
        }
    }
}

impl Default for DeploymentWatcher {
    fn default() -> Self {
        Self::new()
    }
}
