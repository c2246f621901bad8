//! Environment readiness polling
//!
//! The platform's environment creation is eventually consistent: the create
//! call can return before service instances and deployment triggers exist,
//! or time out at the gateway while creation still proceeds server-side.
//! Polling absorbs that latency instead of guessing a fixed wait time.
//!
//! Each attempt lists the project's environments, locates the target by
//! name, and - when found - fetches the full description and tests the
//! readiness invariant. An environment that exists but is still incomplete
//! is treated exactly like one that does not exist yet: sleep, double the
//! delay, retry, up to the attempt cap.

use std::time::Duration;

use tracing::{debug, info};

use crate::client::PlatformApi;
use crate::environment::Environment;
use crate::error::Result;

/// Default maximum poll attempts
pub const DEFAULT_MAX_ATTEMPTS: u32 = 6;

/// Default delay before the first retry (milliseconds)
pub const DEFAULT_INITIAL_DELAY_MS: u64 = 2000;

/// Backoff multiplier applied after every retry (pure exponential, uncapped)
pub const BACKOFF_MULTIPLIER: u32 = 2;

/// Readiness polling parameters
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Maximum number of attempts before giving up
    pub max_attempts: u32,

    /// Delay before the first retry; doubles after each one
    pub initial_delay: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
        }
    }
}

impl PollConfig {
    /// Set the attempt cap
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set the initial retry delay
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sleep before the k-th retry (1-based): `initial_delay * 2^(k-1)`
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        self.initial_delay * BACKOFF_MULTIPLIER.pow(retry.saturating_sub(1))
    }
}

/// Polls a project until the target environment satisfies the readiness
/// invariant, with bounded exponential backoff
pub struct ReadinessPoller {
    config: PollConfig,
}

impl ReadinessPoller {
    /// Create a poller with default parameters
    pub fn new() -> Self {
        Self::with_config(PollConfig::default())
    }

    /// Create a poller with custom parameters
    pub fn with_config(config: PollConfig) -> Self {
        Self { config }
    }

    /// Get the configured attempt cap
    pub fn max_attempts(&self) -> u32 {
        self.config.max_attempts
    }

    /// Poll until the environment named `name` exists and is ready.
    ///
    /// Returns `Some(description)` on the first attempt where the readiness
    /// invariant holds, `None` when the attempt cap is exhausted without one.
    /// `None` is not itself a fatal error - the caller decides (for a create
    /// operation it is, since there is no environment to operate on).
    pub async fn wait_for_ready(
        &self,
        api: &dyn PlatformApi,
        project_id: &str,
        name: &str,
    ) -> Result<Option<Environment>> {
        for attempt in 1..=self.config.max_attempts {
            debug!(attempt, name, "polling for environment");

            let summaries = api.list_environments(project_id).await?;
            let found = summaries.into_iter().find(|s| s.name == name);

            if let Some(summary) = found {
                let environment = api.environment(&summary.id).await?;
                if environment.is_ready() {
                    info!(
                        name,
                        attempt,
                        services = environment.service_instances.len(),
                        triggers = environment.deployment_triggers.len(),
                        "environment is ready"
                    );
                    return Ok(Some(environment));
                }
                debug!(name, attempt, "environment exists but is still provisioning");
            } else {
                debug!(name, attempt, "environment not listed yet");
            }

            if attempt < self.config.max_attempts {
                let delay = self.config.delay_for_retry(attempt);
                debug!(delay_ms = delay.as_millis() as u64, "backing off before retry");
                tokio::time::sleep(delay).await;
            }
        }

        info!(
            name,
            attempts = self.config.max_attempts,
            "environment never became ready"
        );
        Ok(None)
    }
}

impl Default for ReadinessPoller {
    fn default() -> Self {
        Self::new()
    }
}
