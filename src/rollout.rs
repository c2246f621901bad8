//! Environment lifecycle orchestration
//!
//! One [`RolloutManager`] drives one environment-lifecycle operation:
//!
//! ```text
//! create
//!     │
//!     ├── 1. Validate identifying inputs (no network yet)
//!     ├── 2. Existence check (destination name must be free)
//!     ├── 3. Resolve source environment id
//!     ├── 4. Create environment ──(timeout/incomplete)──▶ readiness polling
//!     ├── 5. Fan out: variables per service, branch per trigger
//!     ├── 6. Build the rollout plan (ignore set, explicit order)
//!     ├── 7. Deploy: ordered chain gated on completion, or concurrent batch
//!     └── 8. Surface the externally-facing service's address
//! ```
//!
//! Steps 1-4, a bad order in step 6 and a broken chain in step 7 are fatal;
//! per-item failures inside step 5's batches (and step 7's unordered batch)
//! are logged and absorbed at the batch boundary.
//!
//! The existence check in step 2 is a best-effort guard against overwriting,
//! not a distributed lock; two invocations racing on the same destination
//! name are out of scope.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::client::PlatformApi;
use crate::config::Config;
use crate::environment::Environment;
use crate::error::{ProvisionError, Result};
use crate::plan::{PlannedService, RolloutPlan};
use crate::poll::ReadinessPoller;
use crate::watch::{DeploymentOutcome, DeploymentWatcher};

/// Result of a successful create operation
#[derive(Debug, Clone)]
pub struct CreateOutcome {
    /// Id of the created environment
    pub environment_id: String,

    /// Name of the created environment
    pub environment_name: String,

    /// The externally-facing service's published address, when one exists
    pub service_domain: Option<String>,
}

/// Drives one environment-lifecycle operation against the platform
pub struct RolloutManager {
    config: Config,
    api: Arc<dyn PlatformApi>,
    poller: ReadinessPoller,
    watcher: DeploymentWatcher,
}

impl RolloutManager {
    /// Create a manager; the poller and watcher are configured from the
    /// operation config
    pub fn new(config: Config, api: Arc<dyn PlatformApi>) -> Self {
        let poller = ReadinessPoller::with_config(config.poll.clone());
        let watcher = DeploymentWatcher::with_max_wait(config.deploy_max_wait);
        Self {
            config,
            api,
            poller,
            watcher,
        }
    }

    /// Create the destination environment and roll out its services
    pub async fn create(&self) -> Result<CreateOutcome> {
        self.config.validate_for_create()?;
        let config = &self.config;

        info!(
            name = %config.dest_env_name,
            project_id = %config.project_id,
            "creating environment"
        );

        let existing = self.api.list_environments(&config.project_id).await?;
        if existing.iter().any(|e| e.name == config.dest_env_name) {
            return Err(ProvisionError::config(format!(
                "environment '{}' already exists; delete it and try again",
                config.dest_env_name
            )));
        }

        let source_id = match &config.source_env_id {
            Some(id) => id.clone(),
            None => {
                let name = config.source_env_name.as_deref().unwrap_or_default();
                existing
                    .iter()
                    .find(|e| e.name == name)
                    .map(|e| e.id.clone())
                    .ok_or_else(|| {
                        ProvisionError::config(format!("source environment '{name}' not found"))
                    })?
            }
        };

        let environment = self.create_with_fallback(&source_id).await?;
        info!(
            environment_id = %environment.id,
            services = environment.service_instances.len(),
            triggers = environment.deployment_triggers.len(),
            "environment provisioned"
        );

        self.push_variables(&environment).await;
        self.push_trigger_branches(&environment).await;

        let plan = self.build_plan(&environment).await?;
        self.deploy(&environment, &plan).await?;

        let service_domain = plan
            .api_service(
                config.api_service_name.as_deref(),
                &config.api_service_fallbacks,
            )
            .and_then(|s| s.domains.first().cloned());

        match &service_domain {
            Some(domain) => info!(%domain, "externally-facing service address"),
            None => debug!("no externally-facing service address published"),
        }

        Ok(CreateOutcome {
            environment_id: environment.id,
            environment_name: environment.name,
            service_domain,
        })
    }

    /// Destroy the environment named by the destination input.
    ///
    /// Exactly one name match is required. Deletion is fire-and-confirm; no
    /// polling.
    pub async fn destroy(&self) -> Result<()> {
        self.config.validate_for_destroy()?;
        let name = &self.config.dest_env_name;

        let environments = self.api.list_environments(&self.config.project_id).await?;
        let matches: Vec<_> = environments.iter().filter(|e| e.name == *name).collect();

        match matches.as_slice() {
            [environment] => {
                info!(environment_id = %environment.id, %name, "deleting environment");
                self.api.delete_environment(&environment.id).await?;
                info!(%name, "environment deleted");
                Ok(())
            }
            [] => Err(ProvisionError::config(format!(
                "environment '{name}' does not exist, nothing to destroy"
            ))),
            many => Err(ProvisionError::config(format!(
                "{} environments named '{name}', refusing to destroy",
                many.len()
            ))),
        }
    }

    /// Create the environment, escalating to readiness polling when the
    /// call times out at the gateway or returns an incomplete description
    async fn create_with_fallback(&self, source_id: &str) -> Result<Environment> {
        let config = &self.config;
        match self
            .api
            .create_environment(&config.project_id, &config.dest_env_name, source_id)
            .await
        {
            Ok(environment) if environment.is_ready() => Ok(environment),
            Ok(environment) => {
                info!(
                    environment_id = %environment.id,
                    "creation returned an incomplete environment, polling"
                );
                self.poll_until_ready().await
            }
            Err(e) if e.is_gateway_timeout() => {
                warn!(error = %e, "creation timed out at the gateway, polling for the environment");
                self.poll_until_ready().await
            }
            Err(e) => Err(e),
        }
    }

    async fn poll_until_ready(&self) -> Result<Environment> {
        let config = &self.config;
        self.poller
            .wait_for_ready(self.api.as_ref(), &config.project_id, &config.dest_env_name)
            .await?
            .ok_or_else(|| ProvisionError::EnvironmentNeverReady {
                name: config.dest_env_name.clone(),
                attempts: self.poller.max_attempts(),
            })
    }

    /// Upsert the variable set on every service instance concurrently.
    /// A failure on one never blocks the others.
    async fn push_variables(&self, environment: &Environment) {
        let config = &self.config;
        let updates = environment.service_instances.iter().map(|instance| {
            let api = Arc::clone(&self.api);
            async move {
                if let Err(e) = api
                    .upsert_variables(
                        &config.project_id,
                        &environment.id,
                        &instance.service_id,
                        &config.variables,
                    )
                    .await
                {
                    warn!(service_id = %instance.service_id, error = %e, "variable upsert failed");
                }
            }
        });
        join_all(updates).await;
        debug!(
            services = environment.service_instances.len(),
            "variable fan-out settled"
        );
    }

    /// Point every deployment trigger at the configured branch concurrently.
    /// An unmodified trigger would still deploy the wrong source branch, so
    /// every trigger is updated before any deploy starts.
    async fn push_trigger_branches(&self, environment: &Environment) {
        let config = &self.config;
        let updates = environment.deployment_triggers.iter().map(|trigger| {
            let api = Arc::clone(&self.api);
            async move {
                if let Err(e) = api.update_trigger_branch(&trigger.id, &config.branch).await {
                    warn!(trigger_id = %trigger.id, error = %e, "trigger branch update failed");
                }
            }
        });
        join_all(updates).await;
        debug!(
            triggers = environment.deployment_triggers.len(),
            branch = %config.branch,
            "trigger fan-out settled"
        );
    }

    /// Resolve service names and build the rollout plan
    async fn build_plan(&self, environment: &Environment) -> Result<RolloutPlan> {
        let mut services = Vec::with_capacity(environment.service_instances.len());
        for instance in &environment.service_instances {
            let name = self.api.service_name(&instance.service_id).await?;
            services.push(PlannedService {
                service_id: instance.service_id.clone(),
                name,
                domains: instance.domains.clone(),
            });
        }
        RolloutPlan::build(
            services,
            &self.config.ignore_services,
            self.config.deployment_order.as_deref(),
        )
    }

    async fn deploy(&self, environment: &Environment, plan: &RolloutPlan) -> Result<()> {
        if plan.services().is_empty() {
            info!("no services planned for deployment");
            return Ok(());
        }

        if plan.is_ordered() {
            self.deploy_ordered(environment, plan).await
        } else {
            self.deploy_unordered(environment, plan).await;
            Ok(())
        }
    }

    /// Deploy one service at a time, each gated on the previous deployment
    /// reaching a terminal (or soft-terminal) outcome. A failure aborts the
    /// remaining chain; later services are never started.
    async fn deploy_ordered(&self, environment: &Environment, plan: &RolloutPlan) -> Result<()> {
        for service in plan.services() {
            info!(service = %service.name, "deploying");
            let deployment_id = self
                .api
                .deploy_service_instance(&environment.id, &service.service_id)
                .await?;

            let events = self.api.subscribe_deployment(&deployment_id);
            match self.watcher.watch(&deployment_id, events).await? {
                DeploymentOutcome::Succeeded => {
                    info!(service = %service.name, %deployment_id, "deployment succeeded");
                }
                DeploymentOutcome::UnknownCompleted => {
                    warn!(
                        service = %service.name,
                        %deployment_id,
                        "deployment completed without a terminal status, continuing"
                    );
                }
                DeploymentOutcome::Failed(status) => {
                    return Err(ProvisionError::DeploymentFailed {
                        id: deployment_id,
                        status,
                    });
                }
            }
        }
        Ok(())
    }

    /// Trigger all deploys concurrently without awaiting completion status.
    /// Per-item trigger failures are logged and do not affect siblings.
    async fn deploy_unordered(&self, environment: &Environment, plan: &RolloutPlan) {
        let deploys = plan.services().iter().map(|service| {
            let api = Arc::clone(&self.api);
            async move {
                match api
                    .deploy_service_instance(&environment.id, &service.service_id)
                    .await
                {
                    Ok(deployment_id) => {
                        info!(service = %service.name, %deployment_id, "deploy triggered");
                    }
                    Err(e) => {
                        warn!(service = %service.name, error = %e, "deploy trigger failed");
                    }
                }
            }
        });
        join_all(deploys).await;
    }
}
