//! In-memory platform fake for component tests
//!
//! Implements [`PlatformApi`] against scripted state and records every call
//! (including each status event a subscription stream actually yields) so
//! tests can assert on ordering.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::client::{DeploymentStream, PlatformApi};
use crate::environment::{
    DeploymentEvent, DeploymentStatus, DeploymentTrigger, Environment, EnvironmentSummary,
    Project, ServiceInstance,
};
use crate::error::{ProvisionError, Result};

/// One recorded interaction with the fake platform
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Call {
    Project,
    ListEnvironments,
    GetEnvironment(String),
    CreateEnvironment { name: String, source: String },
    DeleteEnvironment(String),
    UpsertVariables { service_id: String },
    UpdateTrigger { trigger_id: String, branch: String },
    Deploy { service_id: String },
    Subscribe { deployment_id: String },
    Event { deployment_id: String, status: DeploymentStatus },
}

#[derive(Default)]
struct State {
    /// One listing per `list_environments` call; the last entry repeats
    listings: Vec<Vec<EnvironmentSummary>>,
    environments: HashMap<String, Environment>,
    create_results: Vec<Result<Environment>>,
    service_names: HashMap<String, String>,
    /// Status events pushed on each deployment's channel, keyed by id
    deployment_events: HashMap<String, Vec<DeploymentStatus>>,
    fail_upsert_for: HashSet<String>,
    fail_trigger_for: HashSet<String>,
    fail_deploy_for: HashSet<String>,
    list_error: Option<ProvisionError>,
}

/// Scripted in-memory [`PlatformApi`] implementation
pub(crate) struct FakePlatform {
    calls: Arc<Mutex<Vec<Call>>>,
    state: Mutex<State>,
}

impl FakePlatform {
    pub(crate) fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            state: Mutex::new(State::default()),
        }
    }

    pub(crate) fn with_listing(self, listing: Vec<EnvironmentSummary>) -> Self {
        self.state.lock().unwrap().listings.push(listing);
        self
    }

    pub(crate) fn with_environment(self, environment: Environment) -> Self {
        self.state
            .lock()
            .unwrap()
            .environments
            .insert(environment.id.clone(), environment);
        self
    }

    pub(crate) fn with_create_result(self, result: Result<Environment>) -> Self {
        self.state.lock().unwrap().create_results.push(result);
        self
    }

    pub(crate) fn with_service_name(self, service_id: &str, name: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .service_names
            .insert(service_id.to_string(), name.to_string());
        self
    }

    pub(crate) fn with_deployment_events(
        self,
        deployment_id: &str,
        events: Vec<DeploymentStatus>,
    ) -> Self {
        self.state
            .lock()
            .unwrap()
            .deployment_events
            .insert(deployment_id.to_string(), events);
        self
    }

    pub(crate) fn with_failing_upsert(self, service_id: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .fail_upsert_for
            .insert(service_id.to_string());
        self
    }

    pub(crate) fn with_failing_trigger(self, trigger_id: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .fail_trigger_for
            .insert(trigger_id.to_string());
        self
    }

    pub(crate) fn with_failing_deploy(self, service_id: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .fail_deploy_for
            .insert(service_id.to_string());
        self
    }

    pub(crate) fn with_list_error(self, error: ProvisionError) -> Self {
        self.state.lock().unwrap().list_error = Some(error);
        self
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn call_count(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| matches(c)).count()
    }

    /// Index of the first call satisfying the predicate
    pub(crate) fn position(&self, matches: impl Fn(&Call) -> bool) -> Option<usize> {
        self.calls.lock().unwrap().iter().position(|c| matches(c))
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    /// Deterministic deployment id for a service's deploy
    pub(crate) fn deployment_id_for(service_id: &str) -> String {
        format!("dep-{service_id}")
    }
}

pub(crate) fn summary(id: &str, name: &str) -> EnvironmentSummary {
    EnvironmentSummary {
        id: id.to_string(),
        name: name.to_string(),
    }
}

pub(crate) fn instance(id: &str, service_id: &str, domains: &[&str]) -> ServiceInstance {
    ServiceInstance {
        id: id.to_string(),
        service_id: service_id.to_string(),
        domains: domains.iter().map(|d| d.to_string()).collect(),
    }
}

pub(crate) fn trigger(id: &str) -> DeploymentTrigger {
    DeploymentTrigger {
        id: id.to_string(),
        branch: Some("main".to_string()),
    }
}

pub(crate) fn ready_environment(id: &str, name: &str) -> Environment {
    Environment {
        id: id.to_string(),
        name: name.to_string(),
        created_at: None,
        service_instances: vec![instance("si-1", "svc-web", &["web.example.app"])],
        deployment_triggers: vec![trigger("tr-1")],
    }
}

#[async_trait]
impl PlatformApi for FakePlatform {
    async fn project(&self, project_id: &str) -> Result<Project> {
        self.record(Call::Project);
        Ok(Project {
            id: project_id.to_string(),
            name: "fake-project".to_string(),
            services: vec![],
        })
    }

    async fn list_environments(&self, _project_id: &str) -> Result<Vec<EnvironmentSummary>> {
        self.record(Call::ListEnvironments);
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.list_error.take() {
            return Err(err);
        }
        if state.listings.len() > 1 {
            Ok(state.listings.remove(0))
        } else {
            Ok(state.listings.first().cloned().unwrap_or_default())
        }
    }

    async fn environment(&self, environment_id: &str) -> Result<Environment> {
        self.record(Call::GetEnvironment(environment_id.to_string()));
        self.state
            .lock()
            .unwrap()
            .environments
            .get(environment_id)
            .cloned()
            .ok_or_else(|| ProvisionError::api(format!("no environment {environment_id}")))
    }

    async fn create_environment(
        &self,
        _project_id: &str,
        name: &str,
        source_environment_id: &str,
    ) -> Result<Environment> {
        self.record(Call::CreateEnvironment {
            name: name.to_string(),
            source: source_environment_id.to_string(),
        });
        let mut state = self.state.lock().unwrap();
        if state.create_results.is_empty() {
            return Err(ProvisionError::api("no scripted create result"));
        }
        state.create_results.remove(0)
    }

    async fn delete_environment(&self, environment_id: &str) -> Result<()> {
        self.record(Call::DeleteEnvironment(environment_id.to_string()));
        Ok(())
    }

    async fn upsert_variables(
        &self,
        _project_id: &str,
        _environment_id: &str,
        service_id: &str,
        _variables: &Map<String, Value>,
    ) -> Result<()> {
        self.record(Call::UpsertVariables {
            service_id: service_id.to_string(),
        });
        if self.state.lock().unwrap().fail_upsert_for.contains(service_id) {
            return Err(ProvisionError::api("variable upsert rejected"));
        }
        Ok(())
    }

    async fn update_trigger_branch(&self, trigger_id: &str, branch: &str) -> Result<()> {
        self.record(Call::UpdateTrigger {
            trigger_id: trigger_id.to_string(),
            branch: branch.to_string(),
        });
        if self.state.lock().unwrap().fail_trigger_for.contains(trigger_id) {
            return Err(ProvisionError::api("trigger update rejected"));
        }
        Ok(())
    }

    async fn deploy_service_instance(
        &self,
        _environment_id: &str,
        service_id: &str,
    ) -> Result<String> {
        self.record(Call::Deploy {
            service_id: service_id.to_string(),
        });
        if self.state.lock().unwrap().fail_deploy_for.contains(service_id) {
            return Err(ProvisionError::api("deploy rejected"));
        }
        Ok(Self::deployment_id_for(service_id))
    }

    async fn service_name(&self, service_id: &str) -> Result<String> {
        self.state
            .lock()
            .unwrap()
            .service_names
            .get(service_id)
            .cloned()
            .ok_or_else(|| ProvisionError::api(format!("no service {service_id}")))
    }

    fn subscribe_deployment(&self, deployment_id: &str) -> DeploymentStream {
        self.record(Call::Subscribe {
            deployment_id: deployment_id.to_string(),
        });
        let events = self
            .state
            .lock()
            .unwrap()
            .deployment_events
            .get(deployment_id)
            .cloned()
            .unwrap_or_default();
        let calls = Arc::clone(&self.calls);
        let id = deployment_id.to_string();

        Box::pin(async_stream::stream! {
            for status in events {
                calls.lock().unwrap().push(Call::Event {
                    deployment_id: id.clone(),
                    status,
                });
                yield DeploymentEvent {
                    id: id.clone(),
                    status,
                };
            }
        })
    }
}
