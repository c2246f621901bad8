//! Platform API client
//!
//! One GraphQL endpoint, two channels: a request/response channel for
//! queries and mutations, and a push-style status channel per deployment.
//!
//! The dispatcher performs exactly one network call per invocation and never
//! retries; retry policy belongs to its callers (the readiness poller and the
//! rollout orchestrator). Failure classification also happens at the call
//! site: only the environment-creation caller treats a gateway-timeout-class
//! transport failure as recoverable (see
//! [`ProvisionError::is_gateway_timeout`]).

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio::time::interval;
use tracing::{debug, warn};

use crate::environment::{
    DeploymentEvent, DeploymentStatus, DeploymentTrigger, Environment, EnvironmentSummary,
    Project, ProjectService, ServiceInstance,
};
use crate::error::{ProvisionError, Result};

/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default interval between status updates on a deployment's channel
pub const DEFAULT_SUBSCRIBE_INTERVAL_MS: u64 = 5000;

/// Push channel for a single deployment's status updates.
///
/// The subscriber owns the stream; dropping it closes the channel.
pub type DeploymentStream = Pin<Box<dyn Stream<Item = DeploymentEvent> + Send>>;

/// Interface to the remote platform.
///
/// The orchestration components (rollout, readiness polling, watching) work
/// through this interface only - never the concrete client - so every one of
/// them is testable against a fabricated platform.
#[async_trait]
pub trait PlatformApi: Send + Sync {
    /// Project metadata lookup (name and logical services)
    async fn project(&self, project_id: &str) -> Result<Project>;

    /// List the project's environments (id + name)
    async fn list_environments(&self, project_id: &str) -> Result<Vec<EnvironmentSummary>>;

    /// Fetch one environment's full description
    async fn environment(&self, environment_id: &str) -> Result<Environment>;

    /// Create an environment derived from a source environment.
    ///
    /// The returned description may be structurally incomplete - creation is
    /// eventually consistent on the platform side.
    async fn create_environment(
        &self,
        project_id: &str,
        name: &str,
        source_environment_id: &str,
    ) -> Result<Environment>;

    /// Delete an environment (fire-and-confirm, no polling)
    async fn delete_environment(&self, environment_id: &str) -> Result<()>;

    /// Upsert the variable set on one service in one environment
    async fn upsert_variables(
        &self,
        project_id: &str,
        environment_id: &str,
        service_id: &str,
        variables: &Map<String, Value>,
    ) -> Result<()>;

    /// Point one deployment trigger at a branch
    async fn update_trigger_branch(&self, trigger_id: &str, branch: &str) -> Result<()>;

    /// Trigger a deploy of one service instance; returns the deployment id
    async fn deploy_service_instance(
        &self,
        environment_id: &str,
        service_id: &str,
    ) -> Result<String>;

    /// Resolve a logical service's human-readable name
    async fn service_name(&self, service_id: &str) -> Result<String>;

    /// Open the push channel for one deployment's status updates
    fn subscribe_deployment(&self, deployment_id: &str) -> DeploymentStream;
}

const PROJECT_QUERY: &str = r#"
query project($id: String!) {
    project(id: $id) {
        id
        name
        services {
            edges {
                node {
                    id
                    name
                }
            }
        }
    }
}"#;

const ENVIRONMENTS_QUERY: &str = r#"
query environments($projectId: String!) {
    environments(projectId: $projectId) {
        edges {
            node {
                id
                name
            }
        }
    }
}"#;

const ENVIRONMENT_QUERY: &str = r#"
query environment($id: String!) {
    environment(id: $id) {
        id
        name
        createdAt
        serviceInstances {
            edges {
                node {
                    id
                    serviceId
                    domains {
                        serviceDomains {
                            domain
                        }
                    }
                }
            }
        }
        deploymentTriggers {
            edges {
                node {
                    id
                    branch
                }
            }
        }
    }
}"#;

const ENVIRONMENT_CREATE_MUTATION: &str = r#"
mutation environmentCreate($input: EnvironmentCreateInput!) {
    environmentCreate(input: $input) {
        id
        name
        createdAt
        serviceInstances {
            edges {
                node {
                    id
                    serviceId
                    domains {
                        serviceDomains {
                            domain
                        }
                    }
                }
            }
        }
        deploymentTriggers {
            edges {
                node {
                    id
                    branch
                }
            }
        }
    }
}"#;

const ENVIRONMENT_DELETE_MUTATION: &str = r#"
mutation environmentDelete($id: String!) {
    environmentDelete(id: $id)
}"#;

const VARIABLE_UPSERT_MUTATION: &str = r#"
mutation variableCollectionUpsert($input: VariableCollectionUpsertInput!) {
    variableCollectionUpsert(input: $input)
}"#;

const TRIGGER_UPDATE_MUTATION: &str = r#"
mutation deploymentTriggerUpdate($id: String!, $input: DeploymentTriggerUpdateInput!) {
    deploymentTriggerUpdate(id: $id, input: $input) {
        id
    }
}"#;

const SERVICE_DEPLOY_MUTATION: &str = r#"
mutation serviceInstanceDeploy($environmentId: String!, $serviceId: String!) {
    serviceInstanceDeployV2(environmentId: $environmentId, serviceId: $serviceId)
}"#;

const SERVICE_QUERY: &str = r#"
query service($id: String!) {
    service(id: $id) {
        name
    }
}"#;

const DEPLOYMENT_QUERY: &str = r#"
query deployment($id: String!) {
    deployment(id: $id) {
        id
        status
    }
}"#;

/// GraphQL client for the platform API
///
/// Establishes a fresh authenticated connection per call; connection pooling
/// is deliberately not part of the contract.
#[derive(Debug, Clone)]
pub struct ApiClient {
    endpoint: String,
    token: String,
    request_timeout: Duration,
    subscribe_interval: Duration,
}

impl ApiClient {
    /// Create a client against an endpoint with a bearer credential
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            token: token.into(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            subscribe_interval: Duration::from_millis(DEFAULT_SUBSCRIBE_INTERVAL_MS),
        }
    }

    /// Set the per-request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the interval between updates on deployment status channels
    pub fn with_subscribe_interval(mut self, interval: Duration) -> Self {
        self.subscribe_interval = interval;
        self
    }

    /// Perform exactly one call: post a query/mutation document with its
    /// variables and return the decoded `data` payload.
    async fn request(&self, document: &str, variables: Value) -> Result<Value> {
        let client = reqwest::Client::builder()
            .timeout(self.request_timeout)
            .build()?;

        debug!(endpoint = %self.endpoint, "dispatching platform API call");

        let response = client
            .post(self.endpoint.as_str())
            .bearer_auth(&self.token)
            .json(&json!({ "query": document, "variables": variables }))
            .send()
            .await?
            .error_for_status()?;

        let body: GraphQlResponse = response.json().await?;

        if let Some(errors) = body.errors {
            if !errors.is_empty() {
                let joined = errors
                    .into_iter()
                    .map(|e| e.message)
                    .collect::<Vec<_>>()
                    .join("; ");
                return Err(ProvisionError::api(joined));
            }
        }

        body.data
            .ok_or_else(|| ProvisionError::api("response carried no data"))
    }

    /// Fetch one deployment's current `{id, status}` record
    async fn deployment(&self, deployment_id: &str) -> Result<DeploymentEvent> {
        let data = self
            .request(DEPLOYMENT_QUERY, json!({ "id": deployment_id }))
            .await?;
        let node: DeploymentNode = take(data, "deployment")?;
        Ok(DeploymentEvent {
            id: node.id,
            status: DeploymentStatus::parse(&node.status),
        })
    }
}

#[async_trait]
impl PlatformApi for ApiClient {
    async fn project(&self, project_id: &str) -> Result<Project> {
        let data = self.request(PROJECT_QUERY, json!({ "id": project_id })).await?;
        let node: ProjectNode = take(data, "project")?;
        Ok(node.into())
    }

    async fn list_environments(&self, project_id: &str) -> Result<Vec<EnvironmentSummary>> {
        let data = self
            .request(ENVIRONMENTS_QUERY, json!({ "projectId": project_id }))
            .await?;
        let connection: Connection<EnvironmentSummaryNode> = take(data, "environments")?;
        Ok(connection
            .edges
            .into_iter()
            .map(|edge| EnvironmentSummary {
                id: edge.node.id,
                name: edge.node.name,
            })
            .collect())
    }

    async fn environment(&self, environment_id: &str) -> Result<Environment> {
        let data = self
            .request(ENVIRONMENT_QUERY, json!({ "id": environment_id }))
            .await?;
        let node: EnvironmentNode = take(data, "environment")?;
        Ok(node.into())
    }

    async fn create_environment(
        &self,
        project_id: &str,
        name: &str,
        source_environment_id: &str,
    ) -> Result<Environment> {
        let variables = json!({
            "input": {
                "name": name,
                "projectId": project_id,
                "sourceEnvironmentId": source_environment_id,
            }
        });
        let data = self.request(ENVIRONMENT_CREATE_MUTATION, variables).await?;
        let node: EnvironmentNode = take(data, "environmentCreate")?;
        Ok(node.into())
    }

    async fn delete_environment(&self, environment_id: &str) -> Result<()> {
        self.request(ENVIRONMENT_DELETE_MUTATION, json!({ "id": environment_id }))
            .await?;
        Ok(())
    }

    async fn upsert_variables(
        &self,
        project_id: &str,
        environment_id: &str,
        service_id: &str,
        variables: &Map<String, Value>,
    ) -> Result<()> {
        let payload = json!({
            "input": {
                "projectId": project_id,
                "environmentId": environment_id,
                "serviceId": service_id,
                "variables": variables,
            }
        });
        self.request(VARIABLE_UPSERT_MUTATION, payload).await?;
        Ok(())
    }

    async fn update_trigger_branch(&self, trigger_id: &str, branch: &str) -> Result<()> {
        let variables = json!({
            "id": trigger_id,
            "input": { "branch": branch },
        });
        self.request(TRIGGER_UPDATE_MUTATION, variables).await?;
        Ok(())
    }

    async fn deploy_service_instance(
        &self,
        environment_id: &str,
        service_id: &str,
    ) -> Result<String> {
        let variables = json!({
            "environmentId": environment_id,
            "serviceId": service_id,
        });
        let data = self.request(SERVICE_DEPLOY_MUTATION, variables).await?;
        take(data, "serviceInstanceDeployV2")
    }

    async fn service_name(&self, service_id: &str) -> Result<String> {
        let data = self.request(SERVICE_QUERY, json!({ "id": service_id })).await?;
        let node: ServiceNode = take(data, "service")?;
        Ok(node.name)
    }

    /// Open the push channel for one deployment.
    ///
    /// Yields each observed status and closes itself after pushing a terminal
    /// one (server-initiated completion). A lost connection also closes the
    /// channel without a terminal status; the watcher treats that as the
    /// soft `unknown-completed` outcome.
    fn subscribe_deployment(&self, deployment_id: &str) -> DeploymentStream {
        let client = self.clone();
        let id = deployment_id.to_string();

        Box::pin(async_stream::stream! {
            let mut ticker = interval(client.subscribe_interval);
            loop {
                ticker.tick().await;

                match client.deployment(&id).await {
                    Ok(event) => {
                        let terminal = event.status.is_terminal();
                        yield event;
                        if terminal {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(deployment_id = %id, error = %e, "status channel lost, closing");
                        break;
                    }
                }
            }
        })
    }
}

/// GraphQL response envelope
#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<Value>,
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

/// Relay-style connection wrapper used throughout the platform's schema
#[derive(Debug, Deserialize)]
struct Connection<T> {
    #[serde(default = "Vec::new")]
    edges: Vec<Edge<T>>,
}

#[derive(Debug, Deserialize)]
struct Edge<T> {
    node: T,
}

#[derive(Debug, Deserialize)]
struct EnvironmentSummaryNode {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnvironmentNode {
    id: String,
    name: String,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    service_instances: Option<Connection<ServiceInstanceNode>>,
    #[serde(default)]
    deployment_triggers: Option<Connection<TriggerNode>>,
}

impl From<EnvironmentNode> for Environment {
    fn from(node: EnvironmentNode) -> Self {
        Environment {
            id: node.id,
            name: node.name,
            created_at: node.created_at,
            service_instances: node
                .service_instances
                .map(|c| c.edges.into_iter().map(|e| e.node.into()).collect())
                .unwrap_or_default(),
            deployment_triggers: node
                .deployment_triggers
                .map(|c| {
                    c.edges
                        .into_iter()
                        .map(|e| DeploymentTrigger {
                            id: e.node.id,
                            branch: e.node.branch,
                        })
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceInstanceNode {
    id: String,
    service_id: String,
    #[serde(default)]
    domains: Option<DomainsNode>,
}

impl From<ServiceInstanceNode> for ServiceInstance {
    fn from(node: ServiceInstanceNode) -> Self {
        ServiceInstance {
            id: node.id,
            service_id: node.service_id,
            domains: node
                .domains
                .map(|d| d.service_domains.into_iter().map(|s| s.domain).collect())
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DomainsNode {
    #[serde(default)]
    service_domains: Vec<ServiceDomainNode>,
}

#[derive(Debug, Deserialize)]
struct ServiceDomainNode {
    domain: String,
}

#[derive(Debug, Deserialize)]
struct TriggerNode {
    id: String,
    #[serde(default)]
    branch: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProjectNode {
    id: String,
    name: String,
    #[serde(default)]
    services: Option<Connection<ServiceRefNode>>,
}

impl From<ProjectNode> for Project {
    fn from(node: ProjectNode) -> Self {
        Project {
            id: node.id,
            name: node.name,
            services: node
                .services
                .map(|c| {
                    c.edges
                        .into_iter()
                        .map(|e| ProjectService {
                            id: e.node.id,
                            name: e.node.name,
                        })
                        .collect()
                })
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ServiceRefNode {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct ServiceNode {
    name: String,
}

#[derive(Debug, Deserialize)]
struct DeploymentNode {
    id: String,
    status: String,
}

/// Pull one named field out of a `data` payload and decode it
fn take<T: serde::de::DeserializeOwned>(mut data: Value, field: &str) -> Result<T> {
    let value = data
        .get_mut(field)
        .map(Value::take)
        .ok_or_else(|| ProvisionError::api(format!("response missing '{field}'")))?;
    serde_json::from_value(value).map_err(ProvisionError::from)
}
