//! Ephem - ephemeral preview environments for automated pipelines
//!
//! ## Usage
//!
//! ```bash
//! # Create a preview environment derived from staging and deploy it
//! ephem create --project-id <id> --env-name pr-42 \
//!     --source-env staging --branch feat-thing \
//!     --env-vars '{"FEATURE_FLAG":"on"}' \
//!     --order web,worker --ignore migrate
//!
//! # Tear it down
//! ephem destroy --project-id <id> --env-name pr-42
//! ```
//!
//! The bearer credential is read from `EPHEM_API_TOKEN` at startup and
//! attached to every call. Failures exit non-zero so a host pipeline can
//! gate on the result; on success the created environment's
//! externally-facing address is printed as `service_domain=<domain>`.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use ephem_orchestrator::{
    ApiClient, Config, PlatformApi, RolloutManager, DEFAULT_ENDPOINT,
};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable holding the platform bearer credential
const TOKEN_ENV_VAR: &str = "EPHEM_API_TOKEN";

/// Ephem: ephemeral preview environment provisioning
#[derive(Parser)]
#[command(name = "ephem")]
#[command(about = "Provision and tear down ephemeral preview environments", long_about = None)]
struct Cli {
    /// Platform GraphQL endpoint
    #[arg(long, global = true, default_value = DEFAULT_ENDPOINT)]
    endpoint: String,

    /// Project the environment lives in
    #[arg(long, global = true)]
    project_id: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an environment derived from a source environment and deploy it
    Create {
        /// Destination environment name (e.g. pr-42)
        #[arg(long)]
        env_name: String,

        /// Source environment name to derive from
        #[arg(long)]
        source_env: Option<String>,

        /// Source environment id (skips the name lookup)
        #[arg(long)]
        source_env_id: Option<String>,

        /// Branch every deployment trigger is pointed at
        #[arg(long)]
        branch: String,

        /// Variable set upserted onto every service (JSON object)
        #[arg(long, default_value = "{}")]
        env_vars: String,

        /// Externally-facing service name (falls back to app/backend/web)
        #[arg(long)]
        api_service: Option<String>,

        /// Deploy these services one at a time, in this order,
        /// each gated on the previous deployment completing
        #[arg(long, value_delimiter = ',')]
        order: Vec<String>,

        /// Service names excluded from deployment
        #[arg(long, value_delimiter = ',')]
        ignore: Vec<String>,

        /// Maximum wait per watched deployment (seconds)
        #[arg(long, default_value_t = 900)]
        max_deploy_wait: u64,
    },

    /// Destroy the environment with the given name
    Destroy {
        /// Environment name to destroy (exactly one match required)
        #[arg(long)]
        env_name: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ephem_orchestrator=info,info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let token = std::env::var(TOKEN_ENV_VAR)
        .map_err(|_| anyhow::anyhow!("{TOKEN_ENV_VAR} must be set"))?;
    let project_id = cli
        .project_id
        .ok_or_else(|| anyhow::anyhow!("--project-id is required"))?;

    match cli.command {
        Commands::Create {
            env_name,
            source_env,
            source_env_id,
            branch,
            env_vars,
            api_service,
            order,
            ignore,
            max_deploy_wait,
        } => {
            let variables = Config::parse_variables(&env_vars)?;

            let mut config = Config::new(token, project_id, env_name)
                .with_endpoint(cli.endpoint)
                .with_branch(branch)
                .with_variables(variables)
                .with_deployment_order(order)
                .with_ignore_services(ignore)
                .with_deploy_max_wait(Duration::from_secs(max_deploy_wait));
            if let Some(name) = source_env {
                config = config.with_source_env_name(name);
            }
            if let Some(id) = source_env_id {
                config = config.with_source_env_id(id);
            }
            if let Some(name) = api_service {
                config = config.with_api_service_name(name);
            }

            let api = Arc::new(ApiClient::new(config.endpoint.clone(), config.token.clone()));

            info!("🚀 Creating environment '{}'", config.dest_env_name);
            let project = api.project(&config.project_id).await?;
            info!("📦 Project: {}", project.name);

            let manager = RolloutManager::new(config, api);
            let outcome = manager.create().await?;

            info!(
                "✅ Environment '{}' ({}) is rolling",
                outcome.environment_name, outcome.environment_id
            );
            if let Some(domain) = &outcome.service_domain {
                info!("🌐 Service address: {}", domain);
                // The host pipeline captures stdout
                println!("service_domain={domain}");
            }
            Ok(())
        }

        Commands::Destroy { env_name } => {
            let config = Config::new(token, project_id, env_name).with_endpoint(cli.endpoint);
            let api = Arc::new(ApiClient::new(config.endpoint.clone(), config.token.clone()));

            info!("🗑️  Destroying environment '{}'", config.dest_env_name);
            let manager = RolloutManager::new(config, api);
            manager.destroy().await?;
            info!("✅ Environment destroyed");
            Ok(())
        }
    }
}
