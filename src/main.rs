use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use fargate_deploy_rs::config::AppConfig;
use fargate_deploy_rs::converge::ConvergenceDriver;
use fargate_deploy_rs::descriptor::{validate_descriptor, DeploymentDescriptor};
use fargate_deploy_rs::logging::{init_logging, LogConfig};
use fargate_deploy_rs::provider::AwsProvider;
use fargate_deploy_rs::status::{probe_endpoint, StatusReporter};

#[cfg(feature = "docker-preflight")]
use fargate_deploy_rs::artifact::ImagePreflight;

#[derive(Parser)]
#[command(
    name = "fargate-deploy",
    version,
    about = "Converge AWS ECS Fargate resources to match a deployment descriptor"
)]
struct Cli {
    /// AWS region override
    #[arg(long, global = true)]
    region: Option<String>,

    /// AWS credentials profile override
    #[arg(long, global = true)]
    profile: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a commented sample descriptor
    Init {
        #[arg(default_value = "deployment.toml")]
        path: PathBuf,
    },

    /// Validate a descriptor without touching any remote API
    Validate { descriptor: PathBuf },

    /// Converge cloud resources to match the descriptor
    Apply {
        descriptor: PathBuf,

        /// Return right after convergence instead of waiting for a
        /// running task
        #[arg(long)]
        no_wait: bool,

        /// Skip the local image check and push
        #[arg(long)]
        skip_preflight: bool,
    },

    /// Show the current tasks of a deployed descriptor
    Status { descriptor: PathBuf },

    /// Send one JSON message to the deployed endpoint
    Probe {
        descriptor: PathBuf,

        #[arg(long, default_value = "ping")]
        message: String,

        #[arg(long, default_value = "/chat")]
        path: String,
    },

    /// Tear down everything the descriptor created
    Destroy {
        descriptor: PathBuf,

        /// Destroy without asking
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load()?;
    if cli.region.is_some() {
        config.aws.region = cli.region.clone();
    }
    if cli.profile.is_some() {
        config.aws.profile = cli.profile.clone();
    }

    let _guard = init_logging(&LogConfig::from_app_config(&config))?;

    match cli.command {
        Command::Init { path } => init_descriptor(&path),
        Command::Validate { descriptor } => {
            let descriptor = DeploymentDescriptor::from_path(&descriptor)?;
            validate_descriptor(&descriptor)?;
            println!("Descriptor '{}' is valid", descriptor.name);
            Ok(())
        }
        Command::Apply {
            descriptor,
            no_wait,
            skip_preflight,
        } => apply(&config, &descriptor, no_wait, skip_preflight).await,
        Command::Status { descriptor } => status(&config, &descriptor).await,
        Command::Probe {
            descriptor,
            message,
            path,
        } => probe(&config, &descriptor, &message, &path).await,
        Command::Destroy { descriptor, yes } => destroy(&config, &descriptor, yes).await,
    }
}

async fn provider_for(config: &AppConfig) -> Result<Arc<AwsProvider>> {
    let provider =
        AwsProvider::from_env(config.aws.region.clone(), config.aws.profile.clone()).await?;
    Ok(Arc::new(provider))
}

async fn apply(
    config: &AppConfig,
    path: &Path,
    no_wait: bool,
    skip_preflight: bool,
) -> Result<()> {
    let descriptor = DeploymentDescriptor::from_path(path)?;
    let port = descriptor.container_port;

    #[cfg(feature = "docker-preflight")]
    if !skip_preflight {
        run_preflight(&descriptor.image).await;
    }
    #[cfg(not(feature = "docker-preflight"))]
    let _ = skip_preflight;

    let provider = provider_for(config).await?;
    let driver = ConvergenceDriver::new(provider.clone());

    let mut result = driver.apply(descriptor).await?;
    println!("Convergence finished: {}", result.plan);
    for change in &result.plan.changes {
        println!("  {:<16} {:<10} {}", change.kind.to_string(), change.action.to_string(), change.id);
    }

    if no_wait {
        println!("Not waiting for tasks; run 'fargate-deploy status' to watch them");
        return Ok(());
    }

    let reporter = StatusReporter::new(provider, config.poll_settings());
    let cancel = cancel_on_ctrl_c();
    let endpoint = reporter
        .wait_until_running(&result.cluster, &result.service, port, &cancel)
        .await?;
    result = result.with_endpoint(endpoint);

    if let Some(endpoint) = &result.endpoint {
        println!("Service is up: {}", endpoint.url());
    }
    Ok(())
}

async fn status(config: &AppConfig, path: &Path) -> Result<()> {
    let descriptor = DeploymentDescriptor::from_path(path)?;
    let provider = provider_for(config).await?;
    let reporter = StatusReporter::new(provider, config.poll_settings());

    let state = reporter
        .snapshot(&descriptor.cluster_name(), &descriptor.name)
        .await?;

    if state.tasks.is_empty() {
        println!("No tasks observed for '{}'", descriptor.name);
        return Ok(());
    }

    println!(
        "{} task(s), {} running (desired {})",
        state.tasks.len(),
        state.running_count(),
        descriptor.desired_count
    );
    for task in &state.tasks {
        println!(
            "  {:<12} public={:<15} private={:<15} {}",
            task.status.to_string(),
            task.public_ip.as_deref().unwrap_or("-"),
            task.private_ip.as_deref().unwrap_or("-"),
            task.task_arn
        );
    }
    Ok(())
}

async fn probe(config: &AppConfig, path: &Path, message: &str, probe_path: &str) -> Result<()> {
    let descriptor = DeploymentDescriptor::from_path(path)?;
    let provider = provider_for(config).await?;
    let reporter = StatusReporter::new(provider, config.poll_settings());

    let state = reporter
        .snapshot(&descriptor.cluster_name(), &descriptor.name)
        .await?;

    let Some(task) = state.first_reachable() else {
        bail!("no running task with a public address; is the deployment up?");
    };
    let Some(ip) = task.public_ip.clone() else {
        bail!("task {} has no public address", task.task_arn);
    };

    let endpoint = fargate_deploy_rs::provider::Endpoint {
        ip,
        port: descriptor.container_port,
    };
    let outcome = probe_endpoint(&endpoint, probe_path, message, Duration::from_secs(10)).await?;

    println!("HTTP {} from {}", outcome.status, endpoint);
    if !outcome.body.is_empty() {
        println!("{}", outcome.body);
    }
    if !outcome.is_success() {
        bail!("endpoint answered with a non-success status");
    }
    Ok(())
}

async fn destroy(config: &AppConfig, path: &Path, yes: bool) -> Result<()> {
    let descriptor = DeploymentDescriptor::from_path(path)?;
    if !yes {
        bail!(
            "this deletes the service, cluster, log group and security group for '{}'; \
             re-run with --yes to proceed",
            descriptor.name
        );
    }

    let provider = provider_for(config).await?;
    let driver = ConvergenceDriver::new(provider);
    let plan = driver.destroy(&descriptor).await?;

    println!("Destroy finished: {}", plan);
    for change in &plan.changes {
        println!("  {:<16} {:<10} {}", change.kind.to_string(), change.action.to_string(), change.id);
    }
    Ok(())
}

#[cfg(feature = "docker-preflight")]
async fn run_preflight(image: &str) {
    let preflight = match ImagePreflight::new() {
        Ok(preflight) => preflight,
        Err(e) => {
            warn!("Docker unavailable ({}), skipping image preflight", e);
            return;
        }
    };

    if !preflight.ping().await {
        warn!("Docker daemon not reachable, skipping image preflight");
        return;
    }

    match preflight.verify_local(image).await {
        Ok(_) => {
            if let Err(e) = preflight.push(image).await {
                warn!("Image push failed ({}); assuming the registry already has it", e);
            }
        }
        Err(e) => {
            warn!("Image not present locally ({}); assuming the registry has it", e);
        }
    }
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping the poll loop");
            token.cancel();
        }
    });
    cancel
}

fn init_descriptor(path: &Path) -> Result<()> {
    if path.exists() {
        bail!("{} already exists, not overwriting", path.display());
    }

    let sample = r#"# fargate-deploy deployment descriptor
#
# Apply with: fargate-deploy apply deployment.toml

# Service name; cluster, log group and security group names derive from it
name = "chatbot"

# Exactly one container image, already pushed (or pushable) to a registry
image = "123456789012.dkr.ecr.us-east-1.amazonaws.com/chatbot:latest"

# Exactly one exposed port
container_port = 8080

# Fargate sizing: cpu units / memory MiB must be a supported pairing
cpu = 256
memory = 512

# How many task copies to keep running
desired_count = 1

# Role used to pull the image and write CloudWatch logs
# execution_role_arn = "arn:aws:iam::123456789012:role/ecsTaskExecutionRole"

log_retention_days = 7

[env]
# RUST_LOG = "info"

[network]
# Empty subnets means: place tasks in the default VPC
subnets = []
assign_public_ip = true

# Without explicit rules the container port is opened to 0.0.0.0/0
# [[network.ingress]]
# port = 8080
# cidr = "0.0.0.0/0"
"#;

    std::fs::write(path, sample)?;
    info!("📝 Wrote sample descriptor to {}", path.display());
    println!("Sample descriptor written to {}", path.display());
    Ok(())
}
