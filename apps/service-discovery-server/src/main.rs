mod config;
mod logging;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use service_discovery::api::rest::router;
use service_discovery::{
    DiscoveryService, DomainError, HealthUpdatesExtractor, HttpBroadcastGateway,
    HttpHealthExtractor, NodeUpdatesGateway, SeaOrmNodesRepository, ServiceDiscoveryLocalClient,
};
use service_discovery_sdk::ServiceDiscoveryClient;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;

/// Service discovery registry daemon
#[derive(Parser)]
#[command(name = "service-discovery-server")]
#[command(about = "Service discovery registry with push-based health updates")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address override, e.g. 127.0.0.1:6500
    #[arg(short, long)]
    bind: Option<String>,

    /// Print effective configuration (JSON) and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Run,
    /// Validate configuration and exit
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(ref path) = cli.config
        && !Path::new(path).is_file()
    {
        anyhow::bail!("config file does not exist: {}", path.display());
    }

    // 1) defaults -> 2) YAML -> 3) env (APP__*, SERVICE_DISCOVERY_API_KEY) -> 4) CLI
    let mut config = AppConfig::load(cli.config.as_deref())?;
    config.apply_cli_overrides(cli.bind.as_deref());

    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&config.redacted())?);
        return Ok(());
    }

    logging::init(&config.logging, cli.verbose);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_server(config).await,
        Commands::Check => check_config(&config),
    }
}

fn check_config(config: &AppConfig) -> Result<()> {
    tracing::info!("Checking configuration...");
    config.discovery.validate()?;
    println!("Configuration is valid");
    println!("{}", serde_json::to_string_pretty(&config.redacted())?);
    Ok(())
}

async fn run_server(config: AppConfig) -> Result<()> {
    let discovery = &config.discovery;
    discovery.validate()?;

    let repo = Arc::new(
        SeaOrmNodesRepository::connect(
            &config.database.dsn,
            config.database.max_connections,
            discovery.eviction_grace,
        )
        .await?,
    );
    repo.restore_evictions().await?;

    let extractor = Arc::new(HttpHealthExtractor::new(repo.clone(), discovery)?);
    let gateway = Arc::new(HttpBroadcastGateway::new(discovery)?);
    let service = Arc::new(DiscoveryService::new(
        repo.clone(),
        extractor.clone(),
        gateway.clone(),
    ));
    let client: Arc<dyn ServiceDiscoveryClient> =
        Arc::new(ServiceDiscoveryLocalClient::new(service.clone()));
    let app = router(client, &discovery.api_key);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind_addr))?;

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    let mut tasks = JoinSet::new();
    supervise(&mut tasks, &cancel, "updates_gateway", {
        let cancel = cancel.clone();
        async move { gateway.start(cancel).await }
    });
    supervise(&mut tasks, &cancel, "health_extractor", {
        let cancel = cancel.clone();
        async move { extractor.start(cancel).await }
    });
    supervise(&mut tasks, &cancel, "discovery_loop", {
        let cancel = cancel.clone();
        async move { service.start(cancel).await }
    });
    supervise(&mut tasks, &cancel, "node_evictions", {
        let cancel = cancel.clone();
        async move { repo.run_evictions(cancel).await }
    });
    {
        let cancel = cancel.clone();
        let shutdown = cancel.clone().cancelled_owned();
        tasks.spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await;
            if let Err(e) = served {
                tracing::error!(component = "http_api", error = %e, "component failed");
                cancel.cancel();
                return Err(anyhow::Error::from(e).context("http_api"));
            }
            Ok(())
        });
    }

    tracing::info!(bind_addr = %config.server.bind_addr, "Service started");

    let mut first_error = None;
    while let Some(joined) = tasks.join_next().await {
        let result = joined.map_err(anyhow::Error::from).and_then(|r| r);
        if let Err(e) = result {
            cancel.cancel();
            first_error.get_or_insert(e);
        }
    }

    tracing::info!("Service stopped");
    first_error.map_or(Ok(()), Err)
}

/// Spawns a component; shutdown is a clean exit, any other error stops the
/// whole process.
fn supervise<F>(
    tasks: &mut JoinSet<Result<()>>,
    cancel: &CancellationToken,
    name: &'static str,
    component: F,
) where
    F: Future<Output = Result<(), DomainError>> + Send + 'static,
{
    let cancel = cancel.clone();
    tasks.spawn(async move {
        match component.await {
            Ok(()) => Ok(()),
            Err(e) if e.is_cancelled() => {
                tracing::debug!(component = name, "component stopped");
                Ok(())
            }
            Err(e) => {
                tracing::error!(component = name, error = %e, "component failed");
                cancel.cancel();
                Err(anyhow::Error::from(e).context(name))
            }
        }
    });
}

/// Cancels `cancel` on Ctrl+C or SIGTERM. Returns early when the registry is
/// already stopping for another reason.
async fn cancel_on_signal(cancel: CancellationToken) {
    let signal = tokio::select! {
        () = cancel.cancelled() => return,
        result = tokio::signal::ctrl_c() => result.map(|()| "ctrl-c"),
        result = terminate() => result.map(|()| "SIGTERM"),
    };

    match signal {
        Ok(name) => tracing::info!(signal = name, "stopping service discovery registry"),
        Err(e) => tracing::error!(error = %e, "signal handler failed, stopping registry"),
    }
    cancel.cancel();
}

#[cfg(unix)]
async fn terminate() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    signal(SignalKind::terminate())?.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn terminate() -> std::io::Result<()> {
    std::future::pending().await
}
