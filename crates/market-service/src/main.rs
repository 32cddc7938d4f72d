use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use market_config::ConfigLoader;
use market_core::MarketplaceBuilder;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;

#[derive(Parser)]
#[command(name = "market-service")]
#[command(about = "Service marketplace backend", long_about = None)]
struct Cli {
	#[command(subcommand)]
	command: Option<Commands>,

	#[arg(short, long, value_name = "FILE", default_value = "config/local.toml")]
	config: PathBuf,

	#[arg(long, env = "MARKET_LOG_LEVEL", default_value = "info")]
	log_level: String,
}

#[derive(Subcommand)]
enum Commands {
	/// Start the marketplace service
	Start,
	/// Validate the configuration file
	Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
	let cli = Cli::parse();

	// Initialize tracing
	setup_tracing(&cli.log_level)?;

	// Handle commands
	match cli.command {
		Some(Commands::Start) | None => start_service(cli).await,
		Some(Commands::Validate) => validate_config(cli).await,
	}
}

/// Registers the backends this binary ships with. The config file picks
/// which of them actually runs.
fn register_backends(builder: MarketplaceBuilder) -> MarketplaceBuilder {
	builder
		.with_storage_factory(
			"memory",
			market_storage::implementations::memory::create_storage,
		)
		.with_notifier_factory(
			"log",
			market_notify::implementations::log::create_log_notifier,
		)
		.with_notifier_factory(
			"webhook",
			market_notify::implementations::webhook::create_webhook_notifier,
		)
}

async fn start_service(cli: Cli) -> Result<()> {
	info!("Starting marketplace service");
	info!("Loading configuration from: {:?}", cli.config);

	// Load configuration
	let config = ConfigLoader::new()
		.with_file(&cli.config)
		.load()
		.await
		.context("Failed to load configuration")?;

	info!("Configuration loaded successfully");
	info!("Service name: {}", config.service.name);
	info!("HTTP port: {}", config.service.http_port);

	let http_port = config.service.http_port;

	// Assemble the core services
	let marketplace = register_backends(MarketplaceBuilder::new(config))
		.build()
		.context("Failed to build marketplace")?;
	let marketplace = Arc::new(marketplace);

	info!("Marketplace service started successfully");

	// Serve until a shutdown signal arrives
	api::start_http_server(marketplace, http_port, shutdown_signal()).await?;

	info!("Marketplace service stopped");
	Ok(())
}

async fn validate_config(cli: Cli) -> Result<()> {
	info!("Validating configuration file: {:?}", cli.config);

	// Try to load the configuration
	let config = ConfigLoader::new()
		.with_file(&cli.config)
		.load()
		.await
		.context("Failed to load configuration")?;

	info!("Configuration is valid");
	info!("Service name: {}", config.service.name);
	info!("Storage backend: {}", config.storage.backend);
	info!("Notifier backend: {}", config.notifier.backend);
	info!("Feed batch size: {}", config.feed.batch_size);

	Ok(())
}

fn setup_tracing(log_level: &str) -> Result<()> {
	let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

	tracing_subscriber::registry()
		.with(env_filter)
		.with(tracing_subscriber::fmt::layer())
		.init();

	Ok(())
}

async fn shutdown_signal() {
	let ctrl_c = async {
		signal::ctrl_c()
			.await
			.expect("failed to install Ctrl+C handler");
	};

	#[cfg(unix)]
	let terminate = async {
		signal::unix::signal(signal::unix::SignalKind::terminate())
			.expect("failed to install signal handler")
			.recv()
			.await;
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}
}
