use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dispatch_config::{load_config, Config, ConfigLoader};
use dispatch_core::DispatchBuilder;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;

#[derive(Parser)]
#[command(name = "dispatch-service")]
#[command(about = "Home service booking dispatch engine", long_about = None)]
struct Cli {
	#[command(subcommand)]
	command: Option<Commands>,

	#[arg(short, long, value_name = "FILE", env = "DISPATCH_CONFIG_FILE")]
	config: Option<PathBuf>,

	#[arg(long, env = "DISPATCH_LOG_LEVEL", default_value = "info")]
	log_level: String,
}

#[derive(Subcommand)]
enum Commands {
	/// Start the dispatch service
	Start,
	/// Validate the configuration file
	Validate,
	/// Write an example configuration file
	GenerateConfig {
		#[arg(short, long, value_name = "FILE", default_value = "dispatch.toml")]
		output: PathBuf,
	},
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
		Some(Commands::GenerateConfig { output }) => generate_config(&output),
	}
}

async fn start_service(cli: Cli) -> Result<()> {
	info!("Starting dispatch service");

	let config = load_configuration(&cli)?;

	info!("Configuration loaded successfully");
	info!("Service name: {}", config.service.name);
	info!("HTTP port: {}", config.service.http_port);
	info!("Storage backend: {}", config.storage.backend);

	// Build the engine
	let engine = Arc::new(
		DispatchBuilder::new(config.clone())
			.build()
			.context("Failed to build dispatch engine")?,
	);

	// Seed the directory before taking traffic
	engine
		.seed_providers()
		.await
		.context("Failed to seed providers")?;

	// Start the engine event loop
	let runner = engine.clone();
	let engine_handle = tokio::spawn(async move { runner.run().await });

	// Start HTTP server
	let http_engine = engine.clone();
	let host = config.service.host.clone();
	let port = config.service.http_port;
	let http_handle =
		tokio::spawn(async move { api::start_http_server(http_engine, &host, port).await });

	// Setup graceful shutdown
	let shutdown_signal = setup_shutdown_signal();

	info!("Dispatch service started successfully");

	// Wait for shutdown signal
	shutdown_signal.await;

	info!("Shutdown signal received, stopping services...");

	// Stop the engine loop, then the HTTP server
	engine.shutdown();
	let _ = engine_handle.await;
	http_handle.abort();

	info!("Dispatch service stopped");
	Ok(())
}

async fn validate_config(cli: Cli) -> Result<()> {
	let config = load_configuration(&cli)?;

	info!("Configuration is valid");
	info!("Service name: {}", config.service.name);
	info!("HTTP port: {}", config.service.http_port);
	info!("Storage backend: {}", config.storage.backend);
	info!(
		"Assignment: {} attempts, {}ms base delay",
		config.assignment.max_attempts, config.assignment.base_delay_ms
	);
	info!("Seed providers: {}", config.seed_providers.len());
	for seed in &config.seed_providers {
		info!("  {} ({})", seed.name, seed.capabilities.join(", "));
	}

	Ok(())
}

fn generate_config(output: &Path) -> Result<()> {
	let config = dispatch_config::example_config();
	let contents =
		toml::to_string_pretty(&config).context("Failed to serialize example configuration")?;
	std::fs::write(output, contents)
		.with_context(|| format!("Failed to write {}", output.display()))?;

	info!("Wrote example configuration to {}", output.display());
	Ok(())
}

fn load_configuration(cli: &Cli) -> Result<Config> {
	match &cli.config {
		Some(path) => {
			info!("Loading configuration from: {:?}", path);
			ConfigLoader::from_env_and_file(Some(path)).context("Failed to load configuration")
		}
		None => load_config().context("Failed to load configuration"),
	}
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

async fn setup_shutdown_signal() {
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
