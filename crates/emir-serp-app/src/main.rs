use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use emir_serp::{LOG_TARGET, RegistryClient, RegistryConfig, telemetry};
use tracing::{error, info, warn};

const DEFAULT_CONFIG: &str = "/etc/emi/emir-serp/emir-serp.ini";

/// Announce local services to a service registry
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
	/// Path to the INI configuration file
	#[arg(short, long, default_value = DEFAULT_CONFIG)]
	config: PathBuf,

	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
	/// Register, then keep the entries fresh every period until stopped (default)
	Run,
	/// Register the entries once
	Register,
	/// Replace the registered entries once
	Update,
	/// Remove the entries from the registry
	Delete,
	/// Check that the registry answers
	Ping,
	/// Print the message that would be sent, without contacting the registry
	Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let args = Args::parse();
	let config = Arc::new(RegistryConfig::load(&args.config)?);
	if let Err(e) = telemetry::init(&config) {
		eprintln!("failed to initialise logging: {e}");
	}

	let client = RegistryClient::new(config.clone())?;
	match args.command.unwrap_or(Command::Run) {
		Command::Run => run(&client, &config).await,
		Command::Register => {
			let entries = client.register().await?;
			info!(target: LOG_TARGET, "Registered {} entries", entries.len());
		},
		Command::Update => {
			let entries = client.update().await?;
			info!(target: LOG_TARGET, "Updated {} entries", entries.len());
		},
		Command::Delete => {
			let summary = client.delete().await;
			info!(
				target: LOG_TARGET,
				"Deleted {} entries, {} failed, {} skipped",
				summary.deleted,
				summary.failed,
				summary.skipped
			);
		},
		Command::Ping => {
			let since = client.ping().await?;
			println!("Registry running since {since}");
		},
		Command::Show => {
			let entries = client.composer().compose().await;
			println!("{}", serde_json::to_string_pretty(&entries)?);
		},
	}
	Ok(())
}

/// Register once, update every period, deregister on shutdown
async fn run(client: &RegistryClient, config: &RegistryConfig) {
	info!(
		target: LOG_TARGET,
		"Announcing {} sources to {} every {:?}",
		config.sources.len(),
		client.base_url(),
		config.period
	);

	if let Err(e) = client.register().await {
		error!(target: LOG_TARGET, "Registration failed: {}", e);
	}

	let shutdown = shutdown_signal();
	tokio::pin!(shutdown);
	loop {
		tokio::select! {
			_ = &mut shutdown => break,
			_ = tokio::time::sleep(config.period) => {
				if let Err(e) = client.update().await {
					// Keep going; the next period sends the full set again
					error!(target: LOG_TARGET, "Update failed: {}", e);
				}
			},
		}
	}

	info!(target: LOG_TARGET, "Shutting down, removing entries from the registry");
	let summary = client.delete().await;
	if summary.failed > 0 {
		warn!(target: LOG_TARGET, "{} entries could not be removed", summary.failed);
	}
}

async fn shutdown_signal() {
	let ctrl_c = async {
		if let Err(e) = tokio::signal::ctrl_c().await {
			error!(target: LOG_TARGET, "Failed to listen for Ctrl-C: {}", e);
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
			Ok(mut sig) => {
				sig.recv().await;
			},
			Err(e) => {
				error!(target: LOG_TARGET, "Failed to listen for SIGTERM: {}", e);
				std::future::pending::<()>().await;
			},
		}
	};
	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}
}
