use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::{Level, error, info};
use url::Url;
use vanopticon_netbox_sync::entities::EntityKind;
use vanopticon_netbox_sync::{config, observability, run};

#[derive(Parser)]
#[command(name = "netbox-sync", about = "netbox-sync - one-way NetBox reconciliation", version)]
struct Cli {
	#[command(subcommand)]
	command: Option<Commands>,

	/// Extra config file layered over the standard locations
	#[arg(long, global = true)]
	config: Option<PathBuf>,
	/// Master NetBox URL
	#[arg(long)]
	master_url: Option<Url>,
	/// Master NetBox API token
	#[arg(long)]
	master_token: Option<String>,
	/// Slave NetBox URL
	#[arg(long)]
	slave_url: Option<Url>,
	/// Slave NetBox API token
	#[arg(long)]
	slave_token: Option<String>,
	/// Entity type to sync; repeat to sync several, in order
	#[arg(long = "entity", value_enum)]
	entities: Vec<EntityKind>,
	/// Tenant slug forced onto every synced record
	#[arg(long)]
	tenant: Option<String>,
	/// Plan and log changes without writing to the slave
	#[arg(long)]
	dry_run: bool,
	/// Log level (error, warn, info, debug, trace)
	#[arg(long, global = true, value_parser = parse_level)]
	log_level: Option<Level>,
	/// Print the run results as JSON on stdout
	#[arg(long)]
	json: bool,
}

#[derive(Subcommand)]
enum Commands {
	/// Synchronize the configured entity types (default)
	Sync,
	/// List the entity types that can be synchronized
	ListEntities,
}

fn parse_level(s: &str) -> Result<Level, String> {
	s.parse::<Level>().map_err(|_| format!("unknown log level '{}'", s))
}

impl Cli {
	fn apply(&self, settings: &mut config::Settings) {
		if let Some(url) = &self.master_url {
			settings.master.url = Some(url.clone());
		}
		if let Some(token) = &self.master_token {
			settings.master.token = Some(token.clone());
		}
		if let Some(url) = &self.slave_url {
			settings.slave.url = Some(url.clone());
		}
		if let Some(token) = &self.slave_token {
			settings.slave.token = Some(token.clone());
		}
		if !self.entities.is_empty() {
			settings.entities = self.entities.clone();
		}
		if let Some(tenant) = &self.tenant {
			settings.tenant = Some(tenant.clone());
		}
		if self.dry_run {
			settings.dry_run = true;
		}
		if let Some(level) = self.log_level {
			settings.log_level = level;
		}
	}
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
	let cli = Cli::parse();

	if let Some(Commands::ListEntities) = cli.command {
		for kind in EntityKind::ALL {
			let default = if EntityKind::default_selection().contains(&kind) {
				" (default)"
			} else {
				""
			};
			println!("{}{}", kind, default);
		}
		return ExitCode::SUCCESS;
	}

	let mut settings = match config::load_with_file(cli.config.as_deref()) {
		Ok(s) => s,
		Err(e) => {
			eprintln!("Failed to load config: {}", e);
			return ExitCode::FAILURE;
		}
	};
	cli.apply(&mut settings);

	if let Err(e) = observability::init_logging(settings.log_level.to_level_filter()) {
		eprintln!("{}", e);
		return ExitCode::FAILURE;
	}

	info!("Starting NetBox sync");
	let results = match run(&settings).await {
		Ok(results) => results,
		Err(e) => {
			error!("NetBox sync could not start: {:#}", e);
			return ExitCode::FAILURE;
		}
	};

	let failed = results.iter().filter(|r| !r.is_clean()).count();
	info!(
		"Sync completed: {} entity type(s), {} with errors",
		results.len(),
		failed
	);

	if cli.json {
		match serde_json::to_string_pretty(&results) {
			Ok(out) => println!("{}", out),
			Err(e) => {
				error!("Failed to render results: {}", e);
				return ExitCode::FAILURE;
			}
		}
	}

	ExitCode::SUCCESS
}
