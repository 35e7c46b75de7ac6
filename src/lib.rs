//! One-way reconciliation of NetBox collections from a master instance
//! onto a slave instance.

pub mod config;
pub mod entities;
pub mod observability;
pub mod store;
pub mod sync;

use log::info;

use crate::config::Settings;
use crate::store::{NetBoxClientBuilder, Store};
use crate::sync::{EntitySpec, Reconciler, RunResult};

/// Sync `specs` from `master` into `slave`, one entity type after another.
pub async fn reconcile(master: &dyn Store, slave: &dyn Store, specs: &[EntitySpec], dry_run: bool) -> Vec<RunResult> {
	Reconciler::new(master, slave).dry_run(dry_run).run_all(specs).await
}

/// Connect to both NetBox instances described by `settings` and sync the
/// configured entity types.
///
/// Fails only on configuration or client setup problems; record-level
/// failures are reported in the returned results.
pub async fn run(settings: &Settings) -> anyhow::Result<Vec<RunResult>> {
	let master = NetBoxClientBuilder::new(settings.master_client()?).build()?;
	let slave = NetBoxClientBuilder::new(settings.slave_client()?).build()?;
	let specs = entities::specs_for(&settings.entities, settings.tenant.as_deref())?;

	info!(
		"Syncing {} from {} to {}{}",
		settings
			.entities
			.iter()
			.map(|e| e.as_str())
			.collect::<Vec<_>>()
			.join(", "),
		master.config().url,
		slave.config().url,
		if settings.dry_run { " (dry run)" } else { "" }
	);

	Ok(reconcile(&master, &slave, &specs, settings.dry_run).await)
}
