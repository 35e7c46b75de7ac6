use log::{error, info};

use super::execute::execute_plan;
use super::hooks::HookContext;
use super::identity::build_index;
use super::plan::{PlanItem, build_plan};
use super::result::{RunResult, Stage};
use super::spec::EntitySpec;
use crate::store::{Collection, Store};

/// Runs entity specs from a master store into a slave store.
///
/// Runs are sequential: one entity type at a time and one record at a time,
/// in master order.
pub struct Reconciler<'a> {
	master: &'a dyn Store,
	slave: &'a dyn Store,
	dry_run: bool,
}

impl<'a> Reconciler<'a> {
	pub fn new(master: &'a dyn Store, slave: &'a dyn Store) -> Self {
		Self {
			master,
			slave,
			dry_run: false,
		}
	}

	/// Plan only: no slave writes and no post-apply hooks.
	pub fn dry_run(mut self, dry_run: bool) -> Self {
		self.dry_run = dry_run;
		self
	}

	fn context(&self) -> HookContext<'a> {
		HookContext {
			master: self.master,
			slave: self.slave,
		}
	}

	/// Reconcile one entity type. Never fails as a whole; every problem
	/// ends up in the returned [`RunResult`].
	pub async fn run(&self, spec: &EntitySpec) -> RunResult {
		let mut result = RunResult::new(spec.name(), self.dry_run);
		info!("Starting synchronization of {}", spec.name());

		let master = Collection::new(self.master, spec.collection().clone());
		let slave = Collection::new(self.slave, spec.collection().clone());

		let master_records = match master.all().await {
			Ok(records) => records,
			Err(e) => {
				error!("Failed to list {} from {}: {}", spec.collection(), master.store_name(), e);
				result.record_error(Stage::Fetch, format!("{} {}", master.store_name(), spec.collection()), e);
				result.log_summary();
				return result;
			}
		};
		let slave_records = match slave.all().await {
			Ok(records) => records,
			Err(e) => {
				error!("Failed to list {} from {}: {}", spec.collection(), slave.store_name(), e);
				result.record_error(Stage::Fetch, format!("{} {}", slave.store_name(), spec.collection()), e);
				result.log_summary();
				return result;
			}
		};
		info!(
			"Fetched {} master and {} slave record(s) for {}",
			master_records.len(),
			slave_records.len(),
			spec.name()
		);

		let index = build_index(slave_records, spec, &mut result);
		let ctx = self.context();
		let plan = build_plan(master_records, &index, spec, &ctx, &mut result).await;

		if self.dry_run {
			report_plan(&plan, &mut result);
		} else {
			execute_plan(plan, &slave, spec, &ctx, &mut result).await;
		}

		result.log_summary();
		result
	}

	/// Reconcile several entity types in the given order.
	pub async fn run_all(&self, specs: &[EntitySpec]) -> Vec<RunResult> {
		let mut results = Vec::with_capacity(specs.len());
		for spec in specs {
			results.push(self.run(spec).await);
		}
		results
	}
}

fn report_plan(plan: &[PlanItem], result: &mut RunResult) {
	for item in plan {
		result.stats_mut().count(item.action());
		match item {
			PlanItem::Create { payload, .. } => {
				info!("[dry run] would create {}: {}", item.master().display(), serde_json::Value::Object(payload.clone()));
			}
			PlanItem::Update { slave, changes, .. } => {
				info!(
					"[dry run] would update {} (id {}): {}",
					item.master().display(),
					slave.id().map(|id| id.to_string()).unwrap_or_else(|| "?".to_string()),
					serde_json::Value::Object(changes.clone())
				);
			}
			PlanItem::Noop { .. } => {}
		}
	}
}

#[cfg(test)]
#[cfg(feature = "unit-tests")]
mod tests {
	use serde_json::json;

	use super::*;
	use crate::store::MemoryStore;
	use crate::sync::LookupRules;

	fn devices() -> EntitySpec {
		EntitySpec::new("devices", "dcim.devices", &["name", "status"], &["name"])
			.unwrap()
			.with_rules(LookupRules::new().scalar("status", "value"))
	}

	#[tokio::test]
	async fn test_dry_run_never_writes() {
		let master = MemoryStore::new("master");
		let slave = MemoryStore::new("slave");
		master
			.insert(
				"dcim.devices",
				vec![
					json!({"name": "rtr-1", "status": {"value": "active"}}),
					json!({"name": "rtr-2", "status": {"value": "active"}}),
				],
			)
			.unwrap();
		slave
			.insert("dcim.devices", vec![json!({"name": "rtr-1", "status": {"value": "planned"}})])
			.unwrap();

		let result = Reconciler::new(&master, &slave).dry_run(true).run(&devices()).await;

		assert!(result.is_clean());
		assert!(result.dry_run);
		assert_eq!(result.stats().created, 1);
		assert_eq!(result.stats().updated, 1);
		assert!(slave.journal().is_empty());
	}

	#[tokio::test]
	async fn test_second_run_is_a_noop() {
		let master = MemoryStore::new("master");
		let slave = MemoryStore::new("slave");
		master
			.insert("dcim.devices", vec![json!({"name": "rtr-1", "status": {"value": "active"}})])
			.unwrap();

		let reconciler = Reconciler::new(&master, &slave);
		let first = reconciler.run(&devices()).await;
		assert_eq!(first.stats().created, 1);

		slave.clear_journal();
		let second = reconciler.run(&devices()).await;
		assert!(second.is_clean());
		assert_eq!(second.stats().unchanged, 1);
		assert!(slave.journal().is_empty());
	}
}
