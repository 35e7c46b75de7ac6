use log::{debug, error, info};

use super::SyncError;
use super::hooks::HookContext;
use super::plan::PlanItem;
use super::result::{RunResult, Stage};
use super::spec::EntitySpec;
use crate::store::{Collection, Record};

/// Apply one plan item to the slave collection and return the slave record
/// that now represents the master.
///
/// Creates run the `post_create` hook on the new record. Updates send only
/// the changed fields. Noops make no store call.
pub async fn apply(
	item: PlanItem,
	slave: &Collection<'_>,
	spec: &EntitySpec,
	ctx: &HookContext<'_>,
) -> Result<Record, SyncError> {
	match item {
		PlanItem::Create { master, payload } => {
			let created = slave.create(&payload).await?;
			info!("Created {} in {}", created.display(), slave.path());
			spec.hooks()
				.post_create(ctx, &master, created)
				.await
				.map_err(SyncError::hook("post-create"))
		}
		PlanItem::Update { slave: current, changes, .. } => {
			let id = current.require_id()?;
			let updated = slave.update(id, &changes).await?;
			info!(
				"Updated {} in {}: {:?}",
				updated.display(),
				slave.path(),
				changes.keys().collect::<Vec<_>>()
			);
			Ok(updated)
		}
		PlanItem::Noop { slave: current, .. } => {
			debug!("No changes for {}", current.display());
			Ok(current)
		}
	}
}

async fn apply_and_finish(
	item: PlanItem,
	slave: &Collection<'_>,
	spec: &EntitySpec,
	ctx: &HookContext<'_>,
) -> Result<Record, SyncError> {
	let master = item.master().clone();
	let synced = apply(item, slave, spec, ctx).await?;
	spec.hooks()
		.post_sync(ctx, &master, synced)
		.await
		.map_err(SyncError::hook("post-sync"))
}

/// Apply every plan item in order, then run `post_sync` on the result.
///
/// Each item succeeds or fails on its own; failures are recorded in
/// `result` and the remaining items still run.
pub async fn execute_plan(
	plan: Vec<PlanItem>,
	slave: &Collection<'_>,
	spec: &EntitySpec,
	ctx: &HookContext<'_>,
	result: &mut RunResult,
) {
	for item in plan {
		let identifier = item.master().display();
		let action = item.action();
		match apply_and_finish(item, slave, spec, ctx).await {
			Ok(_) => result.stats_mut().count(action),
			Err(e) => {
				error!("Failed to sync {} {}: {}", spec.name(), identifier, e);
				result.record_error(Stage::Apply, identifier, e);
			}
		}
	}
}

#[cfg(test)]
#[cfg(feature = "unit-tests")]
mod tests {
	use std::sync::Arc;
	use std::sync::atomic::{AtomicUsize, Ordering};

	use async_trait::async_trait;
	use serde_json::json;

	use super::*;
	use crate::store::{MemoryStore, Payload, WriteOp};
	use crate::sync::SyncHooks;

	#[derive(Default)]
	struct Counting {
		created: AtomicUsize,
		synced: AtomicUsize,
	}

	#[async_trait]
	impl SyncHooks for Counting {
		async fn post_sync(&self, _ctx: &HookContext<'_>, _master: &Record, synced: Record) -> anyhow::Result<Record> {
			self.synced.fetch_add(1, Ordering::SeqCst);
			Ok(synced)
		}

		async fn post_create(&self, _ctx: &HookContext<'_>, _master: &Record, created: Record) -> anyhow::Result<Record> {
			self.created.fetch_add(1, Ordering::SeqCst);
			Ok(created)
		}
	}

	fn payload(v: serde_json::Value) -> Payload {
		match v {
			serde_json::Value::Object(map) => map,
			_ => Payload::new(),
		}
	}

	#[tokio::test]
	async fn test_execute_counts_and_runs_hooks() {
		let master_store = MemoryStore::new("master");
		let slave_store = MemoryStore::new("slave");
		let existing = slave_store
			.insert("dcim.racks", vec![json!({"name": "r1", "status": "planned"})])
			.unwrap();

		let hooks = Arc::new(Counting::default());
		let spec = EntitySpec::new("racks", "dcim.racks", &["name", "status"], &["name"])
			.unwrap()
			.with_hooks(hooks.clone());
		let ctx = HookContext {
			master: &master_store,
			slave: &slave_store,
		};
		let collection = Collection::resolve(&slave_store, "dcim.racks").unwrap();

		let plan = vec![
			PlanItem::Create {
				master: Record::from_value(json!({"name": "r2"})),
				payload: payload(json!({"name": "r2", "status": "active"})),
			},
			PlanItem::Update {
				master: Record::from_value(json!({"name": "r1"})),
				slave: existing[0].clone(),
				changes: payload(json!({"status": "active"})),
			},
			PlanItem::Noop {
				master: Record::from_value(json!({"name": "r3"})),
				slave: Record::from_value(json!({"id": 50, "name": "r3"})),
			},
		];

		let mut result = RunResult::new("racks", false);
		execute_plan(plan, &collection, &spec, &ctx, &mut result).await;

		assert!(result.is_clean());
		let stats = result.stats();
		assert_eq!((stats.created, stats.updated, stats.unchanged), (1, 1, 1));
		assert_eq!(hooks.created.load(Ordering::SeqCst), 1);
		assert_eq!(hooks.synced.load(Ordering::SeqCst), 3);

		let journal = slave_store.journal();
		assert_eq!(journal.len(), 2);
		assert!(matches!(&journal[1], WriteOp::Update { changes, .. } if changes.len() == 1));
	}

	#[tokio::test]
	async fn test_rejected_write_is_isolated() {
		let master_store = MemoryStore::new("master");
		let slave_store = MemoryStore::new("slave");
		slave_store
			.reject_writes_with("dcim.racks", "name", json!("bad"), "name is invalid")
			.unwrap();
		let spec = EntitySpec::new("racks", "dcim.racks", &["name"], &["name"]).unwrap();
		let ctx = HookContext {
			master: &master_store,
			slave: &slave_store,
		};
		let collection = Collection::resolve(&slave_store, "dcim.racks").unwrap();

		let plan = vec![
			PlanItem::Create {
				master: Record::from_value(json!({"name": "bad"})),
				payload: payload(json!({"name": "bad"})),
			},
			PlanItem::Create {
				master: Record::from_value(json!({"name": "good"})),
				payload: payload(json!({"name": "good"})),
			},
		];
		let mut result = RunResult::new("racks", false);
		execute_plan(plan, &collection, &spec, &ctx, &mut result).await;

		assert_eq!(result.errors().len(), 1);
		assert_eq!(result.errors()[0].identifier, "bad");
		assert_eq!(result.errors()[0].stage, Stage::Apply);
		assert!(result.errors()[0].message.contains("name is invalid"));
		assert_eq!(result.stats().created, 1);
		assert_eq!(slave_store.records("dcim.racks").len(), 1);
	}
}
