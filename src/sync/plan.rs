use std::fmt;

use log::{debug, error, info};

use super::diff::diff;
use super::hooks::HookContext;
use super::identity::{SlaveIndex, build_key};
use super::result::{RunResult, Stage};
use super::spec::EntitySpec;
use super::{SyncError, require_field};
use crate::store::{Payload, Record};

/// Kind of change a plan item makes on the slave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
	Create,
	Update,
	Noop,
}

impl fmt::Display for Action {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			Action::Create => "create",
			Action::Update => "update",
			Action::Noop => "noop",
		};
		f.write_str(s)
	}
}

/// Decided action for one master record.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanItem {
	Create { master: Record, payload: Payload },
	Update {
		master: Record,
		slave: Record,
		changes: Payload,
	},
	Noop { master: Record, slave: Record },
}

impl PlanItem {
	pub fn master(&self) -> &Record {
		match self {
			PlanItem::Create { master, .. }
			| PlanItem::Update { master, .. }
			| PlanItem::Noop { master, .. } => master,
		}
	}

	pub fn action(&self) -> Action {
		match self {
			PlanItem::Create { .. } => Action::Create,
			PlanItem::Update { .. } => Action::Update,
			PlanItem::Noop { .. } => Action::Noop,
		}
	}

	/// Fields that would be written to the slave, if any.
	pub fn fields(&self) -> Option<&Payload> {
		match self {
			PlanItem::Create { payload, .. } => Some(payload),
			PlanItem::Update { changes, .. } => Some(changes),
			PlanItem::Noop { .. } => None,
		}
	}
}

/// Full create payload for `master`: every synced field in normalized form,
/// then the override values on top.
pub fn create_payload(master: &Record, spec: &EntitySpec) -> Result<Payload, SyncError> {
	let mut payload = Payload::new();
	for field in spec.synced_fields() {
		let normalized = spec.rules().normalize(field, require_field(master, field)?)?;
		payload.insert(field.clone(), normalized.to_json());
	}
	for (field, value) in spec.override_values() {
		payload.insert(field.clone(), value.clone());
	}
	debug!(
		"Created payload for {} with fields: {:?}",
		master.display(),
		payload.keys().collect::<Vec<_>>()
	);
	Ok(payload)
}

async fn plan_record(
	master: Record,
	index: &SlaveIndex,
	spec: &EntitySpec,
	ctx: &HookContext<'_>,
) -> Result<PlanItem, SyncError> {
	let key = build_key(&master, spec)?;

	let Some(slave) = index.get(&key) else {
		info!("Object does not exist in slave, creating: {}", master.display());
		let payload = create_payload(&master, spec)?;
		let payload = spec
			.hooks()
			.pre_sync(ctx, &master, payload)
			.await
			.map_err(SyncError::hook("pre-sync"))?;
		return Ok(PlanItem::Create { master, payload });
	};

	let changes = diff(&master, slave, spec)?.unwrap_or_default();
	let changes = spec
		.hooks()
		.pre_sync(ctx, &master, changes)
		.await
		.map_err(SyncError::hook("pre-sync"))?;

	let slave = slave.clone();
	if changes.is_empty() {
		Ok(PlanItem::Noop { master, slave })
	} else {
		Ok(PlanItem::Update {
			master,
			slave,
			changes,
		})
	}
}

/// Decide create/update/noop for every master record, in store order.
///
/// A record whose planning fails is recorded in `result` and skipped; the
/// rest of the collection is still planned.
pub async fn build_plan(
	masters: Vec<Record>,
	index: &SlaveIndex,
	spec: &EntitySpec,
	ctx: &HookContext<'_>,
	result: &mut RunResult,
) -> Vec<PlanItem> {
	let mut plan = Vec::with_capacity(masters.len());
	for master in masters {
		let identifier = master.display();
		match plan_record(master, index, spec, ctx).await {
			Ok(item) => {
				match item.fields() {
					Some(fields) => debug!(
						"Prepared {} action for {} with fields: {:?}",
						item.action(),
						identifier,
						fields.keys().collect::<Vec<_>>()
					),
					None => debug!("Prepared noop action for {}", identifier),
				}
				plan.push(item);
			}
			Err(e) => {
				error!(
					"Failed to prepare {} sync plan for object {}: {}",
					spec.name(),
					identifier,
					e
				);
				result.record_error(Stage::Plan, identifier, e);
			}
		}
	}
	plan
}
