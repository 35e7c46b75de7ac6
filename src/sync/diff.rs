use log::{debug, info};

use super::spec::EntitySpec;
use super::{SyncError, require_field};
use crate::store::{Payload, Record};

/// Fields of `slave` that must change for it to match `master`.
///
/// Synced fields are compared in normalized form and carry the master's
/// normalized value. Override fields are compared against the configured
/// value and always carry it, also when the field is synced. Returns
/// `Ok(None)` when nothing differs.
pub fn diff(master: &Record, slave: &Record, spec: &EntitySpec) -> Result<Option<Payload>, SyncError> {
	let rules = spec.rules();
	let overrides = spec.override_values();
	let mut changes = Payload::new();

	for field in spec.synced_fields() {
		if overrides.contains_key(field) {
			continue;
		}
		let master_val = rules.normalize(field, require_field(master, field)?)?;
		let slave_val = rules.normalize(field, require_field(slave, field)?)?;
		if master_val != slave_val {
			let master_json = master_val.to_json();
			info!(
				"Difference found in {}: Master({}) != Slave({})",
				field,
				master_json,
				slave_val.to_json()
			);
			changes.insert(field.clone(), master_json);
		}
	}

	for (field, forced) in overrides {
		let slave_json = match slave.get(field) {
			Some(raw) => rules.normalize(field, raw)?.to_json(),
			// Only synced fields are expected on every record.
			None if spec.synced_fields().contains(field) => {
				return Err(SyncError::MissingField {
					record: slave.display(),
					field: field.clone(),
				});
			}
			None => continue,
		};
		if &slave_json != forced {
			info!(
				"Override difference found in {}: Expected({}) != Slave({})",
				field, forced, slave_json
			);
			changes.insert(field.clone(), forced.clone());
		}
	}

	if changes.is_empty() {
		return Ok(None);
	}
	debug!(
		"Calculated diff for {} with changed fields: {:?}",
		master.display(),
		changes.keys().collect::<Vec<_>>()
	);
	Ok(Some(changes))
}
