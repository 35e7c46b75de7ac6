use std::sync::Arc;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use log::info;
use serde_json::{Value, json};

use super::netbox_rules;
use crate::store::{Collection, Payload, Record};
use crate::sync::{EntitySpec, HookContext, SpecError, SyncHooks};

pub fn module_bays() -> Result<EntitySpec, SpecError> {
	Ok(EntitySpec::new(
		"module-bays",
		"dcim.module-bays",
		&["name", "device", "position", "description"],
		&["name", "device"],
	)?
	.with_rules(netbox_rules())
	.with_hooks(Arc::new(ModuleBayHooks)))
}

/// Mirrors the module installed in each bay.
#[derive(Debug, Default)]
pub struct ModuleBayHooks;

/// Attributes that decide whether two installed modules are the same.
#[derive(Debug, PartialEq)]
struct ModuleFingerprint<'a> {
	model: Option<&'a Value>,
	manufacturer: Option<&'a Value>,
	serial: Option<&'a Value>,
	status: Option<&'a Value>,
}

impl<'a> ModuleFingerprint<'a> {
	fn of(module: &'a Record) -> Self {
		Self {
			model: module.pointer("/module_type/model"),
			manufacturer: module
				.pointer("/module_type/manufacturer/slug")
				.or_else(|| module.pointer("/module_type/manufacturer")),
			serial: module.get("serial"),
			status: module.pointer("/status/value").or_else(|| module.get("status")),
		}
	}
}

async fn installed_module(modules: &Collection<'_>, bay: &Record) -> anyhow::Result<Option<Record>> {
	match bay.pointer("/installed_module/id").and_then(Value::as_i64) {
		Some(id) => Ok(modules.get(id).await?),
		None => Ok(None),
	}
}

fn install_payload(master_module: &Record, slave_bay: &Record) -> anyhow::Result<Payload> {
	let device = slave_bay
		.pointer("/device/id")
		.cloned()
		.ok_or_else(|| anyhow!("module bay {} has no device id", slave_bay.display()))?;
	let fp = ModuleFingerprint::of(master_module);
	let mut payload = Payload::new();
	payload.insert("device".to_string(), device);
	payload.insert("module_bay".to_string(), Value::from(slave_bay.require_id()?));
	payload.insert(
		"module_type".to_string(),
		json!({
			"manufacturer": {"slug": fp.manufacturer},
			"model": fp.model,
		}),
	);
	payload.insert("serial".to_string(), fp.serial.cloned().unwrap_or(Value::Null));
	payload.insert("status".to_string(), fp.status.cloned().unwrap_or(Value::Null));
	Ok(payload)
}

#[async_trait]
impl SyncHooks for ModuleBayHooks {
	async fn post_sync(&self, ctx: &HookContext<'_>, master: &Record, synced: Record) -> anyhow::Result<Record> {
		let master_modules = Collection::resolve(ctx.master, "dcim.modules")?;
		let slave_modules = Collection::resolve(ctx.slave, "dcim.modules")?;

		let wanted = installed_module(&master_modules, master)
			.await
			.with_context(|| format!("reading module of master bay {}", master.display()))?;
		let mut current = installed_module(&slave_modules, &synced)
			.await
			.with_context(|| format!("reading module of slave bay {}", synced.display()))?;

		if let Some(module) = &current {
			let stale = match &wanted {
				None => true,
				Some(w) => ModuleFingerprint::of(w) != ModuleFingerprint::of(module),
			};
			if stale {
				slave_modules.delete(module.require_id()?).await?;
				info!("Removed module {} from {}", module.display(), synced.display());
				current = None;
			}
		}

		if let (Some(module), None) = (&wanted, &current) {
			let created = slave_modules.create(&install_payload(module, &synced)?).await?;
			info!("Installed module {} in {}", created.display(), synced.display());
		}
		Ok(synced)
	}
}

#[cfg(test)]
#[cfg(feature = "unit-tests")]
mod tests {
	use super::*;

	#[test]
	fn test_fingerprint_accepts_nested_and_flat_forms() {
		let nested = Record::from_value(json!({
			"module_type": {"model": "LC-1", "manufacturer": {"id": 3, "slug": "acme"}},
			"serial": "S1",
			"status": {"value": "active", "label": "Active"}
		}));
		let flat = Record::from_value(json!({
			"module_type": {"model": "LC-1", "manufacturer": {"slug": "acme"}},
			"serial": "S1",
			"status": "active"
		}));
		assert_eq!(ModuleFingerprint::of(&nested), ModuleFingerprint::of(&flat));
	}

	#[test]
	fn test_install_payload() {
		let module = Record::from_value(json!({
			"id": 9,
			"module_type": {"model": "LC-1", "manufacturer": {"slug": "acme"}},
			"serial": "S1",
			"status": {"value": "active"}
		}));
		let bay = Record::from_value(json!({"id": 4, "name": "slot1", "device": {"id": 2, "name": "rtr-1"}}));
		let payload = install_payload(&module, &bay).unwrap();
		assert_eq!(
			Value::Object(payload),
			json!({
				"device": 2,
				"module_bay": 4,
				"module_type": {"manufacturer": {"slug": "acme"}, "model": "LC-1"},
				"serial": "S1",
				"status": "active"
			})
		);
	}
}
