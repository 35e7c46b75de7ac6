use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use log::info;

use super::netbox_rules;
use crate::store::{Collection, Record};
use crate::sync::{EntitySpec, HookContext, SpecError, SyncHooks};

pub fn racks() -> Result<EntitySpec, SpecError> {
	Ok(EntitySpec::new(
		"racks",
		"dcim.racks",
		&["name", "site", "location", "role", "rack_type", "status"],
		&["name"],
	)?
	.with_rules(netbox_rules()))
}

pub fn devices() -> Result<EntitySpec, SpecError> {
	Ok(EntitySpec::new(
		"devices",
		"dcim.devices",
		&[
			"name",
			"site",
			"role",
			"device_type",
			"status",
			"serial",
			"rack",
			"location",
			"position",
			"face",
			"platform",
		],
		&["name"],
	)?
	.with_rules(netbox_rules())
	.with_hooks(Arc::new(DeviceHooks)))
}

pub fn device_bays() -> Result<EntitySpec, SpecError> {
	Ok(EntitySpec::new(
		"device-bays",
		"dcim.device-bays",
		&["name", "device", "description"],
		&["name", "device"],
	)?
	.with_rules(netbox_rules()))
}

/// Components NetBox creates from the device type template when a device
/// is created. The slave gets them from the master instead.
const TEMPLATED_COMPONENTS: [&str; 2] = ["dcim.interfaces", "dcim.power-ports"];

/// Strips template-provisioned components from newly created devices.
#[derive(Debug, Default)]
pub struct DeviceHooks;

#[async_trait]
impl SyncHooks for DeviceHooks {
	async fn post_create(&self, ctx: &HookContext<'_>, _master: &Record, created: Record) -> anyhow::Result<Record> {
		let device_id = created.require_id()?;
		for path in TEMPLATED_COMPONENTS {
			let components = Collection::resolve(ctx.slave, path)?;
			let found = components
				.filter(&[("device_id", device_id.to_string())])
				.await
				.with_context(|| format!("listing {} of device {}", path, created.display()))?;
			for component in found {
				components.delete(component.require_id()?).await?;
			}
			info!("Removed templated {} from {}", path, created.display());
		}
		Ok(created)
	}
}
