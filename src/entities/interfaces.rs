//! Physical interfaces, plus the VLAN and IP assignments that hang off them.
//!
//! Tagged VLANs and IP addresses are synced after the interface itself so
//! the slave interface id is known.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use log::{debug, info, warn};
use serde_json::{Value, json};

use super::netbox_rules;
use crate::store::{Collection, Payload, Record};
use crate::sync::{EntitySpec, HookContext, SpecError, SyncHooks};

const INTERFACE_TYPE: &str = "dcim.interface";
const ANYCAST_ROLE: &str = "anycast";

pub fn interfaces(overrides: &Payload) -> Result<EntitySpec, SpecError> {
	Ok(EntitySpec::new(
		"interfaces",
		"dcim.interfaces",
		&[
			"name",
			"device",
			"type",
			"description",
			"parent",
			"mgmt_only",
			"enabled",
			"mtu",
			"mode",
			"untagged_vlan",
		],
		&["name", "device"],
	)?
	.with_rules(netbox_rules().scalar("type", "value"))
	.with_hooks(Arc::new(InterfaceHooks::new(overrides.clone()))))
}

/// Syncs tagged VLANs and assigned IP addresses of each interface.
///
/// `overrides` are added to IP addresses this hook creates.
#[derive(Debug, Default)]
pub struct InterfaceHooks {
	overrides: Payload,
}

impl InterfaceHooks {
	pub fn new(overrides: Payload) -> Self {
		Self { overrides }
	}

	async fn sync_tagged_vlans(
		&self,
		ctx: &HookContext<'_>,
		interface: Record,
		vlans: &[Value],
	) -> anyhow::Result<Record> {
		let slave_vlans = Collection::resolve(ctx.slave, "ipam.vlans")?;
		let mut ids: Vec<Value> = Vec::with_capacity(vlans.len());
		for vlan in vlans {
			let Some(vid) = vlan.get("vid").filter(|v| !v.is_null()) else {
				continue;
			};
			let vid = match vid {
				Value::String(s) => s.clone(),
				other => other.to_string(),
			};
			let found = slave_vlans.filter(&[("vid", vid.clone())]).await?;
			match found.first().and_then(Record::id) {
				Some(id) => ids.push(Value::from(id)),
				None => warn!("VLAN {} not found in slave, skipping for {}", vid, interface.display()),
			}
		}

		if same_vlan_ids(&interface, &ids) {
			debug!("Tagged VLANs of {} already match", interface.display());
			return Ok(interface);
		}

		let mut changes = Payload::new();
		changes.insert("tagged_vlans".to_string(), Value::Array(ids));
		let interfaces = Collection::resolve(ctx.slave, "dcim.interfaces")?;
		let updated = interfaces
			.update(interface.require_id()?, &changes)
			.await
			.with_context(|| format!("updating tagged VLANs of {}", interface.display()))?;
		Ok(updated)
	}

	fn new_ip_payload(&self, master_ip: &Record, interface_id: i64) -> Payload {
		let mut payload = Payload::new();
		payload.insert("address".to_string(), master_ip.get("address").cloned().unwrap_or(Value::Null));
		payload.insert("status".to_string(), json!("active"));
		payload.insert("assigned_object_type".to_string(), json!(INTERFACE_TYPE));
		payload.insert("assigned_object_id".to_string(), Value::from(interface_id));
		let vrf = match master_ip.pointer("/vrf/name") {
			Some(name) if !name.is_null() => json!({ "name": name }),
			_ => Value::Null,
		};
		payload.insert("vrf".to_string(), vrf);
		for (field, value) in &self.overrides {
			payload.insert(field.clone(), value.clone());
		}
		payload
	}

	async fn sync_ip_address(
		&self,
		ip_addresses: &Collection<'_>,
		master_ip: &Record,
		interface: &Record,
	) -> anyhow::Result<()> {
		let interface_id = interface.require_id()?;
		let address = match master_ip.get("address") {
			Some(Value::String(a)) => a.clone(),
			_ => anyhow::bail!("IP address {} has no address", master_ip.display()),
		};
		let matches = ip_addresses.filter(&[("address", address.clone())]).await?;

		let Some(first) = matches.first() else {
			ip_addresses.create(&self.new_ip_payload(master_ip, interface_id)).await?;
			info!("Created IP {} on {}", address, interface.display());
			return Ok(());
		};

		if is_anycast(first) {
			if let Some(free) = matches.iter().find(|ip| !is_assigned(ip)) {
				ip_addresses.update(free.require_id()?, &assignment(interface_id)).await?;
				info!("Assigned anycast IP {} to {}", address, interface.display());
			} else if !matches.iter().any(|ip| is_assigned_to(ip, interface_id)) {
				let mut payload = self.new_ip_payload(master_ip, interface_id);
				payload.insert("role".to_string(), json!(ANYCAST_ROLE));
				ip_addresses.create(&payload).await?;
				info!("Created anycast IP {} on {}", address, interface.display());
			} else {
				debug!("Anycast IP {} already on {}", address, interface.display());
			}
			return Ok(());
		}

		if is_assigned_to(first, interface_id) {
			debug!("IP {} already on {}", address, interface.display());
		} else {
			ip_addresses.update(first.require_id()?, &assignment(interface_id)).await?;
			info!("Moved IP {} to {}", address, interface.display());
		}
		Ok(())
	}
}

fn assignment(interface_id: i64) -> Payload {
	let mut changes = Payload::new();
	changes.insert("assigned_object_type".to_string(), json!(INTERFACE_TYPE));
	changes.insert("assigned_object_id".to_string(), Value::from(interface_id));
	changes
}

fn is_anycast(ip: &Record) -> bool {
	let role = match ip.get("role") {
		Some(Value::Object(role)) => role.get("value"),
		other => other,
	};
	matches!(role, Some(Value::String(r)) if r.eq_ignore_ascii_case(ANYCAST_ROLE))
}

fn is_assigned(ip: &Record) -> bool {
	ip.get("assigned_object_id").is_some_and(|id| !id.is_null())
}

fn is_assigned_to(ip: &Record, interface_id: i64) -> bool {
	ip.get("assigned_object_id").and_then(Value::as_i64) == Some(interface_id)
		&& ip.get("assigned_object_type").and_then(Value::as_str).unwrap_or(INTERFACE_TYPE) == INTERFACE_TYPE
}

#[async_trait]
impl SyncHooks for InterfaceHooks {
	async fn post_sync(&self, ctx: &HookContext<'_>, master: &Record, synced: Record) -> anyhow::Result<Record> {
		let mut synced = synced;
		if let Some(Value::Array(vlans)) = master.get("tagged_vlans")
			&& !vlans.is_empty()
		{
			synced = self.sync_tagged_vlans(ctx, synced, vlans).await?;
		}

		let master_ips = Collection::resolve(ctx.master, "ipam.ip-addresses")?;
		let ips = master_ips
			.filter(&[
				("assigned_object_type", INTERFACE_TYPE.to_string()),
				("assigned_object_id", master.require_id()?.to_string()),
			])
			.await
			.with_context(|| format!("listing IP addresses of {}", master.display()))?;

		let slave_ips = Collection::resolve(ctx.slave, "ipam.ip-addresses")?;
		for ip in &ips {
			self.sync_ip_address(&slave_ips, ip, &synced).await?;
		}
		Ok(synced)
	}
}

// `tagged_vlans` comes back as nested objects from NetBox and as bare ids
// from a PATCH body; order is not significant.
fn same_vlan_ids(interface: &Record, wanted: &[Value]) -> bool {
	let mut current: Vec<i64> = match interface.get("tagged_vlans") {
		Some(Value::Array(vlans)) => vlans
			.iter()
			.filter_map(|v| v.get("id").unwrap_or(v).as_i64())
			.collect(),
		_ => Vec::new(),
	};
	let mut wanted: Vec<i64> = wanted.iter().filter_map(Value::as_i64).collect();
	current.sort_unstable();
	wanted.sort_unstable();
	current == wanted
}
