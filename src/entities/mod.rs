//! NetBox entity types that can be synchronized.

pub mod dcim;
pub mod interfaces;
pub mod module_bays;
pub mod virtualization;

use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::store::Payload;
use crate::sync::{EntitySpec, LookupRules, SpecError};

/// Entity types, in a dependency-friendly order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntityKind {
	Racks,
	Devices,
	DeviceBays,
	ModuleBays,
	Interfaces,
	ClusterTypes,
	ClusterGroups,
	Clusters,
	VirtualMachines,
	VirtualInterfaces,
}

impl EntityKind {
	pub const ALL: [EntityKind; 10] = [
		EntityKind::Racks,
		EntityKind::Devices,
		EntityKind::DeviceBays,
		EntityKind::ModuleBays,
		EntityKind::Interfaces,
		EntityKind::ClusterTypes,
		EntityKind::ClusterGroups,
		EntityKind::Clusters,
		EntityKind::VirtualMachines,
		EntityKind::VirtualInterfaces,
	];

	/// What a run syncs when no entity list is configured.
	pub fn default_selection() -> Vec<EntityKind> {
		vec![EntityKind::Devices, EntityKind::DeviceBays, EntityKind::Interfaces]
	}

	pub fn as_str(&self) -> &'static str {
		match self {
			EntityKind::Racks => "racks",
			EntityKind::Devices => "devices",
			EntityKind::DeviceBays => "device-bays",
			EntityKind::ModuleBays => "module-bays",
			EntityKind::Interfaces => "interfaces",
			EntityKind::ClusterTypes => "cluster-types",
			EntityKind::ClusterGroups => "cluster-groups",
			EntityKind::Clusters => "clusters",
			EntityKind::VirtualMachines => "virtual-machines",
			EntityKind::VirtualInterfaces => "virtual-interfaces",
		}
	}

	/// Whether the tenant override applies to this entity type.
	pub fn carries_tenant(&self) -> bool {
		!matches!(self, EntityKind::ClusterTypes | EntityKind::ClusterGroups)
	}

	/// Build the spec for this entity type. `overrides` is applied only to
	/// entity types that carry it.
	pub fn spec(&self, overrides: &Payload) -> Result<EntitySpec, SpecError> {
		let overrides = if self.carries_tenant() {
			overrides.clone()
		} else {
			Payload::new()
		};
		let spec = match self {
			EntityKind::Racks => dcim::racks(),
			EntityKind::Devices => dcim::devices(),
			EntityKind::DeviceBays => dcim::device_bays(),
			EntityKind::ModuleBays => module_bays::module_bays(),
			EntityKind::Interfaces => interfaces::interfaces(&overrides),
			EntityKind::ClusterTypes => virtualization::cluster_types(),
			EntityKind::ClusterGroups => virtualization::cluster_groups(),
			EntityKind::Clusters => virtualization::clusters(),
			EntityKind::VirtualMachines => virtualization::virtual_machines(),
			EntityKind::VirtualInterfaces => virtualization::virtual_interfaces(),
		}?;
		Ok(spec.with_overrides(overrides))
	}
}

impl fmt::Display for EntityKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Override values forcing every synced record onto `tenant`.
pub fn tenant_overrides(tenant: Option<&str>) -> Payload {
	let mut overrides = Payload::new();
	if let Some(slug) = tenant {
		overrides.insert("tenant".to_string(), json!({ "slug": slug }));
	}
	overrides
}

/// Build specs for `kinds` in the given order.
pub fn specs_for(kinds: &[EntityKind], tenant: Option<&str>) -> Result<Vec<EntitySpec>, SpecError> {
	let overrides = tenant_overrides(tenant);
	kinds.iter().map(|kind| kind.spec(&overrides)).collect()
}

/// Lookup rules shared by every NetBox entity type.
pub(crate) fn netbox_rules() -> LookupRules {
	LookupRules::new()
		.relation("site", "slug")
		.relation("role", "slug")
		.relation("device_type", "slug")
		.relation("location", "slug")
		.relation("platform", "slug")
		.relation("rack_type", "slug")
		.relation("tenant", "slug")
		.relation("manufacturer", "slug")
		.relation("group", "slug")
		.relation("tags", "slug")
		.relation("device", "name")
		.relation("rack", "name")
		.relation("parent", "name")
		.relation("untagged_vlan", "name")
		.relation("cluster", "name")
		.relation("virtual_machine", "name")
		.scalar("status", "value")
		.scalar("face", "value")
		.scalar("mode", "value")
}
