use super::netbox_rules;
use crate::sync::{EntitySpec, SpecError};

pub fn cluster_types() -> Result<EntitySpec, SpecError> {
	Ok(EntitySpec::new(
		"cluster-types",
		"virtualization.cluster-types",
		&["name", "slug", "description"],
		&["name"],
	)?
	.with_rules(netbox_rules()))
}

pub fn cluster_groups() -> Result<EntitySpec, SpecError> {
	Ok(EntitySpec::new(
		"cluster-groups",
		"virtualization.cluster-groups",
		&["name", "slug", "description"],
		&["name"],
	)?
	.with_rules(netbox_rules()))
}

pub fn clusters() -> Result<EntitySpec, SpecError> {
	Ok(EntitySpec::new(
		"clusters",
		"virtualization.clusters",
		&["name", "type", "group", "site", "tenant", "description"],
		&["name"],
	)?
	// A cluster's type is a related cluster type, not a choice.
	.with_rules(netbox_rules().relation("type", "slug")))
}

pub fn virtual_machines() -> Result<EntitySpec, SpecError> {
	Ok(EntitySpec::new(
		"virtual-machines",
		"virtualization.virtual-machines",
		&[
			"name",
			"cluster",
			"status",
			"role",
			"tenant",
			"platform",
			"vcpus",
			"memory",
			"disk",
			"description",
		],
		&["name", "cluster"],
	)?
	.with_rules(netbox_rules()))
}

pub fn virtual_interfaces() -> Result<EntitySpec, SpecError> {
	Ok(EntitySpec::new(
		"virtual-interfaces",
		"virtualization.interfaces",
		&[
			"name",
			"virtual_machine",
			"enabled",
			"mac_address",
			"mtu",
			"mode",
			"untagged_vlan",
			"description",
		],
		&["name", "virtual_machine"],
	)?
	.with_rules(netbox_rules()))
}
