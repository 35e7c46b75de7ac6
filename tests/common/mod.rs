//! Common helpers for integration tests.
#![allow(dead_code)]

use std::env;

use serde_json::Value;
use url::Url;
use vanopticon_netbox_sync::store::{ClientConfig, MemoryStore, Payload, WriteOp};

/// Turn a `json!` object literal into a payload.
pub fn payload(value: Value) -> Payload {
	match value {
		Value::Object(map) => map,
		other => panic!("expected a JSON object, got {}", other),
	}
}

/// Master and slave stores seeded by the caller.
pub fn stores() -> (MemoryStore, MemoryStore) {
	(MemoryStore::new("master"), MemoryStore::new("slave"))
}

/// Number of journaled writes of each kind: (creates, updates, deletes).
pub fn write_counts(store: &MemoryStore) -> (usize, usize, usize) {
	store.journal().iter().fold((0, 0, 0), |(c, u, d), op| match op {
		WriteOp::Create { .. } => (c + 1, u, d),
		WriteOp::Update { .. } => (c, u + 1, d),
		WriteOp::Delete { .. } => (c, u, d + 1),
	})
}

/// Client config for a live NetBox instance from `NETBOX_<ROLE>_URL` and
/// `NETBOX_<ROLE>_TOKEN`. Returns `None` when either is unset.
pub fn live_client_config(role: &str) -> Option<ClientConfig> {
	let upper = role.to_uppercase();
	let url = env::var(format!("NETBOX_{}_URL", upper)).ok()?;
	let token = env::var(format!("NETBOX_{}_TOKEN", upper)).ok()?;
	let url = Url::parse(&url).ok()?;
	Some(ClientConfig::new(role, url, token))
}

/// Skip the test with a message unless both live instances are configured.
pub fn check_live_enabled() -> Option<(ClientConfig, ClientConfig)> {
	match (live_client_config("master"), live_client_config("slave")) {
		(Some(m), Some(s)) => Some((m, s)),
		_ => {
			eprintln!(
				"Skipping live NetBox test; set NETBOX_MASTER_URL, NETBOX_MASTER_TOKEN, NETBOX_SLAVE_URL and NETBOX_SLAVE_TOKEN to enable"
			);
			None
		}
	}
}
