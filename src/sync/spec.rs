use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use super::hooks::{NoHooks, SyncHooks};
use super::normalize::LookupRules;
use crate::store::{CollectionPath, Payload, StoreError};

#[derive(Debug, Error)]
pub enum SpecError {
	#[error("entity '{0}' declares no identity fields")]
	EmptyIdentity(String),
	#[error("entity '{entity}': {source}")]
	InvalidPath {
		entity: String,
		#[source]
		source: StoreError,
	},
}

/// Declaration of one entity type: which collection, which fields are
/// synced, how records are matched and how field values are compared.
///
/// Built once before a run and read-only afterwards.
#[derive(Clone)]
pub struct EntitySpec {
	name: String,
	collection: CollectionPath,
	synced_fields: Vec<String>,
	identity_fields: Vec<String>,
	override_values: Payload,
	rules: LookupRules,
	hooks: Arc<dyn SyncHooks>,
}

impl EntitySpec {
	/// Create a spec with no overrides, no lookup rules and no hooks.
	///
	/// Duplicate field names are dropped, keeping the first occurrence.
	pub fn new<S: AsRef<str>>(
		name: &str,
		collection: &str,
		synced_fields: &[S],
		identity_fields: &[S],
	) -> Result<Self, SpecError> {
		let name = name.to_string();
		let collection = CollectionPath::parse(collection).map_err(|source| SpecError::InvalidPath {
			entity: name.clone(),
			source,
		})?;
		let identity_fields = ordered_set(identity_fields);
		if identity_fields.is_empty() {
			return Err(SpecError::EmptyIdentity(name));
		}
		Ok(Self {
			name,
			collection,
			synced_fields: ordered_set(synced_fields),
			identity_fields,
			override_values: Payload::new(),
			rules: LookupRules::default(),
			hooks: Arc::new(NoHooks),
		})
	}

	/// Fixed values forced onto every synced slave record.
	pub fn with_overrides(mut self, overrides: Payload) -> Self {
		self.override_values = overrides;
		self
	}

	pub fn with_override(mut self, field: impl Into<String>, value: Value) -> Self {
		self.override_values.insert(field.into(), value);
		self
	}

	pub fn with_rules(mut self, rules: LookupRules) -> Self {
		self.rules = rules;
		self
	}

	pub fn with_hooks(mut self, hooks: Arc<dyn SyncHooks>) -> Self {
		self.hooks = hooks;
		self
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn collection(&self) -> &CollectionPath {
		&self.collection
	}

	pub fn synced_fields(&self) -> &[String] {
		&self.synced_fields
	}

	pub fn identity_fields(&self) -> &[String] {
		&self.identity_fields
	}

	pub fn override_values(&self) -> &Payload {
		&self.override_values
	}

	pub fn rules(&self) -> &LookupRules {
		&self.rules
	}

	pub fn hooks(&self) -> &dyn SyncHooks {
		self.hooks.as_ref()
	}
}

impl fmt::Debug for EntitySpec {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("EntitySpec")
			.field("name", &self.name)
			.field("collection", &self.collection)
			.field("synced_fields", &self.synced_fields)
			.field("identity_fields", &self.identity_fields)
			.field("override_values", &self.override_values)
			.field("rules", &self.rules)
			.finish_non_exhaustive()
	}
}

fn ordered_set<S: AsRef<str>>(fields: &[S]) -> Vec<String> {
	let mut out: Vec<String> = Vec::with_capacity(fields.len());
	for field in fields {
		let field = field.as_ref();
		if !out.iter().any(|f| f == field) {
			out.push(field.to_string());
		}
	}
	out
}

#[cfg(test)]
#[cfg(feature = "unit-tests")]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn test_spec_builder() {
		let spec = EntitySpec::new("devices", "dcim.devices", &["name", "status", "name"], &["name"])
			.unwrap()
			.with_override("tenant", json!({"slug": "ops"}))
			.with_rules(LookupRules::new().scalar("status", "value"));

		assert_eq!(spec.name(), "devices");
		assert_eq!(spec.collection().to_string(), "dcim.devices");
		assert_eq!(spec.synced_fields(), &["name".to_string(), "status".to_string()]);
		assert_eq!(spec.override_values().get("tenant"), Some(&json!({"slug": "ops"})));
		assert_eq!(spec.rules().scalar_lookup("status"), Some("value"));
	}

	#[test]
	fn test_spec_requires_identity_fields() {
		let err = EntitySpec::new::<&str>("racks", "dcim.racks", &["name"], &[]).unwrap_err();
		assert!(matches!(err, SpecError::EmptyIdentity(_)));
	}

	#[test]
	fn test_spec_rejects_bad_path() {
		let err = EntitySpec::new("racks", "dcim..racks", &["name"], &["name"]).unwrap_err();
		assert!(err.to_string().contains("racks"));
	}

	#[test]
	fn test_overrides_are_per_instance() {
		let a = EntitySpec::new("a", "dcim.racks", &["name"], &["name"])
			.unwrap()
			.with_override("tenant", json!({"slug": "x"}));
		let b = EntitySpec::new("b", "dcim.racks", &["name"], &["name"]).unwrap();
		assert_eq!(a.override_values().len(), 1);
		assert!(b.override_values().is_empty());
	}
}
