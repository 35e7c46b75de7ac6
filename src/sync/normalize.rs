//! Canonical comparison form for record field values.
//!
//! NetBox renders relations as nested objects carrying store-local numeric
//! ids, so the same site is `{"id": 3, "slug": "dc1"}` on one instance and
//! `{"id": 41, "slug": "dc1"}` on the other. Normalization reduces such
//! values to the natural key named by a per-field [`LookupRules`] entry so
//! they compare equal across stores, and renders them in the shape NetBox
//! accepts back in a write payload (`{"slug": "dc1"}`).

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
	#[error("field '{field}': expected an object with '{lookup}', got {found}")]
	MalformedReference {
		field: String,
		lookup: String,
		found: String,
	},
	#[error("field '{field}': object has no '{lookup}' attribute")]
	MissingLookupField { field: String, lookup: String },
}

/// Normalized field value.
#[derive(Debug, Clone, PartialEq)]
pub enum NormalizedValue {
	/// A value compared as-is.
	Scalar(Value),
	/// A relation reduced to one natural-key attribute, `{lookup: value}`.
	Reference { lookup: String, value: Value },
	List(Vec<NormalizedValue>),
}

impl NormalizedValue {
	/// JSON form used in create payloads and change sets.
	pub fn to_json(&self) -> Value {
		match self {
			NormalizedValue::Scalar(v) => v.clone(),
			NormalizedValue::Reference { lookup, value } => {
				let mut map = Map::new();
				map.insert(lookup.clone(), value.clone());
				Value::Object(map)
			}
			NormalizedValue::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
		}
	}
}

/// Per-field extraction rules.
///
/// Relation rules win over scalar rules when a field carries both.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupRules {
	relation: BTreeMap<String, String>,
	scalar: BTreeMap<String, String>,
}

impl LookupRules {
	pub fn new() -> Self {
		Self::default()
	}

	/// Compare `field` by the `lookup` attribute of the related object.
	pub fn relation(mut self, field: impl Into<String>, lookup: impl Into<String>) -> Self {
		self.relation.insert(field.into(), lookup.into());
		self
	}

	/// Compare `field` by the bare `lookup` attribute of an enum-like object
	/// such as NetBox's `{"value": "active", "label": "Active"}`.
	pub fn scalar(mut self, field: impl Into<String>, lookup: impl Into<String>) -> Self {
		self.scalar.insert(field.into(), lookup.into());
		self
	}

	pub fn relation_lookup(&self, field: &str) -> Option<&str> {
		self.relation.get(field).map(String::as_str)
	}

	pub fn scalar_lookup(&self, field: &str) -> Option<&str> {
		self.scalar.get(field).map(String::as_str)
	}

	/// Normalize the raw value of `field`.
	pub fn normalize(&self, field: &str, raw: &Value) -> Result<NormalizedValue, NormalizeError> {
		if let Value::Array(items) = raw {
			return items
				.iter()
				.map(|item| self.normalize(field, item))
				.collect::<Result<Vec<_>, _>>()
				.map(NormalizedValue::List);
		}

		if let Some(lookup) = self.relation_lookup(field) {
			let value = match raw {
				Value::Null => Value::Null,
				Value::Object(obj) => extract(field, lookup, obj)?,
				other => {
					return Err(NormalizeError::MalformedReference {
						field: field.to_string(),
						lookup: lookup.to_string(),
						found: other.to_string(),
					});
				}
			};
			return Ok(NormalizedValue::Reference {
				lookup: lookup.to_string(),
				value,
			});
		}

		if let Some(lookup) = self.scalar_lookup(field) {
			return match raw {
				Value::Object(obj) => extract(field, lookup, obj).map(NormalizedValue::Scalar),
				// Already flattened (or unset): nothing to extract.
				other => Ok(NormalizedValue::Scalar(other.clone())),
			};
		}

		Ok(NormalizedValue::Scalar(raw.clone()))
	}
}

fn extract(field: &str, lookup: &str, obj: &Map<String, Value>) -> Result<Value, NormalizeError> {
	obj.get(lookup)
		.cloned()
		.ok_or_else(|| NormalizeError::MissingLookupField {
			field: field.to_string(),
			lookup: lookup.to_string(),
		})
}

#[cfg(test)]
#[cfg(feature = "unit-tests")]
mod tests {
	use serde_json::json;

	use super::*;

	fn rules() -> LookupRules {
		LookupRules::new()
			.relation("site", "slug")
			.relation("device", "name")
			.relation("tags", "slug")
			.scalar("status", "value")
			.scalar("primary_ip", "address")
	}

	#[test]
	fn relation_reduces_to_single_key_mapping() {
		let n = rules()
			.normalize("site", &json!({"id": 3, "slug": "dc1", "name": "DC 1"}))
			.unwrap();
		assert_eq!(
			n,
			NormalizedValue::Reference {
				lookup: "slug".into(),
				value: json!("dc1")
			}
		);
		assert_eq!(n.to_json(), json!({"slug": "dc1"}));
	}

	#[test]
	fn same_natural_key_compares_equal_across_ids() {
		let r = rules();
		let master = r.normalize("site", &json!({"id": 3, "slug": "dc1"})).unwrap();
		let slave = r.normalize("site", &json!({"id": 41, "slug": "dc1"})).unwrap();
		assert_eq!(master, slave);
	}

	#[test]
	fn absent_relation_yields_null_reference() {
		let n = rules().normalize("device", &Value::Null).unwrap();
		assert_eq!(n.to_json(), json!({"name": null}));
	}

	#[test]
	fn scalar_rule_returns_bare_value() {
		let r = rules();
		assert_eq!(
			r.normalize("status", &json!({"value": "active", "label": "Active"})).unwrap(),
			NormalizedValue::Scalar(json!("active"))
		);
		assert_eq!(
			r.normalize("primary_ip", &json!({"id": 9, "address": "10.0.0.1/32"})).unwrap(),
			NormalizedValue::Scalar(json!("10.0.0.1/32"))
		);
		// already flattened values pass through
		assert_eq!(
			r.normalize("status", &json!("planned")).unwrap(),
			NormalizedValue::Scalar(json!("planned"))
		);
	}

	#[test]
	fn fields_without_rules_pass_through() {
		let r = rules();
		assert_eq!(r.normalize("name", &json!("rtr-1")).unwrap().to_json(), json!("rtr-1"));
		assert_eq!(
			r.normalize("custom_fields", &json!({"a": 1})).unwrap().to_json(),
			json!({"a": 1})
		);
	}

	#[test]
	fn lists_keep_order() {
		let n = rules()
			.normalize("tags", &json!([{"id": 1, "slug": "core"}, {"id": 2, "slug": "edge"}]))
			.unwrap();
		assert_eq!(n.to_json(), json!([{"slug": "core"}, {"slug": "edge"}]));

		let reversed = rules()
			.normalize("tags", &json!([{"slug": "edge"}, {"slug": "core"}]))
			.unwrap();
		assert_ne!(n, reversed);
	}

	#[test]
	fn malformed_references_are_errors() {
		let r = rules();
		assert_eq!(
			r.normalize("site", &json!(3)).unwrap_err(),
			NormalizeError::MalformedReference {
				field: "site".into(),
				lookup: "slug".into(),
				found: "3".into()
			}
		);
		assert_eq!(
			r.normalize("site", &json!({"id": 3})).unwrap_err(),
			NormalizeError::MissingLookupField {
				field: "site".into(),
				lookup: "slug".into()
			}
		);
	}
}
