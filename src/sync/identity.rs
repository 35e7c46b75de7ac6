use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;

use log::debug;
use serde_json::Value;

use super::normalize::NormalizedValue;
use super::result::{RunResult, Stage};
use super::spec::EntitySpec;
use super::{SyncError, require_field};
use crate::store::Record;

/// Hashable form of a normalized value.
///
/// Mappings become key-sorted pairs and lists become tuples so equal
/// values always hash the same regardless of JSON key order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyPart {
	Null,
	Bool(bool),
	/// Numbers by their canonical JSON text.
	Number(String),
	Text(String),
	Tuple(Vec<KeyPart>),
	Pairs(Vec<(String, KeyPart)>),
}

impl KeyPart {
	pub fn from_json(value: &Value) -> Self {
		match value {
			Value::Null => KeyPart::Null,
			Value::Bool(b) => KeyPart::Bool(*b),
			Value::Number(n) => KeyPart::Number(n.to_string()),
			Value::String(s) => KeyPart::Text(s.clone()),
			Value::Array(items) => KeyPart::Tuple(items.iter().map(Self::from_json).collect()),
			Value::Object(map) => {
				let mut pairs: Vec<(String, KeyPart)> = map
					.iter()
					.map(|(k, v)| (k.clone(), Self::from_json(v)))
					.collect();
				pairs.sort_by(|a, b| a.0.cmp(&b.0));
				KeyPart::Pairs(pairs)
			}
		}
	}

	pub fn from_normalized(value: &NormalizedValue) -> Self {
		match value {
			NormalizedValue::Scalar(v) => Self::from_json(v),
			NormalizedValue::Reference { lookup, value } => {
				KeyPart::Pairs(vec![(lookup.clone(), Self::from_json(value))])
			}
			NormalizedValue::List(items) => KeyPart::Tuple(items.iter().map(Self::from_normalized).collect()),
		}
	}
}

impl fmt::Display for KeyPart {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			KeyPart::Null => f.write_str("null"),
			KeyPart::Bool(b) => write!(f, "{}", b),
			KeyPart::Number(n) => f.write_str(n),
			KeyPart::Text(s) => f.write_str(s),
			KeyPart::Tuple(items) => {
				f.write_str("[")?;
				for (i, item) in items.iter().enumerate() {
					if i > 0 {
						f.write_str(", ")?;
					}
					write!(f, "{}", item)?;
				}
				f.write_str("]")
			}
			KeyPart::Pairs(pairs) => {
				for (i, (k, v)) in pairs.iter().enumerate() {
					if i > 0 {
						f.write_str(",")?;
					}
					write!(f, "{}={}", k, v)?;
				}
				Ok(())
			}
		}
	}
}

/// Cross-store identity of a record: one part per identity field, in the
/// order the fields are declared.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityKey(Vec<KeyPart>);

impl fmt::Display for IdentityKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for (i, part) in self.0.iter().enumerate() {
			if i > 0 {
				f.write_str(" / ")?;
			}
			write!(f, "{}", part)?;
		}
		Ok(())
	}
}

/// Compute the identity key of `record` under `spec`.
pub fn build_key(record: &Record, spec: &EntitySpec) -> Result<IdentityKey, SyncError> {
	let mut parts = Vec::with_capacity(spec.identity_fields().len());
	for field in spec.identity_fields() {
		let raw = require_field(record, field)?;
		let normalized = spec.rules().normalize(field, raw)?;
		parts.push(KeyPart::from_normalized(&normalized));
	}
	Ok(IdentityKey(parts))
}

/// Slave records by identity key.
#[derive(Debug, Default)]
pub struct SlaveIndex {
	entries: HashMap<IdentityKey, Record>,
}

impl SlaveIndex {
	pub fn get(&self, key: &IdentityKey) -> Option<&Record> {
		self.entries.get(key)
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}

/// Index `records` by identity key.
///
/// The first record wins a key collision; later duplicates are shadowed and
/// only noted at debug level. Records whose key cannot be computed are
/// reported in `result` and left out of the index.
pub fn build_index(records: Vec<Record>, spec: &EntitySpec, result: &mut RunResult) -> SlaveIndex {
	let mut entries = HashMap::with_capacity(records.len());
	for record in records {
		let key = match build_key(&record, spec) {
			Ok(key) => key,
			Err(e) => {
				result.record_error(Stage::Index, record.display(), e);
				continue;
			}
		};
		match entries.entry(key) {
			Entry::Vacant(slot) => {
				slot.insert(record);
			}
			Entry::Occupied(existing) => {
				debug!(
					"Duplicate identity key {} in {}: keeping {}, ignoring {}",
					existing.key(),
					spec.collection(),
					existing.get().display(),
					record.display()
				);
			}
		}
	}
	debug!("Created slave index with {} unique key(s)", entries.len());
	SlaveIndex { entries }
}
