//! In-memory [`Store`] implementation.
//!
//! Behaves like a small NetBox: numeric ids are assigned on create,
//! `filter` understands `<field>=<value>` and `<relation>_id=<id>` query
//! pairs, and every write is journaled so callers can assert on exactly
//! which store calls a run made.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use super::{CollectionPath, Payload, Record, Store, StoreError};

/// A write call observed by the store.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
	Create { path: String, id: i64, payload: Payload },
	Update { path: String, id: i64, changes: Payload },
	Delete { path: String, id: i64 },
}

/// Rejects writes whose payload carries `field == value`, the way NetBox
/// rejects a payload that fails validation.
#[derive(Debug, Clone)]
struct Rejection {
	path: CollectionPath,
	field: String,
	value: Value,
	message: String,
}

#[derive(Default)]
struct Inner {
	collections: BTreeMap<CollectionPath, Vec<Record>>,
	next_id: i64,
	journal: Vec<WriteOp>,
	rejections: Vec<Rejection>,
}

impl Inner {
	fn allocate_id(&mut self) -> i64 {
		self.next_id += 1;
		self.next_id
	}

	fn check_rejections(&self, path: &CollectionPath, payload: &Payload) -> Result<(), StoreError> {
		for r in &self.rejections {
			if &r.path == path && payload.get(&r.field) == Some(&r.value) {
				return Err(StoreError::Status {
					method: "WRITE".to_string(),
					url: path.to_string(),
					status: 400,
					body: r.message.clone(),
				});
			}
		}
		Ok(())
	}
}

pub struct MemoryStore {
	name: String,
	inner: Mutex<Inner>,
}

impl MemoryStore {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			inner: Mutex::new(Inner::default()),
		}
	}

	fn lock(&self) -> MutexGuard<'_, Inner> {
		self.inner.lock().unwrap_or_else(PoisonError::into_inner)
	}

	/// Seed a collection with JSON objects. Objects without an `id` get one
	/// assigned. Seeding is not journaled.
	pub fn insert(&self, path: &str, records: Vec<Value>) -> Result<Vec<Record>, StoreError> {
		let path = CollectionPath::parse(path)?;
		let mut inner = self.lock();
		let mut inserted = Vec::with_capacity(records.len());
		for value in records {
			let mut record = Record::from_value(value);
			match record.id() {
				Some(id) => inner.next_id = inner.next_id.max(id),
				None => {
					let id = inner.allocate_id();
					record.set("id", Value::from(id));
				}
			}
			inserted.push(record.clone());
			inner.collections.entry(path.clone()).or_default().push(record);
		}
		Ok(inserted)
	}

	/// Current contents of a collection in insertion order.
	pub fn records(&self, path: &str) -> Vec<Record> {
		let Ok(path) = CollectionPath::parse(path) else {
			return Vec::new();
		};
		self.lock()
			.collections
			.get(&path)
			.cloned()
			.unwrap_or_default()
	}

	/// Make writes to `path` fail when the payload holds `field == value`.
	pub fn reject_writes_with(&self, path: &str, field: &str, value: Value, message: &str) -> Result<(), StoreError> {
		let path = CollectionPath::parse(path)?;
		self.lock().rejections.push(Rejection {
			path,
			field: field.to_string(),
			value,
			message: message.to_string(),
		});
		Ok(())
	}

	pub fn journal(&self) -> Vec<WriteOp> {
		self.lock().journal.clone()
	}

	pub fn clear_journal(&self) {
		self.lock().journal.clear();
	}
}

/// String form of a field value as it would appear in a query string.
fn query_string(value: &Value) -> String {
	match value {
		Value::String(s) => s.clone(),
		other => other.to_string(),
	}
}

fn matches_query(record: &Record, query: &[(&str, String)]) -> bool {
	query.iter().all(|(key, expected)| {
		match record.get(key) {
			Some(Value::Object(nested)) => nested.get("id").map(query_string).as_ref() == Some(expected),
			Some(value) => &query_string(value) == expected,
			None => match key.strip_suffix("_id").and_then(|stem| record.get(stem)) {
				Some(Value::Object(nested)) => nested.get("id").map(query_string).as_ref() == Some(expected),
				_ => false,
			},
		}
	})
}

#[async_trait]
impl Store for MemoryStore {
	fn name(&self) -> &str {
		&self.name
	}

	async fn list(&self, path: &CollectionPath) -> Result<Vec<Record>, StoreError> {
		Ok(self
			.lock()
			.collections
			.get(path)
			.cloned()
			.unwrap_or_default())
	}

	async fn filter(
		&self,
		path: &CollectionPath,
		query: &[(&str, String)],
	) -> Result<Vec<Record>, StoreError> {
		let inner = self.lock();
		Ok(inner
			.collections
			.get(path)
			.map(|records| {
				records
					.iter()
					.filter(|r| matches_query(r, query))
					.cloned()
					.collect()
			})
			.unwrap_or_default())
	}

	async fn get(&self, path: &CollectionPath, id: i64) -> Result<Option<Record>, StoreError> {
		Ok(self
			.lock()
			.collections
			.get(path)
			.and_then(|records| records.iter().find(|r| r.id() == Some(id)).cloned()))
	}

	async fn create(&self, path: &CollectionPath, payload: &Payload) -> Result<Record, StoreError> {
		let mut inner = self.lock();
		inner.check_rejections(path, payload)?;

		let id = inner.allocate_id();
		let mut record = Record::new(payload.clone());
		record.set("id", Value::from(id));
		inner
			.collections
			.entry(path.clone())
			.or_default()
			.push(record.clone());
		inner.journal.push(WriteOp::Create {
			path: path.to_string(),
			id,
			payload: payload.clone(),
		});
		Ok(record)
	}

	async fn update(
		&self,
		path: &CollectionPath,
		id: i64,
		changes: &Payload,
	) -> Result<Record, StoreError> {
		let mut inner = self.lock();
		inner.check_rejections(path, changes)?;

		let record = inner
			.collections
			.get_mut(path)
			.and_then(|records| records.iter_mut().find(|r| r.id() == Some(id)))
			.ok_or_else(|| StoreError::NotFound {
				collection: path.to_string(),
				id,
			})?;
		record.apply(changes);
		let updated = record.clone();
		inner.journal.push(WriteOp::Update {
			path: path.to_string(),
			id,
			changes: changes.clone(),
		});
		Ok(updated)
	}

	async fn delete(&self, path: &CollectionPath, id: i64) -> Result<(), StoreError> {
		let mut inner = self.lock();
		let records = inner.collections.get_mut(path).ok_or_else(|| StoreError::NotFound {
			collection: path.to_string(),
			id,
		})?;
		let before = records.len();
		records.retain(|r| r.id() != Some(id));
		if records.len() == before {
			return Err(StoreError::NotFound {
				collection: path.to_string(),
				id,
			});
		}
		inner.journal.push(WriteOp::Delete {
			path: path.to_string(),
			id,
		});
		Ok(())
	}
}

#[cfg(test)]
#[cfg(feature = "unit-tests")]
mod tests {
	use serde_json::json;

	use super::*;

	#[tokio::test]
	async fn filter_matches_fields_and_relation_ids() {
		let store = MemoryStore::new("slave");
		store
			.insert(
				"dcim.interfaces",
				vec![
					json!({"id": 1, "name": "eth0", "device": {"id": 10, "name": "rtr-1"}}),
					json!({"id": 2, "name": "eth1", "device": {"id": 11, "name": "rtr-2"}}),
				],
			)
			.unwrap();
		let path = CollectionPath::parse("dcim.interfaces").unwrap();

		let by_device = store.filter(&path, &[("device_id", "10".to_string())]).await.unwrap();
		assert_eq!(by_device.len(), 1);
		assert_eq!(by_device[0].display(), "eth0");

		let by_name = store.filter(&path, &[("name", "eth1".to_string())]).await.unwrap();
		assert_eq!(by_name[0].id(), Some(2));

		let none = store.filter(&path, &[("vid", "5".to_string())]).await.unwrap();
		assert!(none.is_empty());
	}

	#[tokio::test]
	async fn writes_are_journaled() {
		let store = MemoryStore::new("slave");
		store.insert("dcim.devices", vec![json!({"id": 4, "name": "a"})]).unwrap();
		let path = CollectionPath::parse("dcim.devices").unwrap();

		let mut payload = Payload::new();
		payload.insert("name".into(), json!("b"));
		let created = store.create(&path, &payload).await.unwrap();
		assert_eq!(created.id(), Some(5));

		let mut changes = Payload::new();
		changes.insert("serial".into(), json!("X1"));
		store.update(&path, 4, &changes).await.unwrap();
		store.delete(&path, 5).await.unwrap();

		let journal = store.journal();
		assert_eq!(journal.len(), 3);
		assert!(matches!(journal[0], WriteOp::Create { id: 5, .. }));
		assert!(matches!(journal[1], WriteOp::Update { id: 4, .. }));
		assert!(matches!(journal[2], WriteOp::Delete { id: 5, .. }));
		assert_eq!(store.records("dcim.devices")[0].get("serial"), Some(&json!("X1")));
	}

	#[tokio::test]
	async fn rejected_writes_fail_with_status() {
		let store = MemoryStore::new("slave");
		store
			.reject_writes_with("dcim.devices", "name", json!("bad"), "name: invalid")
			.unwrap();
		let path = CollectionPath::parse("dcim.devices").unwrap();
		let mut payload = Payload::new();
		payload.insert("name".into(), json!("bad"));

		let err = store.create(&path, &payload).await.unwrap_err();
		assert!(matches!(err, StoreError::Status { status: 400, .. }));
		assert!(store.journal().is_empty());
	}
}
