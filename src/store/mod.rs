//! Store contract consumed by the reconciliation engine.
//!
//! A store is anything that exposes named record collections with
//! list/filter/get/create/update/delete operations. The engine only ever
//! talks to stores through [`Store`] and the [`Collection`] handle, so the
//! NetBox REST client and the in-memory store are interchangeable.

pub mod client_config;
pub mod memory;
pub mod netbox;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub use client_config::{ClientConfig, default_page_size};
pub use memory::{MemoryStore, WriteOp};
pub use netbox::{NetBoxClient, NetBoxClientBuilder};

/// Field map sent to a store on create or update.
pub type Payload = Map<String, Value>;

/// Errors surfaced by store implementations.
#[derive(Debug, Error)]
pub enum StoreError {
	#[error("invalid collection path '{0}'")]
	InvalidPath(String),

	#[error("HTTP request failed: {0}")]
	Http(String),

	#[error("connection failed: {0}")]
	Connect(String),

	#[error("{method} {url} returned {status}: {body}")]
	Status {
		method: String,
		url: String,
		status: u16,
		body: String,
	},

	#[error("request timeout")]
	Timeout,

	#[error("circuit breaker is open")]
	CircuitBreakerOpen,

	#[error("unexpected response: {0}")]
	Decode(String),

	#[error("no record with id {id} in {collection}")]
	NotFound { collection: String, id: i64 },

	#[error("record {0} has no numeric id")]
	MissingId(String),

	#[error("invalid request: {0}")]
	InvalidRequest(String),
}

impl StoreError {
	/// True for failures that may succeed when the request is repeated.
	pub fn is_transient(&self) -> bool {
		match self {
			StoreError::Status { status, .. } => *status >= 500 || *status == 408 || *status == 429,
			StoreError::Http(_) | StoreError::Connect(_) | StoreError::Timeout => true,
			_ => false,
		}
	}
}

/// Dot-separated resource path such as `dcim.device-bays`.
///
/// Segments are kept in the REST naming convention: underscores are
/// rewritten to hyphens, so `virtualization.cluster_types` and
/// `virtualization.cluster-types` address the same collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionPath {
	segments: Vec<String>,
}

impl CollectionPath {
	pub fn parse(path: &str) -> Result<Self, StoreError> {
		let segments: Vec<String> = path
			.split('.')
			.map(|s| s.trim().replace('_', "-"))
			.collect();
		if segments.is_empty() || segments.iter().any(|s| s.is_empty()) {
			return Err(StoreError::InvalidPath(path.to_string()));
		}
		Ok(Self { segments })
	}

	pub fn segments(&self) -> &[String] {
		&self.segments
	}
}

impl fmt::Display for CollectionPath {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.segments.join("."))
	}
}

/// A JSON object returned by a store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
	pub fn new(fields: Map<String, Value>) -> Self {
		Self(fields)
	}

	/// Build a record from a `json!` object literal. Non-objects produce an
	/// empty record.
	pub fn from_value(value: Value) -> Self {
		match value {
			Value::Object(map) => Self(map),
			_ => Self::default(),
		}
	}

	pub fn id(&self) -> Option<i64> {
		self.0.get("id").and_then(Value::as_i64)
	}

	pub fn require_id(&self) -> Result<i64, StoreError> {
		self.id().ok_or_else(|| StoreError::MissingId(self.display()))
	}

	/// Human-readable label used for logs and error entries.
	pub fn display(&self) -> String {
		for key in ["display", "name"] {
			if let Some(Value::String(s)) = self.0.get(key) {
				if !s.is_empty() {
					return s.clone();
				}
			}
		}
		match self.0.get("id") {
			Some(id) => format!("#{}", id),
			None => Value::Object(self.0.clone()).to_string(),
		}
	}

	pub fn get(&self, field: &str) -> Option<&Value> {
		self.0.get(field)
	}

	/// Nested lookup with a JSON pointer, e.g. `/module_type/manufacturer/slug`.
	pub fn pointer(&self, pointer: &str) -> Option<&Value> {
		let mut parts = pointer.trim_start_matches('/').splitn(2, '/');
		let head = parts.next()?;
		let value = self.0.get(head)?;
		match parts.next() {
			Some(rest) => value.pointer(&format!("/{}", rest)),
			None => Some(value),
		}
	}

	pub fn set(&mut self, field: impl Into<String>, value: Value) {
		self.0.insert(field.into(), value);
	}

	/// Assign every field of `changes` onto this record.
	pub fn apply(&mut self, changes: &Payload) {
		for (field, value) in changes {
			self.0.insert(field.clone(), value.clone());
		}
	}
}

impl From<Map<String, Value>> for Record {
	fn from(fields: Map<String, Value>) -> Self {
		Self(fields)
	}
}

/// Operations a data store exposes per collection.
#[async_trait]
pub trait Store: Send + Sync {
	/// Short label used in log lines ("master", "slave").
	fn name(&self) -> &str;

	/// List every record; implementations must follow pagination.
	async fn list(&self, path: &CollectionPath) -> Result<Vec<Record>, StoreError>;

	async fn filter(
		&self,
		path: &CollectionPath,
		query: &[(&str, String)],
	) -> Result<Vec<Record>, StoreError>;

	async fn get(&self, path: &CollectionPath, id: i64) -> Result<Option<Record>, StoreError>;

	async fn create(&self, path: &CollectionPath, payload: &Payload) -> Result<Record, StoreError>;

	/// Partial update: only the fields in `changes` are written.
	async fn update(
		&self,
		path: &CollectionPath,
		id: i64,
		changes: &Payload,
	) -> Result<Record, StoreError>;

	async fn delete(&self, path: &CollectionPath, id: i64) -> Result<(), StoreError>;
}

/// A store bound to one collection.
#[derive(Clone)]
pub struct Collection<'a> {
	store: &'a dyn Store,
	path: CollectionPath,
}

impl<'a> Collection<'a> {
	pub fn new(store: &'a dyn Store, path: CollectionPath) -> Self {
		Self { store, path }
	}

	/// Parse a dot-separated path string and bind it to `store`.
	pub fn resolve(store: &'a dyn Store, path: &str) -> Result<Self, StoreError> {
		Ok(Self::new(store, CollectionPath::parse(path)?))
	}

	pub fn path(&self) -> &CollectionPath {
		&self.path
	}

	pub fn store_name(&self) -> &str {
		self.store.name()
	}

	pub async fn all(&self) -> Result<Vec<Record>, StoreError> {
		self.store.list(&self.path).await
	}

	pub async fn filter(&self, query: &[(&str, String)]) -> Result<Vec<Record>, StoreError> {
		self.store.filter(&self.path, query).await
	}

	pub async fn get(&self, id: i64) -> Result<Option<Record>, StoreError> {
		self.store.get(&self.path, id).await
	}

	pub async fn create(&self, payload: &Payload) -> Result<Record, StoreError> {
		self.store.create(&self.path, payload).await
	}

	pub async fn update(&self, id: i64, changes: &Payload) -> Result<Record, StoreError> {
		self.store.update(&self.path, id, changes).await
	}

	pub async fn delete(&self, id: i64) -> Result<(), StoreError> {
		self.store.delete(&self.path, id).await
	}
}
