//! Master → slave reconciliation engine.
//!
//! One run per entity type: list both collections, index the slave records
//! by identity key, plan a create/update/noop per master record, then apply
//! the plan. Failures are contained per record and collected into a
//! [`RunResult`]; a bad record never aborts the run.

pub mod diff;
pub mod engine;
pub mod execute;
pub mod hooks;
pub mod identity;
pub mod normalize;
pub mod plan;
pub mod result;
pub mod spec;

use serde_json::Value;
use thiserror::Error;

use crate::store::{Record, StoreError};

pub use diff::diff;
pub use engine::Reconciler;
pub use execute::{apply, execute_plan};
pub use hooks::{HookContext, NoHooks, SyncHooks};
pub use identity::{IdentityKey, KeyPart, SlaveIndex, build_index, build_key};
pub use normalize::{LookupRules, NormalizeError, NormalizedValue};
pub use plan::{Action, PlanItem, build_plan, create_payload};
pub use result::{RunError, RunResult, RunStats, Stage};
pub use spec::{EntitySpec, SpecError};

/// Errors raised while planning or applying a single record.
#[derive(Debug, Error)]
pub enum SyncError {
	#[error(transparent)]
	Normalize(#[from] NormalizeError),

	#[error(transparent)]
	Store(#[from] StoreError),

	#[error("record {record} has no field '{field}'")]
	MissingField { record: String, field: String },

	#[error("{hook} hook failed: {source:#}")]
	Hook {
		hook: &'static str,
		source: anyhow::Error,
	},
}

impl SyncError {
	pub(crate) fn hook(hook: &'static str) -> impl FnOnce(anyhow::Error) -> SyncError {
		move |source| SyncError::Hook { hook, source }
	}
}

/// Field lookup that treats an absent field as an error.
pub(crate) fn require_field<'r>(record: &'r Record, field: &str) -> Result<&'r Value, SyncError> {
	record.get(field).ok_or_else(|| SyncError::MissingField {
		record: record.display(),
		field: field.to_string(),
	})
}
