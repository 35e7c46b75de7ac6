use std::fmt;

use log::{info, warn};
use serde::Serialize;

use super::plan::Action;

/// Pipeline stage an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
	/// Listing a collection failed; nothing was planned.
	Fetch,
	/// A slave record could not be keyed and is invisible to matching.
	Index,
	Plan,
	Apply,
}

impl fmt::Display for Stage {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let s = match self {
			Stage::Fetch => "fetch",
			Stage::Index => "index",
			Stage::Plan => "plan",
			Stage::Apply => "apply",
		};
		f.write_str(s)
	}
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunError {
	/// Display label of the record (or collection) that failed.
	pub identifier: String,
	pub message: String,
	pub stage: Stage,
}

/// Per-outcome counters for one run.
///
/// Every master record lands in exactly one counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
	pub created: usize,
	pub updated: usize,
	pub unchanged: usize,
	/// Master records that failed to plan or apply.
	pub failed: usize,
}

impl RunStats {
	pub(crate) fn count(&mut self, action: Action) {
		match action {
			Action::Create => self.created += 1,
			Action::Update => self.updated += 1,
			Action::Noop => self.unchanged += 1,
		}
	}
}

/// Outcome of reconciling one entity type.
///
/// Errors accumulate in order across every stage and are never reset
/// mid-run. An empty error list means the run was clean.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
	pub entity: String,
	pub dry_run: bool,
	errors: Vec<RunError>,
	stats: RunStats,
}

impl RunResult {
	pub fn new(entity: impl Into<String>, dry_run: bool) -> Self {
		Self {
			entity: entity.into(),
			dry_run,
			errors: Vec::new(),
			stats: RunStats::default(),
		}
	}

	pub fn record_error(&mut self, stage: Stage, identifier: impl Into<String>, error: impl fmt::Display) {
		self.errors.push(RunError {
			identifier: identifier.into(),
			message: error.to_string(),
			stage,
		});
		if matches!(stage, Stage::Plan | Stage::Apply) {
			self.stats.failed += 1;
		}
	}

	pub(crate) fn stats_mut(&mut self) -> &mut RunStats {
		&mut self.stats
	}

	pub fn errors(&self) -> &[RunError] {
		&self.errors
	}

	pub fn stats(&self) -> RunStats {
		self.stats
	}

	pub fn is_clean(&self) -> bool {
		self.errors.is_empty()
	}

	pub fn summary(&self) -> String {
		let mode = if self.dry_run { " (dry run)" } else { "" };
		let counts = format!(
			"{} created, {} updated, {} unchanged",
			self.stats.created, self.stats.updated, self.stats.unchanged
		);
		if self.is_clean() {
			format!("Synchronization of {} completed{}: {}", self.entity, mode, counts)
		} else {
			format!(
				"Synchronization of {} completed with {} error(s){}: {}",
				self.entity,
				self.errors.len(),
				mode,
				counts
			)
		}
	}

	pub fn log_summary(&self) {
		if self.is_clean() {
			info!("{}", self.summary());
		} else {
			warn!("{}", self.summary());
			for e in &self.errors {
				warn!("  [{}] {}: {}", e.stage, e.identifier, e.message);
			}
		}
	}
}
