use async_trait::async_trait;

use crate::store::{Payload, Record, Store};

/// Connections available to hooks.
///
/// Hooks often need collections other than the one being synced (VLANs,
/// IP addresses, modules), on either side.
#[derive(Clone, Copy)]
pub struct HookContext<'a> {
	pub master: &'a dyn Store,
	pub slave: &'a dyn Store,
}

/// Per-entity-type customization points. Every method defaults to passing
/// its input through unchanged.
#[async_trait]
pub trait SyncHooks: Send + Sync {
	/// Adjust a create payload or an update change set before it is planned.
	/// Receives an empty map when the record is unchanged; returning a
	/// non-empty map turns the noop into an update.
	async fn pre_sync(
		&self,
		_ctx: &HookContext<'_>,
		_master: &Record,
		payload: Payload,
	) -> anyhow::Result<Payload> {
		Ok(payload)
	}

	/// Runs after every applied plan item (noops included) with the slave
	/// record that now represents `master`.
	async fn post_sync(
		&self,
		_ctx: &HookContext<'_>,
		_master: &Record,
		synced: Record,
	) -> anyhow::Result<Record> {
		Ok(synced)
	}

	/// Runs right after the slave record was created, before `post_sync`.
	async fn post_create(
		&self,
		_ctx: &HookContext<'_>,
		_master: &Record,
		created: Record,
	) -> anyhow::Result<Record> {
		Ok(created)
	}
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl SyncHooks for NoHooks {}
