use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Connection settings for one NetBox instance.
///
/// Holds the API root, token, timeouts and the retry/backoff and circuit
/// breaker tuning used by [`super::NetBoxClient`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientConfig {
	/// Label used in log lines ("master", "slave")
	pub name: String,

	/// Base URL of the NetBox instance, without the `/api` suffix
	pub url: Url,

	/// API token sent as `Authorization: Token <token>`
	#[serde(default)]
	pub token: String,

	/// Records requested per page when listing
	#[serde(default = "default_page_size")]
	pub page_size: u32,

	/// Request timeout in milliseconds
	#[serde(default = "default_timeout_ms")]
	pub timeout_ms: u64,

	/// Maximum number of retry attempts
	#[serde(default = "default_max_retries")]
	pub max_retries: u32,

	/// Initial backoff delay in milliseconds
	#[serde(default = "default_initial_backoff_ms")]
	pub initial_backoff_ms: u64,

	/// Maximum backoff delay in milliseconds
	#[serde(default = "default_max_backoff_ms")]
	pub max_backoff_ms: u64,

	/// Circuit breaker: consecutive failures before opening circuit
	#[serde(default = "default_circuit_breaker_threshold")]
	pub circuit_breaker_threshold: u32,

	/// Circuit breaker: timeout before attempting to close circuit (in milliseconds)
	#[serde(default = "default_circuit_breaker_timeout_ms")]
	pub circuit_breaker_timeout_ms: u64,
}

impl ClientConfig {
	pub fn new(name: impl Into<String>, url: Url, token: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			url,
			token: token.into(),
			page_size: default_page_size(),
			timeout_ms: default_timeout_ms(),
			max_retries: default_max_retries(),
			initial_backoff_ms: default_initial_backoff_ms(),
			max_backoff_ms: default_max_backoff_ms(),
			circuit_breaker_threshold: default_circuit_breaker_threshold(),
			circuit_breaker_timeout_ms: default_circuit_breaker_timeout_ms(),
		}
	}

	/// Get the timeout as a Duration
	pub fn timeout(&self) -> Duration {
		Duration::from_millis(self.timeout_ms)
	}

	/// Get the initial backoff as a Duration
	pub fn initial_backoff(&self) -> Duration {
		Duration::from_millis(self.initial_backoff_ms)
	}

	/// Get the maximum backoff as a Duration
	pub fn max_backoff(&self) -> Duration {
		Duration::from_millis(self.max_backoff_ms)
	}

	/// Get the circuit breaker timeout as a Duration
	pub fn circuit_breaker_timeout(&self) -> Duration {
		Duration::from_millis(self.circuit_breaker_timeout_ms)
	}

	/// Absolute URL of a collection endpoint, e.g. `<base>/api/dcim/devices/`.
	pub fn endpoint(&self, segments: &[String]) -> String {
		let mut url = format!("{}/api", self.url.as_str().trim_end_matches('/'));
		for segment in segments {
			url.push('/');
			url.push_str(segment);
		}
		url.push('/');
		url
	}
}

// Default value functions for serde
pub fn default_page_size() -> u32 {
	1000
}

pub(crate) fn default_timeout_ms() -> u64 {
	30000
}

pub(crate) fn default_max_retries() -> u32 {
	3
}

pub(crate) fn default_initial_backoff_ms() -> u64 {
	200
}

pub(crate) fn default_max_backoff_ms() -> u64 {
	10000
}

pub(crate) fn default_circuit_breaker_threshold() -> u32 {
	5
}

pub(crate) fn default_circuit_breaker_timeout_ms() -> u64 {
	30000
}
