use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{debug, warn};
use rand::Rng;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Method, StatusCode};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::sleep;

use super::client_config::ClientConfig;
use super::{CollectionPath, Payload, Record, Store, StoreError};

/// Circuit breaker state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CircuitState {
	Closed,
	Open { opened_at: Instant },
	HalfOpen,
}

/// Circuit breaker implementation.
struct CircuitBreaker {
	state: CircuitState,
	failure_count: u32,
	threshold: u32,
	timeout: Duration,
}

impl CircuitBreaker {
	fn new(threshold: u32, timeout: Duration) -> Self {
		Self {
			state: CircuitState::Closed,
			failure_count: 0,
			threshold,
			timeout,
		}
	}

	fn record_success(&mut self) {
		match self.state {
			CircuitState::HalfOpen => {
				debug!("Circuit breaker transitioning to Closed after success");
				self.state = CircuitState::Closed;
				self.failure_count = 0;
			}
			CircuitState::Closed => {
				self.failure_count = 0;
			}
			CircuitState::Open { .. } => {}
		}
	}

	fn record_failure(&mut self) {
		self.failure_count += 1;

		match self.state {
			CircuitState::Closed => {
				if self.failure_count >= self.threshold {
					warn!(
						"Circuit breaker opening after {} failures",
						self.failure_count
					);
					self.state = CircuitState::Open {
						opened_at: Instant::now(),
					};
				}
			}
			CircuitState::HalfOpen => {
				warn!("Circuit breaker reopening after failure in half-open state");
				self.state = CircuitState::Open {
					opened_at: Instant::now(),
				};
			}
			CircuitState::Open { .. } => {}
		}
	}

	fn can_attempt(&mut self) -> bool {
		match self.state {
			CircuitState::Closed => true,
			CircuitState::HalfOpen => true,
			CircuitState::Open { opened_at } => {
				if Instant::now().duration_since(opened_at) >= self.timeout {
					debug!("Circuit breaker transitioning to HalfOpen after timeout");
					self.state = CircuitState::HalfOpen;
					true
				} else {
					false
				}
			}
		}
	}

	fn is_open(&self) -> bool {
		matches!(self.state, CircuitState::Open { .. })
	}
}

/// NetBox REST API client with retry/backoff and a circuit breaker.
///
/// Collections map to `<url>/api/<segment>/.../`. Listing follows the
/// `next` links of NetBox's paginated responses so callers always get a
/// fully materialized collection.
pub struct NetBoxClient {
	config: ClientConfig,
	http: reqwest::Client,
	circuit_breaker: Arc<Mutex<CircuitBreaker>>,
}

impl NetBoxClient {
	pub fn config(&self) -> &ClientConfig {
		&self.config
	}

	/// Whether the circuit breaker currently rejects requests.
	pub async fn circuit_open(&self) -> bool {
		self.circuit_breaker.lock().await.is_open()
	}

	fn record_url(&self, path: &CollectionPath, id: i64) -> String {
		format!("{}{}/", self.config.endpoint(path.segments()), id)
	}

	/// GET every page of a collection listing.
	async fn fetch_all(
		&self,
		path: &CollectionPath,
		query: &[(&str, String)],
	) -> Result<Vec<Record>, StoreError> {
		let mut url = self.config.endpoint(path.segments());
		let mut query: Vec<(&str, String)> = query.to_vec();
		query.push(("limit", self.config.page_size.to_string()));

		let mut records = Vec::new();
		loop {
			let page = self
				.execute_with_retry(Method::GET, &url, &query, None)
				.await?;
			let results = page
				.get("results")
				.and_then(Value::as_array)
				.ok_or_else(|| StoreError::Decode(format!("{} returned no results array", url)))?;
			records.extend(results.iter().cloned().map(Record::from_value));

			match page.get("next").and_then(Value::as_str) {
				Some(next) => {
					// `next` already carries the query string
					url = next.to_string();
					query.clear();
				}
				None => break,
			}
		}

		debug!(
			"Fetched {} record(s) from {} {}",
			records.len(),
			self.config.name,
			path
		);
		Ok(records)
	}

	/// Execute a request with retry logic and backoff.
	async fn execute_with_retry(
		&self,
		method: Method,
		url: &str,
		query: &[(&str, String)],
		body: Option<&Value>,
	) -> Result<Value, StoreError> {
		let mut attempts = 0;
		let mut backoff = self.config.initial_backoff();

		loop {
			{
				let mut cb = self.circuit_breaker.lock().await;
				if !cb.can_attempt() {
					return Err(StoreError::CircuitBreakerOpen);
				}
			}

			match self.execute_once(&method, url, query, body).await {
				Ok(response) => {
					let mut cb = self.circuit_breaker.lock().await;
					cb.record_success();
					return Ok(response);
				}
				Err(e) => {
					// Rejections (validation, not found) say nothing about the
					// health of the instance and never trip the breaker.
					if !e.is_transient() {
						return Err(e);
					}

					attempts += 1;
					if attempts > self.config.max_retries || !may_repeat(&method, &e) {
						let mut cb = self.circuit_breaker.lock().await;
						cb.record_failure();
						return Err(e);
					}

					warn!(
						"{} {} failed (attempt {}/{}): {}, retrying after {:?}",
						method, url, attempts, self.config.max_retries, e, backoff
					);

					sleep(backoff).await;
					backoff = next_backoff(backoff, self.config.max_backoff());
				}
			}
		}
	}

	/// Execute a single HTTP request without retry logic.
	async fn execute_once(
		&self,
		method: &Method,
		url: &str,
		query: &[(&str, String)],
		body: Option<&Value>,
	) -> Result<Value, StoreError> {
		let mut req = self
			.http
			.request(method.clone(), url)
			.header(ACCEPT, "application/json");
		if !self.config.token.is_empty() {
			req = req.header(AUTHORIZATION, format!("Token {}", self.config.token));
		}
		if !query.is_empty() {
			req = req.query(query);
		}
		if let Some(b) = body {
			req = req.json(b);
		}

		let response = req.send().await.map_err(|e| {
			if e.is_timeout() {
				StoreError::Timeout
			} else if e.is_connect() {
				StoreError::Connect(e.to_string())
			} else {
				StoreError::Http(e.to_string())
			}
		})?;

		let status = response.status();
		if !status.is_success() {
			let body = response.text().await.unwrap_or_default();
			return Err(StoreError::Status {
				method: method.to_string(),
				url: url.to_string(),
				status: status.as_u16(),
				body,
			});
		}
		if status == StatusCode::NO_CONTENT {
			return Ok(Value::Null);
		}

		let bytes = response
			.bytes()
			.await
			.map_err(|e| StoreError::Http(e.to_string()))?;
		if bytes.is_empty() {
			return Ok(Value::Null);
		}
		serde_json::from_slice(&bytes).map_err(|e| StoreError::Decode(format!("{}: {}", url, e)))
	}
}

/// Whether a transient failure of `method` can be sent again.
///
/// POST is not idempotent: once the request may have reached NetBox a
/// repeat can create a second object, so only connection failures retry.
fn may_repeat(method: &Method, error: &StoreError) -> bool {
	*method != Method::POST || matches!(error, StoreError::Connect(_))
}

/// Exponential backoff with up to 25% jitter, capped at `max`.
fn next_backoff(current: Duration, max: Duration) -> Duration {
	let doubled = (current * 2).min(max);
	let max_jitter = doubled.as_millis() as u64 / 4;
	let jitter_ms = rand::thread_rng().gen_range(0..=max_jitter);
	doubled.saturating_add(Duration::from_millis(jitter_ms))
}

fn expect_record(value: Value, url: &str) -> Result<Record, StoreError> {
	match value {
		Value::Object(map) => Ok(Record::new(map)),
		other => Err(StoreError::Decode(format!(
			"{} returned {} instead of an object",
			url, other
		))),
	}
}

#[async_trait]
impl Store for NetBoxClient {
	fn name(&self) -> &str {
		&self.config.name
	}

	async fn list(&self, path: &CollectionPath) -> Result<Vec<Record>, StoreError> {
		self.fetch_all(path, &[]).await
	}

	async fn filter(
		&self,
		path: &CollectionPath,
		query: &[(&str, String)],
	) -> Result<Vec<Record>, StoreError> {
		self.fetch_all(path, query).await
	}

	async fn get(&self, path: &CollectionPath, id: i64) -> Result<Option<Record>, StoreError> {
		let url = self.record_url(path, id);
		match self.execute_with_retry(Method::GET, &url, &[], None).await {
			Ok(value) => expect_record(value, &url).map(Some),
			Err(StoreError::Status { status: 404, .. }) => Ok(None),
			Err(e) => Err(e),
		}
	}

	async fn create(&self, path: &CollectionPath, payload: &Payload) -> Result<Record, StoreError> {
		let url = self.config.endpoint(path.segments());
		let body = Value::Object(payload.clone());
		let value = self
			.execute_with_retry(Method::POST, &url, &[], Some(&body))
			.await?;
		expect_record(value, &url)
	}

	async fn update(
		&self,
		path: &CollectionPath,
		id: i64,
		changes: &Payload,
	) -> Result<Record, StoreError> {
		let url = self.record_url(path, id);
		let body = Value::Object(changes.clone());
		let value = self
			.execute_with_retry(Method::PATCH, &url, &[], Some(&body))
			.await?;
		expect_record(value, &url)
	}

	async fn delete(&self, path: &CollectionPath, id: i64) -> Result<(), StoreError> {
		let url = self.record_url(path, id);
		self.execute_with_retry(Method::DELETE, &url, &[], None)
			.await?;
		Ok(())
	}
}

/// Builder for NetBoxClient.
pub struct NetBoxClientBuilder {
	config: ClientConfig,
}

impl NetBoxClientBuilder {
	/// Create a new builder with the given connection configuration.
	pub fn new(config: ClientConfig) -> Self {
		Self { config }
	}

	/// Build the NetBoxClient.
	pub fn build(self) -> Result<NetBoxClient, StoreError> {
		let http = reqwest::Client::builder()
			.timeout(self.config.timeout())
			.build()
			.map_err(|e| StoreError::InvalidRequest(e.to_string()))?;

		let circuit_breaker = Arc::new(Mutex::new(CircuitBreaker::new(
			self.config.circuit_breaker_threshold,
			self.config.circuit_breaker_timeout(),
		)));

		Ok(NetBoxClient {
			config: self.config,
			http,
			circuit_breaker,
		})
	}
}
