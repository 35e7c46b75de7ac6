use std::path::Path;

use log::Level;
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use url::Url;

use crate::entities::EntityKind;
use crate::store::{ClientConfig, client_config, default_page_size};

/// Connection to one NetBox instance.
#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Default)]
#[serde(default)]
pub struct Endpoint {
	pub url: Option<Url>,
	pub token: Option<String>,
}

/// HTTP behavior shared by both clients.
#[derive(Debug, Deserialize, PartialEq, Eq, Clone)]
#[serde(default)]
pub struct HttpSettings {
	pub timeout_ms: u64,
	pub max_retries: u32,
	pub initial_backoff_ms: u64,
	pub max_backoff_ms: u64,
	pub circuit_breaker_threshold: u32,
	pub circuit_breaker_timeout_ms: u64,
	pub page_size: u32,
}

impl Default for HttpSettings {
	fn default() -> Self {
		Self {
			timeout_ms: client_config::default_timeout_ms(),
			max_retries: client_config::default_max_retries(),
			initial_backoff_ms: client_config::default_initial_backoff_ms(),
			max_backoff_ms: client_config::default_max_backoff_ms(),
			circuit_breaker_threshold: client_config::default_circuit_breaker_threshold(),
			circuit_breaker_timeout_ms: client_config::default_circuit_breaker_timeout_ms(),
			page_size: default_page_size(),
		}
	}
}

/// Runtime configuration for netbox-sync.
///
/// Values are loaded from (in order): the `/etc/vanopticon/netbox-sync.json`
/// file, the same file in the user config folder (optional), and
/// environment variables prefixed with `NBS_` (nested keys use `__`, e.g.
/// `NBS_MASTER__URL`). The flat forms `NBS_MASTER_URL`, `NBS_SLAVE_TOKEN`
/// and friends are read last and win. Command line flags are applied on
/// top by the binary.
#[derive(Debug, Deserialize, PartialEq, Eq, Clone)]
#[serde(default)]
pub struct Settings {
	pub master: Endpoint,
	pub slave: Endpoint,
	#[serde(deserialize_with = "deserialize_level")]
	pub log_level: Level,
	/// Tenant slug forced onto every synced record.
	pub tenant: Option<String>,
	/// Entity types to sync, in order.
	pub entities: Vec<EntityKind>,
	pub dry_run: bool,
	pub http: HttpSettings,
}

impl Default for Settings {
	fn default() -> Self {
		Self {
			master: Endpoint::default(),
			slave: Endpoint::default(),
			log_level: Level::Info,
			tenant: None,
			entities: EntityKind::default_selection(),
			dry_run: false,
			http: HttpSettings::default(),
		}
	}
}

// `log::Level` only accepts upper-case variant names through serde; files and
// the environment use any case.
fn deserialize_level<'de, D>(deserializer: D) -> Result<Level, D::Error>
where
	D: Deserializer<'de>,
{
	let raw = String::deserialize(deserializer)?;
	raw.parse::<Level>()
		.map_err(|_| serde::de::Error::custom(format!("invalid log level '{}'", raw)))
}

#[derive(Debug, Error)]
pub enum SettingsError {
	#[error("configuration error: {0}")]
	Config(#[from] config::ConfigError),
	#[error("missing setting '{0}'")]
	Missing(&'static str),
	#[error("invalid value for {key}: {value}")]
	Invalid { key: &'static str, value: String },
}

impl Settings {
	pub fn master_client(&self) -> Result<ClientConfig, SettingsError> {
		self.client_config("master", &self.master)
	}

	pub fn slave_client(&self) -> Result<ClientConfig, SettingsError> {
		self.client_config("slave", &self.slave)
	}

	fn client_config(&self, name: &'static str, endpoint: &Endpoint) -> Result<ClientConfig, SettingsError> {
		let (url_key, token_key) = match name {
			"master" => ("master.url", "master.token"),
			_ => ("slave.url", "slave.token"),
		};
		let url = endpoint.url.clone().ok_or(SettingsError::Missing(url_key))?;
		let token = endpoint
			.token
			.clone()
			.filter(|t| !t.is_empty())
			.ok_or(SettingsError::Missing(token_key))?;

		let mut client = ClientConfig::new(name, url, token);
		client.page_size = self.http.page_size;
		client.timeout_ms = self.http.timeout_ms;
		client.max_retries = self.http.max_retries;
		client.initial_backoff_ms = self.http.initial_backoff_ms;
		client.max_backoff_ms = self.http.max_backoff_ms;
		client.circuit_breaker_threshold = self.http.circuit_breaker_threshold;
		client.circuit_breaker_timeout_ms = self.http.circuit_breaker_timeout_ms;
		Ok(client)
	}
}

pub fn load() -> Result<Settings, SettingsError> {
	load_with_file(None)
}

/// Like [`load`], with `extra` layered after the standard config files.
pub fn load_with_file(extra: Option<&Path>) -> Result<Settings, SettingsError> {
	let mut builder = config::Config::builder()
		.add_source(config::File::with_name("/etc/vanopticon/netbox-sync.json").required(false));

	if let Some(folder) = dirs::config_dir() {
		let user_config_path = folder.join("vanopticon").join("netbox-sync.json");
		builder = builder.add_source(config::File::from(user_config_path).required(false));
	}
	if let Some(folder) = dirs::config_local_dir() {
		let local_config_path = folder.join("vanopticon").join("netbox-sync.json");
		builder = builder.add_source(config::File::from(local_config_path).required(false));
	}
	if let Some(path) = extra {
		builder = builder.add_source(config::File::from(path).required(true));
	}

	builder = builder.add_source(
		config::Environment::with_prefix("NBS")
			.prefix_separator("_")
			.separator("__")
			.try_parsing(true)
			.list_separator(",")
			.with_list_parse_key("entities"),
	);

	let cfg = builder.build()?;

	let mut s: Settings = cfg.try_deserialize()?;
	apply_env_overrides(&mut s)?;
	Ok(s)
}

fn non_empty_var(key: &str) -> Option<String> {
	std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn parse_url(key: &'static str, value: String) -> Result<Url, SettingsError> {
	Url::parse(&value).map_err(|_| SettingsError::Invalid { key, value })
}

// Flat variable names are read directly so they take effect however the
// `config` crate maps them.
fn apply_env_overrides(s: &mut Settings) -> Result<(), SettingsError> {
	if let Some(u) = non_empty_var("NBS_MASTER_URL") {
		s.master.url = Some(parse_url("NBS_MASTER_URL", u)?);
	}
	if let Some(t) = non_empty_var("NBS_MASTER_TOKEN") {
		s.master.token = Some(t);
	}
	if let Some(u) = non_empty_var("NBS_SLAVE_URL") {
		s.slave.url = Some(parse_url("NBS_SLAVE_URL", u)?);
	}
	if let Some(t) = non_empty_var("NBS_SLAVE_TOKEN") {
		s.slave.token = Some(t);
	}
	if let Some(t) = non_empty_var("NBS_TENANT") {
		s.tenant = Some(t);
	}
	if let Some(l) = non_empty_var("NBS_LOG_LEVEL") {
		s.log_level = l.parse::<Level>().map_err(|_| SettingsError::Invalid {
			key: "NBS_LOG_LEVEL",
			value: l.clone(),
		})?;
	}
	Ok(())
}
