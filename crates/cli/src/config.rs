//! Bridge configuration: flags over config file over defaults.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use capsule::OrchestratorConfig;
use capsule_protocol::ChannelLayout;
use capsule_runtime::{Endpoint, LinkConfig};
use serde::{Deserialize, Serialize};

use crate::cli::RunArgs;
use crate::error::{BridgeError, Result};

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5004;
pub const DEFAULT_RETRY_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_ENDPOINT: &str = "inproc://capsule";
pub const DEFAULT_CLIENT_NAME: &str = "CapsuleClientExample";
pub const DEFAULT_SEARCH_SECS: u64 = 15;
pub const DEFAULT_SETTLE_MS: u64 = 2000;
pub const DEFAULT_WATCHDOG_SECS: u64 = 100;
pub const DEFAULT_POLL_MS: u64 = 50;

/// Contents of a `--config` file. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConfigFile {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub license_key: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub bipolar: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub write_csv: Option<bool>,
	#[serde(default)]
	pub telemetry: TelemetryFile,
	#[serde(default)]
	pub session: SessionFile,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TelemetryFile {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub host: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub port: Option<u16>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub retry_interval_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SessionFile {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub endpoint: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub client_name: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub search_secs: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub settle_ms: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub watchdog_secs: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub poll_ms: Option<u64>,
}

impl ConfigFile {
	pub fn load(path: &Path) -> anyhow::Result<Self> {
		let text = std::fs::read_to_string(path).with_context(|| format!("failed to read config file {}", path.display()))?;
		serde_json::from_str(&text).with_context(|| format!("failed to parse config file {}", path.display()))
	}
}

/// Values taken from the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
	pub license_key: Option<String>,
	pub bipolar: Option<bool>,
	pub write_csv: Option<bool>,
	pub host: Option<String>,
	pub port: Option<u16>,
}

impl From<&RunArgs> for ConfigOverrides {
	fn from(args: &RunArgs) -> Self {
		Self {
			license_key: args.key.clone(),
			bipolar: args.bipolar.then_some(true),
			write_csv: args.csv.then_some(true),
			host: args.host.clone(),
			port: args.port,
		}
	}
}

/// Fully resolved bridge configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfig {
	pub license_key: String,
	pub bipolar: bool,
	pub write_csv: bool,
	pub host: String,
	pub port: u16,
	pub retry_interval_secs: u64,
	pub endpoint: String,
	pub client_name: String,
	pub search_secs: u64,
	pub settle_ms: u64,
	pub watchdog_secs: u64,
	pub poll_ms: u64,
}

impl Default for BridgeConfig {
	fn default() -> Self {
		Self::resolve(ConfigFile::default(), &ConfigOverrides::default())
	}
}

impl BridgeConfig {
	/// Loads `path` if given and applies `overrides` on top.
	pub fn load(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
		let file = match path {
			Some(path) => ConfigFile::load(path)?,
			None => ConfigFile::default(),
		};
		let config = Self::resolve(file, overrides);
		config.validate()?;
		Ok(config)
	}

	pub fn resolve(file: ConfigFile, overrides: &ConfigOverrides) -> Self {
		let telemetry = file.telemetry;
		let session = file.session;
		Self {
			license_key: overrides.license_key.clone().or(file.license_key).unwrap_or_default(),
			bipolar: overrides.bipolar.or(file.bipolar).unwrap_or(false),
			write_csv: overrides.write_csv.or(file.write_csv).unwrap_or(false),
			host: overrides.host.clone().or(telemetry.host).unwrap_or_else(|| DEFAULT_HOST.to_string()),
			port: overrides.port.or(telemetry.port).unwrap_or(DEFAULT_PORT),
			retry_interval_secs: telemetry.retry_interval_secs.unwrap_or(DEFAULT_RETRY_INTERVAL_SECS),
			endpoint: session.endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
			client_name: session.client_name.unwrap_or_else(|| DEFAULT_CLIENT_NAME.to_string()),
			search_secs: session.search_secs.unwrap_or(DEFAULT_SEARCH_SECS),
			settle_ms: session.settle_ms.unwrap_or(DEFAULT_SETTLE_MS),
			watchdog_secs: session.watchdog_secs.unwrap_or(DEFAULT_WATCHDOG_SECS),
			poll_ms: session.poll_ms.unwrap_or(DEFAULT_POLL_MS),
		}
	}

	fn validate(&self) -> Result<()> {
		if self.host.trim().is_empty() {
			return Err(BridgeError::Config("telemetry host is empty".into()));
		}
		if self.poll_ms == 0 {
			return Err(BridgeError::Config("session.pollMs must be at least 1".into()));
		}
		if self.retry_interval_secs == 0 {
			return Err(BridgeError::Config("telemetry.retryIntervalSecs must be at least 1".into()));
		}
		Ok(())
	}

	pub fn layout(&self) -> ChannelLayout {
		if self.bipolar { ChannelLayout::Bipolar } else { ChannelLayout::Monopolar }
	}

	pub fn link_config(&self) -> LinkConfig {
		LinkConfig {
			endpoint: Endpoint::new(self.host.clone(), self.port),
			retry_interval: Duration::from_secs(self.retry_interval_secs),
		}
	}

	pub fn orchestrator_config(&self) -> OrchestratorConfig {
		OrchestratorConfig {
			client_name: self.client_name.clone(),
			endpoint: self.endpoint.clone(),
			license_key: self.license_key.clone(),
			layout: self.layout(),
			search_window: Duration::from_secs(self.search_secs),
			poll_interval: Duration::from_millis(self.poll_ms),
			settle_delay: Duration::from_millis(self.settle_ms),
			watchdog: Duration::from_secs(self.watchdog_secs),
			..OrchestratorConfig::default()
		}
	}
}
