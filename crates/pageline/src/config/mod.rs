// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Layered configuration for the tracker.
//!
//! Precedence (highest to lowest):
//! 1. Environment variables (`PAGELINE_*`)
//! 2. Config file (`~/.config/pageline/pageline.toml`, or an explicit path)
//! 3. Built-in defaults

mod error;
mod sources;

pub use error::ConfigError;
pub use sources::{ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource};

use std::path::PathBuf;
use std::time::Duration;

use pageline_core::DEFAULT_PATH_PREFIXES;
use serde::Deserialize;
use tracing::debug;

pub const DEFAULT_HEARTBEAT_SECS: u64 = 30;
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 30 * 60;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;
pub const DEFAULT_ERROR_REPORT_LIMIT: u32 = 20;

/// Public API key for the hosted backend. Redacted in debug output.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
	pub fn new(key: impl Into<String>) -> Self {
		Self(key.into())
	}

	pub fn expose(&self) -> &str {
		&self.0
	}
}

impl std::fmt::Debug for ApiKey {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str("ApiKey([REDACTED])")
	}
}

/// One configuration layer; every field is optional so layers can be merged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrackerConfigLayer {
	pub base_url: Option<String>,
	pub api_key: Option<String>,
	pub heartbeat_secs: Option<u64>,
	pub session_timeout_secs: Option<u64>,
	pub request_timeout_secs: Option<u64>,
	pub state_dir: Option<PathBuf>,
	pub queue_capacity: Option<usize>,
	pub ignore_bots: Option<bool>,
	pub path_prefixes: Option<Vec<String>>,
	pub error_report_limit: Option<u32>,
}

impl TrackerConfigLayer {
	/// Overlays `other` on top of `self`; set fields in `other` win.
	pub fn merge(&mut self, other: TrackerConfigLayer) {
		macro_rules! overlay {
			($($field:ident),*) => {
				$(if other.$field.is_some() {
					self.$field = other.$field;
				})*
			};
		}
		overlay!(
			base_url,
			api_key,
			heartbeat_secs,
			session_timeout_secs,
			request_timeout_secs,
			state_dir,
			queue_capacity,
			ignore_bots,
			path_prefixes,
			error_report_limit
		);
	}

	/// Applies defaults and validates.
	pub fn finalize(self) -> Result<TrackerConfig, ConfigError> {
		let base_url = match self.base_url {
			Some(url) => {
				let trimmed = url.trim().trim_end_matches('/').to_string();
				if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
					return Err(ConfigError::invalid_value(
						"base_url",
						format!("'{url}' is not an http(s) URL"),
					));
				}
				Some(trimmed)
			}
			None => None,
		};

		let heartbeat_secs = self.heartbeat_secs.unwrap_or(DEFAULT_HEARTBEAT_SECS);
		if heartbeat_secs == 0 {
			return Err(ConfigError::invalid_value(
				"heartbeat_secs",
				"must be greater than zero",
			));
		}

		let session_timeout_secs = self
			.session_timeout_secs
			.unwrap_or(DEFAULT_SESSION_TIMEOUT_SECS);
		if session_timeout_secs == 0 {
			return Err(ConfigError::invalid_value(
				"session_timeout_secs",
				"must be greater than zero",
			));
		}

		let queue_capacity = self.queue_capacity.unwrap_or(DEFAULT_QUEUE_CAPACITY);
		if queue_capacity == 0 {
			return Err(ConfigError::invalid_value(
				"queue_capacity",
				"must be greater than zero",
			));
		}

		Ok(TrackerConfig {
			base_url,
			api_key: self.api_key.filter(|k| !k.is_empty()).map(ApiKey::new),
			heartbeat_interval: Duration::from_secs(heartbeat_secs),
			session_timeout: Duration::from_secs(session_timeout_secs),
			request_timeout: Duration::from_secs(
				self.request_timeout_secs.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
			),
			state_dir: self.state_dir,
			queue_capacity,
			ignore_bots: self.ignore_bots.unwrap_or(true),
			path_prefixes: self.path_prefixes.unwrap_or_else(default_path_prefixes),
			error_report_limit: self
				.error_report_limit
				.unwrap_or(DEFAULT_ERROR_REPORT_LIMIT),
		})
	}
}

/// Fully resolved tracker configuration.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
	/// Backend base URL, without a trailing slash
	pub base_url: Option<String>,
	pub api_key: Option<ApiKey>,
	pub heartbeat_interval: Duration,
	/// Idle time after which the next navigation starts a new session
	pub session_timeout: Duration,
	pub request_timeout: Duration,
	/// Where the session slot and exit spool live; in-memory when unset
	pub state_dir: Option<PathBuf>,
	pub queue_capacity: usize,
	pub ignore_bots: bool,
	pub path_prefixes: Vec<String>,
	/// Maximum error reports recorded per session
	pub error_report_limit: u32,
}

impl Default for TrackerConfig {
	fn default() -> Self {
		Self {
			base_url: None,
			api_key: None,
			heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_SECS),
			session_timeout: Duration::from_secs(DEFAULT_SESSION_TIMEOUT_SECS),
			request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
			state_dir: None,
			queue_capacity: DEFAULT_QUEUE_CAPACITY,
			ignore_bots: true,
			path_prefixes: default_path_prefixes(),
			error_report_limit: DEFAULT_ERROR_REPORT_LIMIT,
		}
	}
}

fn default_path_prefixes() -> Vec<String> {
	DEFAULT_PATH_PREFIXES.iter().map(|p| p.to_string()).collect()
}

/// Load configuration from all sources with standard precedence.
pub fn load_config() -> Result<TrackerConfig, ConfigError> {
	let mut sources: Vec<Box<dyn ConfigSource>> = vec![Box::new(DefaultsSource)];
	if let Some(toml) = TomlSource::user() {
		sources.push(Box::new(toml));
	}
	sources.push(Box::new(EnvSource));
	load_from_sources(sources)
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(
	config_path: impl Into<PathBuf>,
) -> Result<TrackerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

fn load_from_sources(
	mut sources: Vec<Box<dyn ConfigSource>>,
) -> Result<TrackerConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = TrackerConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		merged.merge(source.load()?);
	}

	merged.finalize()
}
