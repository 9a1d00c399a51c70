// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: defaults, TOML files and environment variables.

use std::path::PathBuf;

use tracing::{debug, trace};

use super::error::ConfigError;
use super::TrackerConfigLayer;

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<TrackerConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<TrackerConfigLayer, ConfigError> {
		Ok(TrackerConfigLayer::default())
	}
}

/// TOML file configuration source. A missing file is an empty layer.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	/// `$XDG_CONFIG_HOME/pageline/pageline.toml`, if a config dir exists.
	pub fn user() -> Option<Self> {
		dirs::config_dir().map(|dir| Self::new(dir.join("pageline").join("pageline.toml")))
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<TrackerConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(TrackerConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: TrackerConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: `PAGELINE_<FIELD>`
pub struct EnvSource;

impl EnvSource {
	/// Builds a layer from an arbitrary variable lookup.
	pub fn load_from<F>(lookup: F) -> Result<TrackerConfigLayer, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let var = |name: &str| lookup(name).filter(|s| !s.trim().is_empty());

		Ok(TrackerConfigLayer {
			base_url: var("PAGELINE_BASE_URL"),
			api_key: var("PAGELINE_API_KEY"),
			heartbeat_secs: parse_u64(&var, "PAGELINE_HEARTBEAT_SECS")?,
			session_timeout_secs: parse_u64(&var, "PAGELINE_SESSION_TIMEOUT_SECS")?,
			request_timeout_secs: parse_u64(&var, "PAGELINE_REQUEST_TIMEOUT_SECS")?,
			state_dir: var("PAGELINE_STATE_DIR").map(PathBuf::from),
			queue_capacity: parse_u64(&var, "PAGELINE_QUEUE_CAPACITY")?.map(|v| v as usize),
			ignore_bots: var("PAGELINE_IGNORE_BOTS")
				.map(|v| v.eq_ignore_ascii_case("true") || v == "1"),
			path_prefixes: var("PAGELINE_PATH_PREFIXES").map(|v| {
				v.split(',')
					.map(str::trim)
					.filter(|s| !s.is_empty())
					.map(str::to_string)
					.collect()
			}),
			error_report_limit: parse_u64(&var, "PAGELINE_ERROR_REPORT_LIMIT")?.map(|v| v as u32),
		})
	}
}

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<TrackerConfigLayer, ConfigError> {
		debug!("loading environment variables");
		Self::load_from(|name| std::env::var(name).ok())
	}
}

fn parse_u64<F>(var: &F, name: &str) -> Result<Option<u64>, ConfigError>
where
	F: Fn(&str) -> Option<String>,
{
	match var(name) {
		Some(v) => v
			.trim()
			.parse()
			.map(Some)
			.map_err(|_| ConfigError::invalid_value(name, format!("invalid integer '{v}'"))),
		None => Ok(None),
	}
}
