// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the telemetry collector.
//!
//! These errors surface from construction and from the backend layer. The
//! tracking operations themselves (`on_navigate`, `on_scroll`, ...) never
//! return them: failures are logged and dropped so the host application is
//! never affected.

use thiserror::Error;

use crate::config::ConfigError;

/// Telemetry collector errors.
#[derive(Debug, Error)]
pub enum TelemetryError {
	/// API key is missing or empty.
	#[error("invalid API key: a public API key is required")]
	InvalidApiKey,

	/// Base URL is missing or invalid.
	#[error("invalid base URL")]
	InvalidBaseUrl,

	/// HTTP request failed.
	#[error("HTTP request failed: {0}")]
	RequestFailed(#[from] reqwest::Error),

	/// Backend returned an error response.
	#[error("server error ({status}): {message}")]
	ServerError { status: u16, message: String },

	/// Rate limited by the backend.
	#[error("rate limited, retry after {retry_after_secs:?} seconds")]
	RateLimited { retry_after_secs: Option<u64> },

	/// Page view insert returned no id.
	#[error("backend did not return an id for the inserted page view")]
	UnresolvedPageView,

	/// The tracker spawns background tasks and must be built on a tokio runtime.
	#[error("no tokio runtime available to run the tracker")]
	NoRuntime,

	/// Blocking delivery thread failed to run to completion.
	#[error("blocking delivery failed: {0}")]
	BlockingDelivery(String),

	/// Local state or exit spool I/O failed.
	#[error("storage error: {0}")]
	Storage(#[from] std::io::Error),

	/// Serialization error.
	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),

	/// Configuration could not be loaded.
	#[error(transparent)]
	Config(#[from] ConfigError),
}

impl TelemetryError {
	/// Whether the backend might accept the same write later.
	///
	/// Normal writes are never retried; this only informs what the exit spool
	/// keeps for replay.
	pub fn is_transient(&self) -> bool {
		match self {
			TelemetryError::RequestFailed(e) => e.is_timeout() || e.is_connect(),
			TelemetryError::ServerError { status, .. } => {
				matches!(*status, 429 | 408 | 500 | 502 | 503 | 504)
			}
			TelemetryError::RateLimited { .. } => true,
			TelemetryError::BlockingDelivery(_) => true,
			_ => false,
		}
	}
}

/// Result type alias for telemetry operations.
pub type Result<T> = std::result::Result<T, TelemetryError>;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_server_error_transient_statuses() {
		for status in [429, 408, 500, 502, 503, 504] {
			let err = TelemetryError::ServerError {
				status,
				message: "test".to_string(),
			};
			assert!(err.is_transient(), "status {status} should be transient");
		}
	}

	#[test]
	fn test_server_error_permanent_statuses() {
		for status in [400, 401, 403, 404, 409, 422] {
			let err = TelemetryError::ServerError {
				status,
				message: "test".to_string(),
			};
			assert!(!err.is_transient(), "status {status} should not be transient");
		}
	}

	#[test]
	fn test_rate_limited_is_transient() {
		let err = TelemetryError::RateLimited {
			retry_after_secs: Some(30),
		};
		assert!(err.is_transient());
	}

	#[test]
	fn test_configuration_errors_are_permanent() {
		assert!(!TelemetryError::InvalidApiKey.is_transient());
		assert!(!TelemetryError::InvalidBaseUrl.is_transient());
		assert!(!TelemetryError::NoRuntime.is_transient());
	}
}
