// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Error types for the telemetry core.

use thiserror::Error;

/// Errors that can occur when building or parsing core telemetry types.
#[derive(Debug, Error)]
pub enum CoreError {
	/// Session ID string was not a UUID
	#[error("invalid session ID: {0}")]
	InvalidSessionId(String),

	/// Event name empty, too long, or containing unsupported characters
	#[error("invalid event name: {0}")]
	InvalidEventName(String),

	/// Invalid device type string
	#[error("invalid device type: {0}")]
	InvalidDeviceType(String),

	/// Serialization error
	#[error("serialization error: {0}")]
	Serialization(#[from] serde_json::Error),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
