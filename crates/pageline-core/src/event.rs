// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Ad-hoc event rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::session::SessionId;

const MAX_EVENT_NAME_LENGTH: usize = 200;

/// A named event tied to a session, such as a sponsor click or a captured
/// error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
	pub session_id: SessionId,
	pub name: String,
	pub category: Option<String>,
	/// Free-form key/value payload
	#[serde(default)]
	pub data: serde_json::Value,
	pub path: Option<String>,
	pub timestamp: DateTime<Utc>,
}

impl EventRecord {
	pub fn new(session_id: SessionId, name: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
		Self {
			session_id,
			name: name.into(),
			category: None,
			data: serde_json::Value::Object(serde_json::Map::new()),
			path: None,
			timestamp,
		}
	}

	/// Rejects names the events table would not index sensibly.
	pub fn validate_name(name: &str) -> Result<()> {
		let valid = !name.is_empty()
			&& name.len() <= MAX_EVENT_NAME_LENGTH
			&& name
				.chars()
				.all(|c| c.is_alphanumeric() || c == '_' || c == '$' || c == '.' || c == '-');
		if valid {
			Ok(())
		} else {
			Err(CoreError::InvalidEventName(name.to_string()))
		}
	}
}
