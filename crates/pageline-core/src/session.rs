// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Session types for visitor session tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::context::AcquisitionContext;
use crate::device::DeviceProfile;

/// Unique identifier for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub Uuid);

impl SessionId {
	#[must_use]
	pub fn new() -> Self {
		Self(Uuid::now_v7())
	}

	#[must_use]
	pub fn as_uuid(&self) -> &Uuid {
		&self.0
	}
}

impl Default for SessionId {
	fn default() -> Self {
		Self::new()
	}
}

impl std::fmt::Display for SessionId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl std::str::FromStr for SessionId {
	type Err = crate::error::CoreError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Uuid::parse_str(s)
			.map(Self)
			.map_err(|_| crate::error::CoreError::InvalidSessionId(s.to_string()))
	}
}

/// A session row as inserted into the sessions table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
	pub session_id: SessionId,
	pub started_at: DateTime<Utc>,
	pub last_activity: DateTime<Utc>,
	pub page_count: u32,

	pub device_type: String,
	pub browser: String,
	pub os: String,

	/// Raw referrer URL as reported by the navigation context
	pub referrer: Option<String>,
	/// Referrer host without a leading `www.`
	pub referrer_domain: Option<String>,
	pub utm_source: Option<String>,
	pub utm_medium: Option<String>,
	pub utm_campaign: Option<String>,
	pub utm_term: Option<String>,
	pub utm_content: Option<String>,

	pub landing_page: String,
	pub duration_seconds: u64,
	/// Provisional until finalization: `page_count <= 1`
	pub is_bounce: bool,
	pub exit_page: Option<String>,
}

impl SessionRecord {
	/// Builds the row for a session that starts now on `landing_page`.
	///
	/// The session begins with `page_count = 0` and a provisional bounce flag;
	/// the first page view bumps the count.
	#[must_use]
	pub fn start(
		session_id: SessionId,
		now: DateTime<Utc>,
		landing_page: impl Into<String>,
		device: &DeviceProfile,
		acquisition: &AcquisitionContext,
	) -> Self {
		Self {
			session_id,
			started_at: now,
			last_activity: now,
			page_count: 0,
			device_type: device.device_type.to_string(),
			browser: device.browser.clone(),
			os: device.os.clone(),
			referrer: acquisition.referrer.clone(),
			referrer_domain: acquisition.referrer_domain.clone(),
			utm_source: acquisition.utm.source.clone(),
			utm_medium: acquisition.utm.medium.clone(),
			utm_campaign: acquisition.utm.campaign.clone(),
			utm_term: acquisition.utm.term.clone(),
			utm_content: acquisition.utm.content.clone(),
			landing_page: landing_page.into(),
			duration_seconds: 0,
			is_bounce: true,
			exit_page: None,
		}
	}

	/// Applies a partial update in place.
	pub fn apply(&mut self, patch: &SessionPatch) {
		if let Some(at) = patch.last_activity {
			self.last_activity = at;
		}
		if let Some(count) = patch.page_count {
			self.page_count = count;
		}
		if let Some(secs) = patch.duration_seconds {
			self.duration_seconds = secs;
		}
		if let Some(bounce) = patch.is_bounce {
			self.is_bounce = bounce;
		}
		if let Some(exit_page) = &patch.exit_page {
			self.exit_page = Some(exit_page.clone());
		}
	}
}

/// Partial update for a session row. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionPatch {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub last_activity: Option<DateTime<Utc>>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub page_count: Option<u32>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub duration_seconds: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub is_bounce: Option<bool>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub exit_page: Option<String>,
}

impl SessionPatch {
	/// Patch written when a session is superseded: the duration is measured to
	/// the last recorded activity, not to the moment the supersession happened.
	#[must_use]
	pub fn finalize(
		started_at: DateTime<Utc>,
		last_activity: DateTime<Utc>,
		page_count: u32,
	) -> Self {
		Self {
			last_activity: Some(last_activity),
			page_count: Some(page_count),
			duration_seconds: Some(elapsed_seconds(started_at, last_activity)),
			is_bounce: Some(is_bounce(page_count)),
			exit_page: None,
		}
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		*self == Self::default()
	}
}

/// A session with at most one page view is a bounce.
#[must_use]
pub fn is_bounce(page_count: u32) -> bool {
	page_count <= 1
}

/// Whole seconds from `from` to `to`, rounded to nearest and never negative.
#[must_use]
pub fn elapsed_seconds(from: DateTime<Utc>, to: DateTime<Utc>) -> u64 {
	let millis = (to - from).num_milliseconds();
	if millis <= 0 {
		return 0;
	}
	((millis + 500) / 1000) as u64
}
