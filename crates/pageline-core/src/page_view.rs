// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Page view types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::session::SessionId;

/// Identifier assigned to a page view row by the persistence layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PageViewId(pub i64);

impl std::fmt::Display for PageViewId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Locally generated handle for a page view whose backend id may not be known
/// yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViewKey(pub Uuid);

impl ViewKey {
	#[must_use]
	pub fn new() -> Self {
		Self(Uuid::new_v4())
	}
}

impl Default for ViewKey {
	fn default() -> Self {
		Self::new()
	}
}

impl std::fmt::Display for ViewKey {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// A page view row as inserted into the page views table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageViewRecord {
	pub session_id: SessionId,
	pub path: String,
	pub title: Option<String>,
	/// Previous path visited in the same session
	pub referrer_path: Option<String>,
	pub time_on_page_seconds: u64,
	/// Running maximum, 0-100
	pub scroll_depth_percent: u8,
	pub is_exit: bool,
	pub viewed_at: DateTime<Utc>,
}

impl PageViewRecord {
	#[must_use]
	pub fn open(
		session_id: SessionId,
		path: impl Into<String>,
		title: Option<String>,
		referrer_path: Option<String>,
		viewed_at: DateTime<Utc>,
	) -> Self {
		Self {
			session_id,
			path: path.into(),
			title,
			referrer_path,
			time_on_page_seconds: 0,
			scroll_depth_percent: 0,
			is_exit: false,
			viewed_at,
		}
	}

	/// Applies a partial update in place.
	pub fn apply(&mut self, patch: &PageViewPatch) {
		if let Some(secs) = patch.time_on_page_seconds {
			self.time_on_page_seconds = secs;
		}
		if let Some(depth) = patch.scroll_depth_percent {
			self.scroll_depth_percent = depth;
		}
		if let Some(is_exit) = patch.is_exit {
			self.is_exit = is_exit;
		}
	}
}

/// Partial update for a page view row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageViewPatch {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub time_on_page_seconds: Option<u64>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub scroll_depth_percent: Option<u8>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub is_exit: Option<bool>,
}

impl PageViewPatch {
	/// Close-style fields for a view that may stay open (navigation away or
	/// heartbeat).
	#[must_use]
	pub fn measurement(time_on_page_seconds: u64, scroll_depth_percent: u8) -> Self {
		Self {
			time_on_page_seconds: Some(time_on_page_seconds),
			scroll_depth_percent: Some(scroll_depth_percent.min(100)),
			is_exit: None,
		}
	}

	/// Fields written when the next navigation closes the view. Clears an exit
	/// marker left behind by an earlier hidden transition.
	#[must_use]
	pub fn closed(time_on_page_seconds: u64, scroll_depth_percent: u8) -> Self {
		Self {
			is_exit: Some(false),
			..Self::measurement(time_on_page_seconds, scroll_depth_percent)
		}
	}

	/// Close-style fields plus the exit marker, for hidden and unload.
	#[must_use]
	pub fn exit(time_on_page_seconds: u64, scroll_depth_percent: u8) -> Self {
		Self {
			is_exit: Some(true),
			..Self::measurement(time_on_page_seconds, scroll_depth_percent)
		}
	}
}
