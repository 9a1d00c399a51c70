// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Navigation and visibility signals fed in by the host application.

use serde::{Deserialize, Serialize};

/// A route change reported by the host.
///
/// `url`, `referrer` and `user_agent` are only consulted when the navigation
/// starts a new session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Navigation {
	pub path: String,
	pub title: Option<String>,
	pub url: Option<String>,
	pub referrer: Option<String>,
	pub user_agent: Option<String>,
}

impl Navigation {
	/// A navigation to `path`. An empty path is the site root.
	pub fn new(path: impl Into<String>) -> Self {
		Self {
			path: normalize_path(path.into()),
			title: None,
			url: None,
			referrer: None,
			user_agent: None,
		}
	}

	pub fn title(mut self, title: impl Into<String>) -> Self {
		self.title = Some(title.into());
		self
	}

	/// Full URL, including the query string carrying any `utm_*` parameters.
	pub fn url(mut self, url: impl Into<String>) -> Self {
		self.url = Some(url.into());
		self
	}

	pub fn referrer(mut self, referrer: impl Into<String>) -> Self {
		self.referrer = Some(referrer.into());
		self
	}

	/// Overrides the user agent configured on the tracker.
	pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
		self.user_agent = Some(user_agent.into());
		self
	}

	/// The URL used for acquisition context, falling back to the path.
	pub(crate) fn context_url(&self) -> &str {
		self.url.as_deref().unwrap_or(&self.path)
	}
}

fn normalize_path(path: String) -> String {
	let trimmed = path.trim();
	if trimmed.is_empty() {
		"/".to_string()
	} else if trimmed.starts_with('/') {
		trimmed.to_string()
	} else {
		format!("/{trimmed}")
	}
}

/// Page visibility as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
	Visible,
	Hidden,
}
