// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Device profiling from user-agent strings.
//!
//! Classification is substring based and deliberately coarse: the dashboards
//! only group by device class, browser family and OS family. Anything that
//! does not match falls back to "unknown" rather than failing.

use serde::{Deserialize, Serialize};

/// Coarse device class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
	Desktop,
	Mobile,
	Tablet,
	Unknown,
}

impl std::fmt::Display for DeviceType {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			DeviceType::Desktop => write!(f, "desktop"),
			DeviceType::Mobile => write!(f, "mobile"),
			DeviceType::Tablet => write!(f, "tablet"),
			DeviceType::Unknown => write!(f, "unknown"),
		}
	}
}

impl std::str::FromStr for DeviceType {
	type Err = crate::error::CoreError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"desktop" => Ok(DeviceType::Desktop),
			"mobile" => Ok(DeviceType::Mobile),
			"tablet" => Ok(DeviceType::Tablet),
			"unknown" => Ok(DeviceType::Unknown),
			_ => Err(crate::error::CoreError::InvalidDeviceType(s.to_string())),
		}
	}
}

/// Result of profiling a user-agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProfile {
	pub device_type: DeviceType,
	pub browser: String,
	pub os: String,
	/// Crawlers, headless browsers and similar automation
	pub is_bot: bool,
}

impl DeviceProfile {
	#[must_use]
	pub fn unknown() -> Self {
		Self {
			device_type: DeviceType::Unknown,
			browser: UNKNOWN.to_string(),
			os: UNKNOWN.to_string(),
			is_bot: false,
		}
	}
}

const UNKNOWN: &str = "Unknown";

// Order matters: Edge, Opera and Samsung Internet all advertise "chrome/",
// and Chrome advertises "safari/".
const BROWSERS: &[(&[&str], &str)] = &[
	(&["edg/", "edge/", "edgios/", "edga/"], "Edge"),
	(&["opr/", "opera"], "Opera"),
	(&["samsungbrowser"], "Samsung Internet"),
	(&["chrome/", "crios/", "chromium/"], "Chrome"),
	(&["firefox/", "fxios/"], "Firefox"),
	(&["safari/"], "Safari"),
];

// iOS before macOS: iPad UAs may also mention "mac os x".
const OPERATING_SYSTEMS: &[(&[&str], &str)] = &[
	(&["iphone", "ipad", "ipod"], "iOS"),
	(&["android"], "Android"),
	(&["windows"], "Windows"),
	(&["mac os x", "macintosh"], "macOS"),
	(&["cros"], "ChromeOS"),
	(&["linux", "x11"], "Linux"),
];

const BOT_MARKERS: &[&str] = &["bot", "crawler", "spider", "headless", "slurp"];

/// Profiles a user-agent string.
#[must_use]
pub fn profile_user_agent(user_agent: &str) -> DeviceProfile {
	let ua = user_agent.trim().to_ascii_lowercase();
	if ua.is_empty() {
		return DeviceProfile::unknown();
	}

	DeviceProfile {
		device_type: classify_device(&ua),
		browser: first_match(&ua, BROWSERS).to_string(),
		os: first_match(&ua, OPERATING_SYSTEMS).to_string(),
		is_bot: BOT_MARKERS.iter().any(|m| ua.contains(m)),
	}
}

fn classify_device(ua: &str) -> DeviceType {
	let android = ua.contains("android");
	if ua.contains("ipad") || ua.contains("tablet") || (android && !ua.contains("mobile")) {
		DeviceType::Tablet
	} else if ua.contains("mobi") || ua.contains("iphone") || ua.contains("ipod") || android {
		DeviceType::Mobile
	} else {
		DeviceType::Desktop
	}
}

fn first_match(ua: &str, table: &[(&[&str], &'static str)]) -> &'static str {
	table
		.iter()
		.find(|(needles, _)| needles.iter().any(|n| ua.contains(n)))
		.map(|(_, name)| *name)
		.unwrap_or(UNKNOWN)
}
