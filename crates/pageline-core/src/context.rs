// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Acquisition context resolution: UTM parameters, referrer domain, and path
//! categories.

use serde::{Deserialize, Serialize};
use url::Url;

/// Top-level path prefixes that map to their own category.
pub const DEFAULT_PATH_PREFIXES: &[&str] = &["news", "blog", "events", "sponsors", "jobs", "about"];

// Relative navigation URLs ("/news?utm_source=x") are resolved against this
// so they can go through the same parser as absolute ones.
const RELATIVE_BASE: &str = "relative://pageline.invalid/";

/// Marketing campaign parameters captured at session creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtmParams {
	pub source: Option<String>,
	pub medium: Option<String>,
	pub campaign: Option<String>,
	pub term: Option<String>,
	pub content: Option<String>,
}

impl UtmParams {
	#[must_use]
	pub fn is_empty(&self) -> bool {
		*self == Self::default()
	}
}

/// Where a visitor came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionContext {
	pub referrer: Option<String>,
	pub referrer_domain: Option<String>,
	pub utm: UtmParams,
}

/// Resolves acquisition context from the URL being navigated to and the
/// referrer reported alongside it.
///
/// `url` may be absolute or a path with a query string. A referrer on the same
/// host as `url` is internal navigation and yields no referrer domain.
#[must_use]
pub fn resolve_acquisition(url: &str, referrer: Option<&str>) -> AcquisitionContext {
	let page = parse_lenient(url);

	let mut utm = UtmParams::default();
	if let Some(page) = &page {
		for (key, value) in page.query_pairs() {
			let value = value.trim();
			if value.is_empty() {
				continue;
			}
			let slot = match key.as_ref() {
				"utm_source" => &mut utm.source,
				"utm_medium" => &mut utm.medium,
				"utm_campaign" => &mut utm.campaign,
				"utm_term" => &mut utm.term,
				"utm_content" => &mut utm.content,
				_ => continue,
			};
			if slot.is_none() {
				*slot = Some(value.to_string());
			}
		}
	}

	let referrer = referrer
		.map(str::trim)
		.filter(|r| !r.is_empty())
		.map(str::to_string);

	let page_host = page
		.as_ref()
		.filter(|u| u.scheme() != "relative")
		.and_then(|u| u.host_str())
		.map(strip_www);

	let referrer_domain = referrer
		.as_deref()
		.and_then(|r| Url::parse(r).ok())
		.and_then(|u| u.host_str().map(strip_www))
		.filter(|host| !host.is_empty())
		.filter(|host| page_host.as_deref() != Some(host.as_str()));

	AcquisitionContext {
		referrer,
		referrer_domain,
		utm,
	}
}

fn parse_lenient(url: &str) -> Option<Url> {
	Url::parse(url).ok().or_else(|| {
		Url::parse(RELATIVE_BASE)
			.ok()
			.and_then(|base| base.join(url).ok())
	})
}

fn strip_www(host: &str) -> String {
	let host = host.to_ascii_lowercase();
	match host.strip_prefix("www.") {
		Some(rest) => rest.to_string(),
		None => host,
	}
}

/// Maps a route to a coarse content category using its first path segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathCategories {
	prefixes: Vec<String>,
}

impl PathCategories {
	pub fn new<I, S>(prefixes: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self {
			prefixes: prefixes
				.into_iter()
				.map(|p| p.into().trim_matches('/').to_ascii_lowercase())
				.filter(|p| !p.is_empty())
				.collect(),
		}
	}

	pub fn prefixes(&self) -> &[String] {
		&self.prefixes
	}

	/// `home` for the root, the matching prefix for known sections, `other`
	/// for everything else.
	#[must_use]
	pub fn categorize(&self, path: &str) -> String {
		let path = path.split(['?', '#']).next().unwrap_or_default();
		let first = path
			.split('/')
			.find(|segment| !segment.is_empty())
			.map(str::to_ascii_lowercase);

		match first {
			None => "home".to_string(),
			Some(segment) => self
				.prefixes
				.iter()
				.find(|p| **p == segment)
				.cloned()
				.unwrap_or_else(|| "other".to_string()),
		}
	}
}

impl Default for PathCategories {
	fn default() -> Self {
		Self::new(DEFAULT_PATH_PREFIXES.iter().copied())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;

	#[test]
	fn test_utm_from_absolute_url() {
		let ctx = resolve_acquisition(
			"https://example.com/news?utm_source=newsletter&utm_medium=email&utm_campaign=spring",
			None,
		);
		assert_eq!(ctx.utm.source.as_deref(), Some("newsletter"));
		assert_eq!(ctx.utm.medium.as_deref(), Some("email"));
		assert_eq!(ctx.utm.campaign.as_deref(), Some("spring"));
		assert!(ctx.utm.term.is_none());
	}

	#[test]
	fn test_utm_from_relative_url() {
		let ctx = resolve_acquisition("/events?utm_source=x&utm_content=banner", None);
		assert_eq!(ctx.utm.source.as_deref(), Some("x"));
		assert_eq!(ctx.utm.content.as_deref(), Some("banner"));
	}

	#[test]
	fn test_empty_utm_values_are_absent() {
		let ctx = resolve_acquisition("/news?utm_source=&utm_medium=%20", None);
		assert!(ctx.utm.is_empty());
	}

	#[test]
	fn test_referrer_domain_strips_www() {
		let ctx = resolve_acquisition("/news", Some("https://www.Google.com/search?q=x"));
		assert_eq!(ctx.referrer_domain.as_deref(), Some("google.com"));
		assert_eq!(
			ctx.referrer.as_deref(),
			Some("https://www.Google.com/search?q=x")
		);
	}

	#[test]
	fn test_same_host_referrer_is_internal() {
		let ctx = resolve_acquisition(
			"https://www.example.com/news",
			Some("https://example.com/blog"),
		);
		assert!(ctx.referrer_domain.is_none());
		assert!(ctx.referrer.is_some());
	}

	#[test]
	fn test_unparsable_referrer_has_no_domain() {
		let ctx = resolve_acquisition("/news", Some("android-app://"));
		assert!(ctx.referrer_domain.is_none());
		let ctx = resolve_acquisition("/news", Some("   "));
		assert!(ctx.referrer.is_none());
	}

	#[test]
	fn test_categorize_known_prefixes() {
		let cats = PathCategories::default();
		assert_eq!(cats.categorize("/"), "home");
		assert_eq!(cats.categorize(""), "home");
		assert_eq!(cats.categorize("/news/article-a"), "news");
		assert_eq!(cats.categorize("/Sponsors?tier=gold"), "sponsors");
		assert_eq!(cats.categorize("/newsletter"), "other");
	}

	#[test]
	fn test_custom_prefixes_are_normalized() {
		let cats = PathCategories::new(["/Docs/", "", "api"]);
		assert_eq!(cats.prefixes(), &["docs".to_string(), "api".to_string()]);
		assert_eq!(cats.categorize("/docs/intro"), "docs");
	}

	proptest! {
		#[test]
		fn resolving_never_panics(url in ".{0,200}", referrer in proptest::option::of(".{0,200}")) {
			let _ = resolve_acquisition(&url, referrer.as_deref());
		}

		#[test]
		fn categories_are_known_or_fallback(path in "(/[a-z]{0,8}){0,4}") {
			let cats = PathCategories::default();
			let category = cats.categorize(&path);
			prop_assert!(
				category == "home"
					|| category == "other"
					|| DEFAULT_PATH_PREFIXES.contains(&category.as_str())
			);
		}
	}
}
