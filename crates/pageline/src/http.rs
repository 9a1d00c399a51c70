// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights
// reserved. SPDX-License-Identifier: Proprietary

//! HTTP clients with a consistent User-Agent and library identification
//! headers.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};

use crate::config::ApiKey;

/// Library name sent with every request.
pub const LIB_NAME: &str = "pageline-rust";
/// Library version sent with every request.
pub const LIB_VERSION: &str = env!("CARGO_PKG_VERSION");

const LIB_HEADER: &str = "x-pageline-lib";
const LIB_VERSION_HEADER: &str = "x-pageline-lib-version";
const APIKEY_HEADER: &str = "apikey";

/// Returns the standard User-Agent string: `pageline-rust/{version}`.
pub fn user_agent() -> String {
	format!("{LIB_NAME}/{LIB_VERSION}")
}

/// Async client builder with the standard User-Agent and headers.
pub fn builder(api_key: &ApiKey, timeout: Duration) -> reqwest::ClientBuilder {
	reqwest::Client::builder()
		.user_agent(user_agent())
		.default_headers(default_headers(api_key))
		.timeout(timeout)
}

/// Blocking client builder with the standard User-Agent and headers.
///
/// Must not be built or used on an async runtime thread; see
/// [`crate::backend::HttpBackend`] for how the exit path runs it.
pub fn blocking_builder(api_key: &ApiKey, timeout: Duration) -> reqwest::blocking::ClientBuilder {
	reqwest::blocking::Client::builder()
		.user_agent(user_agent())
		.default_headers(default_headers(api_key))
		.timeout(timeout)
}

/// `apikey`, bearer authorization, JSON content type and library headers.
pub fn default_headers(api_key: &ApiKey) -> HeaderMap {
	let mut headers = HeaderMap::new();
	headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
	headers.insert(
		HeaderName::from_static(LIB_HEADER),
		HeaderValue::from_static(LIB_NAME),
	);
	headers.insert(
		HeaderName::from_static(LIB_VERSION_HEADER),
		HeaderValue::from_static(LIB_VERSION),
	);

	if let Ok(mut value) = HeaderValue::from_str(api_key.expose()) {
		value.set_sensitive(true);
		headers.insert(HeaderName::from_static(APIKEY_HEADER), value);
	}
	if let Ok(mut value) = HeaderValue::from_str(&format!("Bearer {}", api_key.expose())) {
		value.set_sensitive(true);
		headers.insert(AUTHORIZATION, value);
	}
	headers
}
