// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Simulates a short visit and prints what reached the backend.
//!
//! With `PAGELINE_BASE_URL` and `PAGELINE_API_KEY` set the writes go to a real
//! backend; otherwise an in-memory recording backend is used.
//!
//! ```text
//! RUST_LOG=pageline=debug cargo run -p pageline --example simulate
//! ```

use std::sync::Arc;
use std::time::Duration;

use pageline::testing::RecordingBackend;
use pageline::{load_config, EventData, Navigation, Tracker, Visibility};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

const USER_AGENT: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_5 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.5 Mobile/15E148 Safari/604.1";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	tracing_subscriber::registry()
		.with(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| "pageline=debug".into()),
		)
		.with(tracing_subscriber::fmt::layer())
		.init();

	let config = load_config()?;
	let recording = Arc::new(RecordingBackend::new());
	let mut builder = Tracker::builder()
		.config(config.clone())
		.user_agent(USER_AGENT);
	if config.base_url.is_none() || config.api_key.is_none() {
		tracing::info!("no backend configured, recording in memory");
		builder = builder.backend(recording.clone());
	}
	let tracker = builder.build()?;

	tracker.on_navigate(
		Navigation::new("/news")
			.title("News")
			.url("https://example.org/news?utm_source=newsletter&utm_campaign=launch")
			.referrer("https://www.duckduckgo.com/"),
	);
	for y in [200.0, 600.0, 1200.0] {
		tracker.on_scroll(y, 2000.0, 800.0);
		tokio::time::sleep(Duration::from_millis(300)).await;
	}
	tracker.events().sponsor_impression("ferris-inc");

	tracker.on_navigate(Navigation::new("/news/launch-day").title("Launch day"));
	tracker.record_event(
		"share",
		None,
		Some(EventData::new().insert("network", "mastodon")),
	);
	tracker.on_visibility_change(Visibility::Hidden);
	tokio::time::sleep(Duration::from_millis(500)).await;
	tracker.on_visibility_change(Visibility::Visible);

	tracker.flush().await;
	let outcome = tracker.unload();
	tracker.shutdown().await;
	tracing::info!(?outcome, "visit finished");

	for session in recording.sessions() {
		println!("{}", serde_json::to_string_pretty(&session)?);
	}
	for (id, view) in recording.page_views() {
		println!("page view {id}: {}", serde_json::to_string(&view)?);
	}
	for event in recording.events() {
		println!("event: {}", serde_json::to_string(&event)?);
	}
	Ok(())
}
