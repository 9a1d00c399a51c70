// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! End-to-end visitor journeys through the public tracker API.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use pageline::testing::{ManualClock, RecordingBackend};
use pageline::{
	BackendWrite, MemorySessionSlot, Navigation, SessionSlot, Tracker, UnloadOutcome, Visibility,
};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CHROME_MAC: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

fn t0() -> DateTime<Utc> {
	Utc.with_ymd_and_hms(2026, 5, 4, 8, 0, 0).unwrap()
}

struct Journey {
	backend: Arc<RecordingBackend>,
	clock: Arc<ManualClock>,
	tracker: Tracker,
}

fn journey() -> Journey {
	let backend = Arc::new(RecordingBackend::new());
	let clock = Arc::new(ManualClock::new(t0()));
	let tracker = Tracker::builder()
		.backend(backend.clone())
		.clock(clock.clone())
		.user_agent(CHROME_MAC)
		.build()
		.unwrap();
	Journey {
		backend,
		clock,
		tracker,
	}
}

#[tokio::test]
async fn scroll_and_navigate_closes_first_view() {
	let j = journey();
	let session = j.tracker.on_navigate(Navigation::new("/news")).unwrap();
	j.tracker.flush().await;
	assert_eq!(j.backend.session(session).unwrap().page_count, 1);

	j.tracker.on_scroll(1600.0, 2500.0, 500.0);
	j.clock.advance(Duration::seconds(10));
	j.tracker.on_navigate(Navigation::new("/news/article-a"));
	j.tracker.flush().await;

	let views = j.backend.page_views();
	assert_eq!(views.len(), 2);
	assert_eq!(views[0].1.path, "/news");
	assert_eq!(views[0].1.time_on_page_seconds, 10);
	assert_eq!(views[0].1.scroll_depth_percent, 80);
	assert_eq!(views[1].1.referrer_path.as_deref(), Some("/news"));
	assert_eq!(j.tracker.scroll_depth(), 0);

	let stored = j.backend.session(session).unwrap();
	assert_eq!(stored.page_count, 2);
	assert!(!stored.is_bounce);
}

#[tokio::test]
async fn fresh_visit_starts_provisional_bounce() {
	let j = journey();
	assert!(j.tracker.session_id().is_none());

	let nav = Navigation::new("/events")
		.url("https://example.org/events?utm_source=mastodon&utm_medium=social")
		.referrer("https://www.mastodon.social/@someone");
	let session = j.tracker.on_navigate(nav).unwrap();
	j.tracker.flush().await;

	let stored = j.backend.session(session).unwrap();
	assert_eq!(stored.landing_page, "/events");
	assert!(stored.is_bounce);
	assert_eq!(stored.page_count, 1);
	assert_eq!(stored.device_type, "desktop");
	assert_eq!(stored.browser, "Chrome");
	assert_eq!(stored.os, "macOS");
	assert_eq!(stored.referrer_domain.as_deref(), Some("mastodon.social"));
	assert_eq!(stored.utm_source.as_deref(), Some("mastodon"));
	assert_eq!(stored.utm_medium.as_deref(), Some("social"));
	assert_eq!(j.tracker.session_id(), Some(session));
}

#[tokio::test]
async fn idle_timeout_finalizes_previous_session() {
	let j = journey();
	let first = j.tracker.on_navigate(Navigation::new("/")).unwrap();
	j.clock.advance(Duration::seconds(75));
	j.tracker.on_navigate(Navigation::new("/jobs"));

	j.clock.advance(Duration::minutes(35));
	let second = j.tracker.on_navigate(Navigation::new("/about")).unwrap();
	j.tracker.flush().await;

	assert_ne!(first, second);
	let finalized = j.backend.session(first).unwrap();
	assert_eq!(finalized.duration_seconds, 75);
	assert_eq!(finalized.page_count, 2);
	assert!(!finalized.is_bounce);

	let fresh = j.backend.session(second).unwrap();
	assert_eq!(fresh.landing_page, "/about");
	assert_eq!(fresh.page_count, 1);

	let views = j.backend.page_views();
	assert_eq!(views[2].1.session_id, second);
	assert!(views[2].1.referrer_path.is_none());
}

#[tokio::test]
async fn hidden_then_visible_keeps_session() {
	let j = journey();
	let session = j.tracker.on_navigate(Navigation::new("/blog")).unwrap();
	j.clock.advance(Duration::seconds(20));
	j.tracker.on_visibility_change(Visibility::Hidden);
	j.tracker.flush().await;

	let flushed = j.backend.session(session).unwrap();
	assert_eq!(flushed.exit_page.as_deref(), Some("/blog"));
	assert_eq!(flushed.duration_seconds, 20);
	assert!(j.backend.page_views()[0].1.is_exit);

	j.clock.advance(Duration::minutes(2));
	j.tracker.on_visibility_change(Visibility::Visible);
	let after = j.tracker.on_navigate(Navigation::new("/blog/post")).unwrap();
	j.tracker.flush().await;

	assert_eq!(after, session);
	assert_eq!(j.backend.sessions().len(), 1);
	let views = j.backend.page_views();
	assert!(!views[0].1.is_exit);
	assert_eq!(views[0].1.time_on_page_seconds, 140);
	assert_eq!(j.backend.session(session).unwrap().page_count, 2);
}

#[tokio::test]
async fn closing_after_one_view_writes_bounce() {
	let j = journey();
	let session = j.tracker.on_navigate(Navigation::new("/sponsors")).unwrap();
	j.tracker.flush().await;
	j.clock.advance(Duration::seconds(8));

	assert_eq!(j.tracker.unload(), UnloadOutcome::Delivered);

	let terminal = j.backend.blocking_writes();
	assert_eq!(terminal.len(), 2);
	let stored = j.backend.session(session).unwrap();
	assert!(stored.is_bounce);
	assert_eq!(stored.exit_page.as_deref(), Some("/sponsors"));
	assert_eq!(stored.duration_seconds, 8);
	let view = &j.backend.page_views()[0].1;
	assert!(view.is_exit);
	assert_eq!(view.time_on_page_seconds, 8);
}

#[tokio::test]
async fn repeated_unload_does_not_double_count() {
	let j = journey();
	let session = j.tracker.on_navigate(Navigation::new("/")).unwrap();
	j.tracker.on_navigate(Navigation::new("/news"));
	j.tracker.flush().await;

	assert_eq!(j.tracker.unload(), UnloadOutcome::Delivered);
	assert_eq!(j.tracker.unload(), UnloadOutcome::AlreadyUnloaded);
	assert!(j.tracker.on_navigate(Navigation::new("/jobs")).is_none());
	j.tracker.flush().await;

	assert_eq!(j.backend.blocking_writes().len(), 2);
	assert_eq!(j.backend.session(session).unwrap().page_count, 2);
	assert_eq!(j.backend.page_views().len(), 2);
}

#[tokio::test]
async fn one_open_view_per_navigation() {
	let j = journey();
	let paths = ["/", "/news", "/news/a", "/news", "/jobs"];
	for (i, p) in paths.iter().enumerate() {
		j.tracker.on_navigate(Navigation::new(*p));
		j.clock.advance(Duration::seconds(3));
		j.tracker.flush().await;

		let closes = j
			.backend
			.writes()
			.iter()
			.filter(|w| matches!(w, BackendWrite::UpdatePageView { patch, .. } if patch.is_exit == Some(false)))
			.count();
		assert_eq!(j.backend.page_views().len(), i + 1);
		assert_eq!(closes, i);
	}
}

#[tokio::test]
async fn events_follow_session_and_path() {
	let j = journey();
	assert!(!j.tracker.record_event("early", None, None));

	j.tracker.on_navigate(Navigation::new("/events/rustconf"));
	assert!(j.tracker.record_event("rsvp", None, None));
	j.tracker.events().sponsor_click("ferris-inc", "https://ferris.example");
	j.tracker.errors().report_message("map tile failed", None);
	j.tracker.flush().await;

	let events = j.backend.events();
	assert_eq!(events.len(), 3);
	assert_eq!(events[0].category.as_deref(), Some("events"));
	assert_eq!(events[1].category.as_deref(), Some("sponsors"));
	assert_eq!(events[2].name, "error");
	assert_eq!(j.backend.sessions().len(), 1);
}

#[tokio::test]
async fn session_survives_restart_with_state_dir() {
	let dir = TempDir::new().unwrap();
	let backend = Arc::new(RecordingBackend::new());
	let clock = Arc::new(ManualClock::new(t0()));

	let first = Tracker::builder()
		.backend(backend.clone())
		.clock(clock.clone())
		.state_dir(dir.path())
		.build()
		.unwrap();
	let session = first.on_navigate(Navigation::new("/")).unwrap();
	first.shutdown().await;
	drop(first);

	clock.advance(Duration::minutes(10));
	let second = Tracker::builder()
		.backend(backend.clone())
		.clock(clock.clone())
		.state_dir(dir.path())
		.build()
		.unwrap();
	assert_eq!(second.session_id(), Some(session));
	assert_eq!(second.on_navigate(Navigation::new("/news")), Some(session));
	second.flush().await;
	assert_eq!(backend.session(session).unwrap().page_count, 2);
}

#[tokio::test]
async fn failed_exit_delivery_replays_on_next_start() {
	let dir = TempDir::new().unwrap();
	let clock = Arc::new(ManualClock::new(t0()));
	let down = Arc::new(RecordingBackend::new());

	let first = Tracker::builder()
		.backend(down.clone())
		.clock(clock.clone())
		.state_dir(dir.path())
		.build()
		.unwrap();
	first.on_navigate(Navigation::new("/about"));
	first.flush().await;
	down.set_failing(true);
	clock.advance(Duration::seconds(30));
	assert_eq!(first.unload(), UnloadOutcome::Spooled);
	drop(first);

	let up = Arc::new(RecordingBackend::new());
	let second = Tracker::builder()
		.backend(up.clone())
		.clock(clock.clone())
		.state_dir(dir.path())
		.build()
		.unwrap();
	second.flush().await;

	let replayed = up.writes();
	assert_eq!(replayed.len(), 2);
	assert!(matches!(replayed[0], BackendWrite::UpdatePageView { .. }));
	assert!(matches!(
		&replayed[1],
		BackendWrite::UpdateSession { patch, .. } if patch.exit_page.as_deref() == Some("/about")
	));

	let third = Tracker::builder()
		.backend(up.clone())
		.clock(clock)
		.state_dir(dir.path())
		.build()
		.unwrap();
	third.flush().await;
	assert_eq!(up.writes().len(), 2);
}

#[tokio::test]
async fn unwritable_state_dir_keeps_one_session() {
	let dir = TempDir::new().unwrap();
	let blocked = dir.path().join("state");
	std::fs::write(&blocked, b"a regular file, not a directory").unwrap();
	let backend = Arc::new(RecordingBackend::new());
	let clock = Arc::new(ManualClock::new(t0()));
	let tracker = Tracker::builder()
		.backend(backend.clone())
		.clock(clock.clone())
		.state_dir(blocked.clone())
		.build()
		.unwrap();

	let mut ids = Vec::new();
	for path in ["/news", "/news/a", "/blog"] {
		ids.push(tracker.on_navigate(Navigation::new(path)).unwrap());
		clock.advance(Duration::seconds(5));
	}
	tracker.flush().await;

	assert_eq!(ids[0], ids[1]);
	assert_eq!(ids[1], ids[2]);
	assert_eq!(tracker.session_id(), Some(ids[0]));
	assert_eq!(backend.sessions().len(), 1);
	let stored = backend.session(ids[0]).unwrap();
	assert_eq!(stored.page_count, 3);
	assert!(!stored.is_bounce);

	assert_eq!(tracker.unload(), UnloadOutcome::Delivered);
	let closed = backend.session(ids[0]).unwrap();
	assert_eq!(closed.exit_page.as_deref(), Some("/blog"));
	assert_eq!(closed.duration_seconds, 15);
	assert!(!closed.is_bounce);
}

#[tokio::test]
async fn partial_exit_delivery_replays_only_the_rest() {
	let dir = TempDir::new().unwrap();
	let clock = Arc::new(ManualClock::new(t0()));
	let flaky = Arc::new(RecordingBackend::new());

	let first = Tracker::builder()
		.backend(flaky.clone())
		.clock(clock.clone())
		.state_dir(dir.path())
		.build()
		.unwrap();
	first.on_navigate(Navigation::new("/pricing"));
	first.flush().await;
	flaky.fail_blocking_after(1);
	clock.advance(Duration::seconds(20));
	assert_eq!(first.unload(), UnloadOutcome::Spooled);
	assert_eq!(flaky.blocking_writes().len(), 1);
	drop(first);

	let up = Arc::new(RecordingBackend::new());
	let second = Tracker::builder()
		.backend(up.clone())
		.clock(clock)
		.state_dir(dir.path())
		.build()
		.unwrap();
	second.flush().await;

	let replayed = up.writes();
	assert_eq!(replayed.len(), 1);
	assert!(matches!(
		&replayed[0],
		BackendWrite::UpdateSession { patch, .. } if patch.exit_page.as_deref() == Some("/pricing")
	));
}

#[tokio::test]
async fn corrupt_slot_starts_new_session() {
	let backend = Arc::new(RecordingBackend::new());
	let slot = Arc::new(MemorySessionSlot::new());
	slot.set_raw("{\"session_id\": 42}");

	let tracker = Tracker::builder()
		.backend(backend.clone())
		.session_slot(slot.clone())
		.clock(Arc::new(ManualClock::new(t0())))
		.build()
		.unwrap();
	let session = tracker.on_navigate(Navigation::new("/")).unwrap();
	tracker.flush().await;

	assert_eq!(slot.load().unwrap().session_id, session);
	assert_eq!(backend.sessions().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn http_backend_round_trip() {
	let server = MockServer::start().await;
	Mock::given(method("POST"))
		.and(path("/rest/v1/analytics_sessions"))
		.respond_with(ResponseTemplate::new(201))
		.mount(&server)
		.await;
	Mock::given(method("POST"))
		.and(path("/rest/v1/analytics_page_views"))
		.respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!([{ "id": 7 }])))
		.mount(&server)
		.await;
	Mock::given(method("PATCH"))
		.respond_with(ResponseTemplate::new(204))
		.mount(&server)
		.await;

	let clock = Arc::new(ManualClock::new(t0()));
	let tracker = Tracker::builder()
		.base_url(server.uri())
		.api_key("public-anon")
		.clock(clock.clone())
		.build()
		.unwrap();
	tracker.on_navigate(Navigation::new("/news"));
	tracker.flush().await;
	clock.advance(Duration::seconds(5));

	assert_eq!(tracker.unload(), UnloadOutcome::Delivered);

	let requests = server.received_requests().await.unwrap();
	let exit_patch = requests
		.iter()
		.find(|r| r.method.as_str() == "PATCH" && r.url.path() == "/rest/v1/analytics_page_views")
		.expect("page view exit patch");
	assert_eq!(exit_patch.url.query(), Some("id=eq.7"));
	let body: serde_json::Value = serde_json::from_slice(&exit_patch.body).unwrap();
	assert_eq!(body["is_exit"], serde_json::json!(true));
	assert_eq!(body["time_on_page_seconds"], serde_json::json!(5));
	assert!(requests
		.iter()
		.all(|r| r.headers.get("apikey").map(|v| v.as_bytes()) == Some(b"public-anon".as_slice())));
}
