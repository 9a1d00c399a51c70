// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Session and page-view telemetry collector.
//!
//! The host application feeds navigation, scroll and visibility signals into a
//! [`Tracker`]. The tracker keeps one visitor session alive across navigations
//! until 30 minutes of inactivity, records one page view per navigation with
//! its dwell time and scroll depth, and writes everything to a PostgREST style
//! backend without ever blocking the host, except on [`Tracker::unload`].
//!
//! # Features
//!
//! - **Sessions**: resumed from a durable local slot, expired after an idle
//!   timeout, seeded with device profile, referrer and UTM context
//! - **Page views**: closed on the next navigation, snapshotted by a periodic
//!   heartbeat and on visibility loss
//! - **Exit delivery**: terminal writes are spooled to disk and delivered with
//!   a blocking request; undelivered writes are replayed on the next start
//! - **Events and errors**: custom named events and an explicit error reporter
//!
//! # Example
//!
//! ```ignore
//! use pageline::{Navigation, Tracker, Visibility};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let tracker = Tracker::builder()
//!         .base_url("https://project.example.co")
//!         .api_key("public-anon-key")
//!         .state_dir("/var/lib/myapp/pageline")
//!         .user_agent("Mozilla/5.0 (X11; Linux x86_64) ...")
//!         .build()?;
//!
//!     tracker.on_navigate(Navigation::new("/news").title("News"));
//!     tracker.on_scroll(800.0, 1500.0, 500.0);
//!     tracker.on_visibility_change(Visibility::Hidden);
//!
//!     tracker.unload();
//!     Ok(())
//! }
//! ```

mod backend;
mod clock;
mod config;
mod dispatch;
mod emitter;
mod error;
mod event_data;
mod flusher;
mod http;
mod navigation;
mod recorder;
mod reporter;
mod scroll;
mod session_store;
mod slot;
mod spool;
pub mod testing;
mod tracker;

pub use backend::{
	BackendWrite, DeliveryReport, HttpBackend, TableNames, TelemetryBackend, BLOCKING_TIMEOUT,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
	load_config, load_config_with_file, ApiKey, ConfigError, ConfigSource, DefaultsSource,
	EnvSource, Precedence, TomlSource, TrackerConfig, TrackerConfigLayer,
};
pub use emitter::EventEmitter;
pub use error::{Result, TelemetryError};
pub use event_data::EventData;
pub use flusher::UnloadOutcome;
pub use navigation::{Navigation, Visibility};
pub use reporter::ErrorReporter;
pub use scroll::ScrollDepth;
pub use slot::{FileSessionSlot, MemorySessionSlot, SessionSlot, StoredSession, SESSION_SLOT_FILE};
pub use spool::{ExitSpool, EXIT_SPOOL_FILE};
pub use tracker::{Tracker, TrackerBuilder};

// Re-export core types for convenience
pub use pageline_core::{
	DeviceProfile, DeviceType, EventRecord, PageViewId, PageViewPatch, PageViewRecord, SessionId,
	SessionPatch, SessionRecord,
};
