// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The [`Tracker`] facade that host applications embed.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pageline_core::{profile_user_agent, DeviceProfile, PathCategories, SessionId};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::{HttpBackend, TelemetryBackend};
use crate::clock::{Clock, SystemClock};
use crate::config::{ApiKey, TrackerConfig};
use crate::dispatch::Dispatcher;
use crate::emitter::EventEmitter;
use crate::error::{Result, TelemetryError};
use crate::event_data::EventData;
use crate::flusher::{spawn_heartbeat, ExitFlusher, UnloadOutcome};
use crate::navigation::{Navigation, Visibility};
use crate::recorder::PageViewRecorder;
use crate::reporter::ErrorReporter;
use crate::scroll::ScrollDepth;
use crate::session_store::SessionStore;
use crate::slot::{FileSessionSlot, MemorySessionSlot, SessionSlot};
use crate::spool::ExitSpool;

/// Builder for constructing a [`Tracker`].
///
/// Explicit setters override the corresponding fields of the config.
pub struct TrackerBuilder {
	config: TrackerConfig,
	base_url: Option<String>,
	api_key: Option<ApiKey>,
	state_dir: Option<PathBuf>,
	user_agent: Option<String>,
	backend: Option<Arc<dyn TelemetryBackend>>,
	session_slot: Option<Arc<dyn SessionSlot>>,
	clock: Option<Arc<dyn Clock>>,
}

impl TrackerBuilder {
	pub fn new() -> Self {
		Self {
			config: TrackerConfig::default(),
			base_url: None,
			api_key: None,
			state_dir: None,
			user_agent: None,
			backend: None,
			session_slot: None,
			clock: None,
		}
	}

	/// Starts from a loaded configuration, see [`crate::load_config`].
	pub fn config(mut self, config: TrackerConfig) -> Self {
		self.config = config;
		self
	}

	pub fn base_url(mut self, url: impl Into<String>) -> Self {
		self.base_url = Some(url.into());
		self
	}

	/// Sets the public API key sent with every request.
	pub fn api_key(mut self, key: impl Into<String>) -> Self {
		self.api_key = Some(ApiKey::new(key));
		self
	}

	/// Directory holding the session slot and exit spool.
	pub fn state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
		self.state_dir = Some(dir.into());
		self
	}

	/// User agent profiled for new sessions unless a navigation carries its own.
	pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
		self.user_agent = Some(user_agent.into());
		self
	}

	/// Uses `backend` instead of the HTTP backend. Base URL and API key are
	/// then not required.
	pub fn backend(mut self, backend: Arc<dyn TelemetryBackend>) -> Self {
		self.backend = Some(backend);
		self
	}

	pub fn session_slot(mut self, slot: Arc<dyn SessionSlot>) -> Self {
		self.session_slot = Some(slot);
		self
	}

	pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = Some(clock);
		self
	}

	pub fn heartbeat_interval(mut self, every: Duration) -> Self {
		self.config.heartbeat_interval = every;
		self
	}

	pub fn session_timeout(mut self, timeout: Duration) -> Self {
		self.config.session_timeout = timeout;
		self
	}

	/// Builds the tracker, spawning its background tasks on the current tokio
	/// runtime and replaying any exit writes left by a previous run.
	pub fn build(self) -> Result<Tracker> {
		if tokio::runtime::Handle::try_current().is_err() {
			return Err(TelemetryError::NoRuntime);
		}

		let mut config = self.config;
		if let Some(url) = self.base_url {
			config.base_url = Some(url);
		}
		if let Some(key) = self.api_key {
			config.api_key = Some(key);
		}
		if let Some(dir) = self.state_dir {
			config.state_dir = Some(dir);
		}

		let backend: Arc<dyn TelemetryBackend> = match self.backend {
			Some(backend) => backend,
			None => {
				let base_url = config
					.base_url
					.clone()
					.ok_or(TelemetryError::InvalidBaseUrl)?;
				let api_key = config.api_key.clone().ok_or(TelemetryError::InvalidApiKey)?;
				Arc::new(HttpBackend::new(base_url, api_key, config.request_timeout)?)
			}
		};

		let slot: Arc<dyn SessionSlot> = match (self.session_slot, &config.state_dir) {
			(Some(slot), _) => slot,
			(None, Some(dir)) => Arc::new(FileSessionSlot::in_dir(dir)),
			(None, None) => Arc::new(MemorySessionSlot::new()),
		};
		let spool = match &config.state_dir {
			Some(dir) => ExitSpool::at(dir),
			None => ExitSpool::disabled(),
		};
		let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
		let device = profile_user_agent(self.user_agent.as_deref().unwrap_or_default());

		let (dispatcher, _dispatch_task) = Dispatcher::spawn(backend.clone(), config.queue_capacity);
		replay_spool(&spool, &dispatcher);

		let store = Arc::new(SessionStore::new(
			slot,
			dispatcher.clone(),
			config.session_timeout,
		));
		let scroll = Arc::new(ScrollDepth::new());
		let recorder = Arc::new(PageViewRecorder::new(
			store.clone(),
			dispatcher.clone(),
			scroll.clone(),
		));
		let emitter = Arc::new(EventEmitter::new(
			store,
			recorder.clone(),
			dispatcher.clone(),
			PathCategories::new(config.path_prefixes.iter().cloned()),
			clock.clone(),
		));
		let errors = ErrorReporter::new(emitter.clone(), config.error_report_limit);
		let exit = ExitFlusher::new(recorder.clone(), backend, spool);
		let heartbeat = spawn_heartbeat(recorder.clone(), clock.clone(), config.heartbeat_interval);

		info!(
			device_type = %device.device_type,
			heartbeat_secs = config.heartbeat_interval.as_secs(),
			session_timeout_secs = config.session_timeout.as_secs(),
			persistent = config.state_dir.is_some(),
			"tracker initialized"
		);

		Ok(Tracker {
			config,
			clock,
			device,
			dispatcher,
			recorder,
			scroll,
			emitter,
			errors,
			exit,
			heartbeat: Mutex::new(Some(heartbeat)),
			closed: AtomicBool::new(false),
		})
	}
}

impl Default for TrackerBuilder {
	fn default() -> Self {
		Self::new()
	}
}

fn replay_spool(spool: &ExitSpool, dispatcher: &Dispatcher) {
	match spool.take() {
		Ok(writes) if writes.is_empty() => {}
		Ok(writes) => {
			info!(writes = writes.len(), "replaying exit spool");
			for write in writes {
				dispatcher.enqueue_resolved(write);
			}
		}
		Err(e) => warn!(error = %e, "failed to read exit spool"),
	}
}

/// Session and page-view collector.
///
/// All tracking operations are non-blocking and infallible from the caller's
/// point of view, except [`Tracker::unload`] which blocks until the terminal
/// writes are spooled and delivery has been attempted.
pub struct Tracker {
	config: TrackerConfig,
	clock: Arc<dyn Clock>,
	device: DeviceProfile,
	dispatcher: Dispatcher,
	recorder: Arc<PageViewRecorder>,
	scroll: Arc<ScrollDepth>,
	emitter: Arc<EventEmitter>,
	errors: ErrorReporter,
	exit: ExitFlusher,
	heartbeat: Mutex<Option<JoinHandle<()>>>,
	closed: AtomicBool,
}

impl std::fmt::Debug for Tracker {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Tracker")
			.field("config", &self.config)
			.field("device", &self.device)
			.field("closed", &self.closed)
			.finish_non_exhaustive()
	}
}

impl Tracker {
	pub fn builder() -> TrackerBuilder {
		TrackerBuilder::new()
	}

	/// Records a navigation. Returns the session the new page view belongs
	/// to, or `None` when the visitor is an ignored bot or the tracker is
	/// closed.
	pub fn on_navigate(&self, navigation: Navigation) -> Option<SessionId> {
		if self.is_closed() {
			return None;
		}
		let device = match &navigation.user_agent {
			Some(ua) => profile_user_agent(ua),
			None => self.device.clone(),
		};
		if device.is_bot && self.config.ignore_bots {
			debug!(browser = %device.browser, "ignoring bot navigation");
			return None;
		}
		self.recorder
			.on_navigate(self.clock.now(), &navigation, &device)
	}

	/// Feeds a scroll position and returns the maximum depth of the open view.
	pub fn on_scroll(&self, scrolled: f64, document_height: f64, viewport_height: f64) -> u8 {
		self.scroll.observe(scrolled, document_height, viewport_height)
	}

	pub fn on_visibility_change(&self, visibility: Visibility) {
		if self.is_closed() {
			return;
		}
		self.recorder
			.on_visibility_change(self.clock.now(), visibility);
	}

	/// Terminal flush before the host exits. Blocks the calling thread for at
	/// most the blocking delivery timeout. Later calls do nothing.
	pub fn unload(&self) -> UnloadOutcome {
		self.closed.store(true, Ordering::SeqCst);
		self.stop_heartbeat();
		self.exit.unload(self.clock.as_ref())
	}

	/// Records a custom event against the live session.
	pub fn record_event(&self, name: &str, category: Option<&str>, data: Option<EventData>) -> bool {
		self.emitter.record(name, category, data)
	}

	/// Event emitter for feature code, including the sponsor helpers.
	pub fn events(&self) -> &EventEmitter {
		&self.emitter
	}

	pub fn errors(&self) -> &ErrorReporter {
		&self.errors
	}

	/// The live session, if any. Never starts one.
	pub fn session_id(&self) -> Option<SessionId> {
		self.emitter.current_session()
	}

	pub fn scroll_depth(&self) -> u8 {
		self.scroll.max()
	}

	pub fn config(&self) -> &TrackerConfig {
		&self.config
	}

	/// Waits until every write queued so far has been applied.
	pub async fn flush(&self) {
		self.dispatcher.flush().await;
	}

	/// Stops the heartbeat and drains queued writes. Does not write terminal
	/// exit state; call [`Tracker::unload`] for that.
	pub async fn shutdown(&self) {
		let first = !self.closed.swap(true, Ordering::SeqCst);
		self.stop_heartbeat();
		self.dispatcher.flush().await;
		if first {
			info!("tracker shut down");
		}
	}

	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::SeqCst)
	}

	/// Whether [`Tracker::unload`] has run.
	pub fn is_unloaded(&self) -> bool {
		self.exit.is_done()
	}

	fn stop_heartbeat(&self) {
		let handle = self
			.heartbeat
			.lock()
			.unwrap_or_else(|e| e.into_inner())
			.take();
		if let Some(handle) = handle {
			handle.abort();
		}
	}
}

impl Drop for Tracker {
	fn drop(&mut self) {
		self.stop_heartbeat();
	}
}
