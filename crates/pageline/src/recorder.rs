// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Page view lifecycle.
//!
//! After the first navigation there is exactly one open page view. Each
//! navigation closes it with its dwell time and scroll depth, resolves the
//! session, and opens the next one. Heartbeat and hidden transitions write
//! close-style fields without closing; unload produces the terminal writes.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use pageline_core::{
	elapsed_seconds, DeviceProfile, PageViewPatch, PageViewRecord, SessionId, ViewKey,
};
use tracing::{debug, warn};

use crate::backend::BackendWrite;
use crate::dispatch::{Dispatcher, Write};
use crate::navigation::{Navigation, Visibility};
use crate::scroll::ScrollDepth;
use crate::session_store::SessionStore;

#[derive(Debug)]
struct OpenView {
	key: ViewKey,
	record: PageViewRecord,
	/// Set after a hidden flush wrote `is_exit = true`.
	exit_marked: bool,
}

#[derive(Debug, Default)]
struct RecorderState {
	open: Option<OpenView>,
	last_path: Option<String>,
	last_session: Option<SessionId>,
	hidden: bool,
	terminated: bool,
}

#[derive(Debug)]
pub struct PageViewRecorder {
	store: Arc<SessionStore>,
	dispatcher: Dispatcher,
	scroll: Arc<ScrollDepth>,
	state: Mutex<RecorderState>,
}

impl PageViewRecorder {
	pub fn new(store: Arc<SessionStore>, dispatcher: Dispatcher, scroll: Arc<ScrollDepth>) -> Self {
		Self {
			store,
			dispatcher,
			scroll,
			state: Mutex::new(RecorderState::default()),
		}
	}

	/// Closes the open view, resolves the session and opens a view for
	/// `navigation`. Returns `None` once the recorder has been terminated by
	/// unload.
	pub fn on_navigate(
		&self,
		now: DateTime<Utc>,
		navigation: &Navigation,
		device: &DeviceProfile,
	) -> Option<SessionId> {
		let mut state = self.lock();
		if state.terminated {
			return None;
		}

		if let Some(open) = state.open.take() {
			let patch = PageViewPatch::closed(
				elapsed_seconds(open.record.viewed_at, now),
				self.scroll.max(),
			);
			debug!(
				path = %open.record.path,
				time_on_page_seconds = ?patch.time_on_page_seconds,
				scroll_depth_percent = ?patch.scroll_depth_percent,
				"page view closed"
			);
			self.dispatcher.enqueue(Write::UpdatePageView {
				key: open.key,
				patch,
			});
			self.dispatcher.enqueue(Write::ForgetView(open.key));
		}

		let session_id = self.store.resume_or_create(now, navigation, device);
		let referrer_path = if state.last_session == Some(session_id) {
			state.last_path.clone()
		} else {
			None
		};
		match self.store.record_page_view(now) {
			Some(stored) if stored.session_id == session_id => {}
			Some(stored) => warn!(
				session_id = %session_id,
				stored_session_id = %stored.session_id,
				"page view counted against a different stored session"
			),
			None => warn!(session_id = %session_id, "no stored session, page view not counted"),
		}

		let key = ViewKey::new();
		let record = PageViewRecord::open(
			session_id,
			&navigation.path,
			navigation.title.clone(),
			referrer_path,
			now,
		);
		debug!(session_id = %session_id, view = %key, path = %record.path, "page view opened");
		self.dispatcher.enqueue(Write::InsertPageView {
			key,
			record: record.clone(),
		});
		self.scroll.reset();

		state.open = Some(OpenView {
			key,
			record,
			exit_marked: false,
		});
		state.last_path = Some(navigation.path.clone());
		state.last_session = Some(session_id);
		Some(session_id)
	}

	/// Periodic snapshot of the open view and its session. Skipped while the
	/// page is hidden.
	pub fn heartbeat(&self, now: DateTime<Utc>) {
		let mut state = self.lock();
		if state.hidden || state.terminated {
			return;
		}
		let Some(open) = state.open.as_mut() else {
			return;
		};

		let time_on_page = elapsed_seconds(open.record.viewed_at, now);
		let patch = if open.exit_marked {
			// Visible again after a hidden flush: clear the exit marker.
			open.exit_marked = false;
			PageViewPatch::closed(time_on_page, self.scroll.max())
		} else {
			PageViewPatch::measurement(time_on_page, self.scroll.max())
		};
		self.dispatcher.enqueue(Write::UpdatePageView {
			key: open.key,
			patch,
		});

		if let Some((session_id, patch)) = self.store.snapshot_patch(now, None) {
			self.dispatcher
				.enqueue_resolved(BackendWrite::UpdateSession { session_id, patch });
		}
	}

	/// Tracks visibility. The first `Hidden` after a visible period writes a
	/// provisional close through the async path.
	pub fn on_visibility_change(&self, now: DateTime<Utc>, visibility: Visibility) {
		let mut state = self.lock();
		if state.terminated {
			return;
		}
		match visibility {
			Visibility::Visible => state.hidden = false,
			Visibility::Hidden if state.hidden => {}
			Visibility::Hidden => {
				state.hidden = true;
				self.flush_hidden(&mut state, now);
			}
		}
	}

	fn flush_hidden(&self, state: &mut RecorderState, now: DateTime<Utc>) {
		let Some(open) = state.open.as_mut() else {
			return;
		};
		let patch = PageViewPatch::exit(
			elapsed_seconds(open.record.viewed_at, now),
			self.scroll.max(),
		);
		open.exit_marked = true;
		self.dispatcher.enqueue(Write::UpdatePageView {
			key: open.key,
			patch,
		});

		if let Some((session_id, patch)) = self.store.snapshot_patch(now, Some(&open.record.path)) {
			debug!(session_id = %session_id, exit_page = %open.record.path, "provisional flush on hidden");
			self.dispatcher
				.enqueue_resolved(BackendWrite::UpdateSession { session_id, patch });
		}
	}

	/// Terminal writes for unload. The recorder accepts no further signals
	/// afterwards; a second call returns nothing.
	///
	/// A view whose backend id is known gets an exit patch. A view whose insert
	/// has not been confirmed is written whole with its final values.
	pub fn terminal_writes(&self, now: DateTime<Utc>) -> Vec<BackendWrite> {
		let mut state = self.lock();
		if state.terminated {
			return Vec::new();
		}
		state.terminated = true;

		let mut writes = Vec::with_capacity(2);
		let exit_page = match state.open.take() {
			Some(open) => {
				let time_on_page = elapsed_seconds(open.record.viewed_at, now);
				let depth = self.scroll.max();
				match self.dispatcher.view_ids().resolve(open.key) {
					Some(id) => writes.push(BackendWrite::UpdatePageView {
						id,
						patch: PageViewPatch::exit(time_on_page, depth),
					}),
					None => {
						let mut record = open.record.clone();
						record.apply(&PageViewPatch::exit(time_on_page, depth));
						writes.push(BackendWrite::InsertPageView { record });
					}
				}
				Some(open.record.path)
			}
			None => state.last_path.clone(),
		};

		if state.last_session.is_some() {
			if let Some((session_id, patch)) = self.store.snapshot_patch(now, exit_page.as_deref()) {
				writes.push(BackendWrite::UpdateSession { session_id, patch });
			}
		}
		writes
	}

	/// Path of the open page view.
	pub fn current_path(&self) -> Option<String> {
		self.lock().open.as_ref().map(|open| open.record.path.clone())
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, RecorderState> {
		self.state.lock().unwrap_or_else(|e| e.into_inner())
	}
}
