// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Ad-hoc named events attached to the current session.

use std::sync::Arc;

use pageline_core::{EventRecord, PathCategories, SessionId};
use tracing::debug;

use crate::backend::BackendWrite;
use crate::clock::Clock;
use crate::dispatch::Dispatcher;
use crate::event_data::EventData;
use crate::recorder::PageViewRecorder;
use crate::session_store::SessionStore;

pub struct EventEmitter {
	store: Arc<SessionStore>,
	recorder: Arc<PageViewRecorder>,
	dispatcher: Dispatcher,
	categories: PathCategories,
	clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for EventEmitter {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("EventEmitter")
			.field("categories", &self.categories)
			.finish_non_exhaustive()
	}
}

impl EventEmitter {
	pub fn new(
		store: Arc<SessionStore>,
		recorder: Arc<PageViewRecorder>,
		dispatcher: Dispatcher,
		categories: PathCategories,
		clock: Arc<dyn Clock>,
	) -> Self {
		Self {
			store,
			recorder,
			dispatcher,
			categories,
			clock,
		}
	}

	/// Records `name` against the live session.
	///
	/// Without a live session this does nothing and returns false; it never
	/// starts one. `category` defaults to the category of the current path.
	pub fn record(&self, name: &str, category: Option<&str>, data: Option<EventData>) -> bool {
		if let Err(e) = EventRecord::validate_name(name) {
			debug!(error = %e, "event dropped");
			return false;
		}

		let now = self.clock.now();
		let Some(session) = self.store.current(now) else {
			debug!(event = name, "no live session, event dropped");
			return false;
		};

		let path = self.recorder.current_path();
		let category = match category {
			Some(category) => Some(category.to_string()),
			None => path.as_deref().map(|p| self.categories.categorize(p)),
		};

		let mut record = EventRecord::new(session.session_id, name, now);
		record.category = category;
		record.path = path;
		if let Some(data) = data {
			record.data = data.into_value();
		}

		debug!(session_id = %session.session_id, event = name, "event recorded");
		self.dispatcher
			.enqueue_resolved(BackendWrite::InsertEvent { record })
	}

	pub fn sponsor_click(&self, sponsor_id: &str, target: &str) -> bool {
		self.record(
			"sponsor_click",
			Some("sponsors"),
			Some(
				EventData::new()
					.insert("sponsor_id", sponsor_id)
					.insert("target", target),
			),
		)
	}

	pub fn sponsor_impression(&self, sponsor_id: &str) -> bool {
		self.record(
			"sponsor_impression",
			Some("sponsors"),
			Some(EventData::new().insert("sponsor_id", sponsor_id)),
		)
	}

	/// Id of the live session, if any.
	pub fn current_session(&self) -> Option<SessionId> {
		self.store
			.current(self.clock.now())
			.map(|stored| stored.session_id)
	}
}
