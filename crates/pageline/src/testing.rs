// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Test doubles for code that embeds the tracker.
//!
//! [`RecordingBackend`] keeps the three tables in memory and applies patches
//! the way the real backend would, so tests can assert on final row state as
//! well as on the raw write log.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use pageline_core::{
	EventRecord, PageViewId, PageViewPatch, PageViewRecord, SessionId, SessionPatch,
	SessionRecord,
};

use crate::backend::{BackendWrite, DeliveryReport, TelemetryBackend};
use crate::error::{Result, TelemetryError};

pub use crate::clock::ManualClock;

#[derive(Debug, Default)]
struct Tables {
	sessions: HashMap<SessionId, SessionRecord>,
	page_views: BTreeMap<PageViewId, PageViewRecord>,
	events: Vec<EventRecord>,
	log: Vec<BackendWrite>,
	blocking: Vec<BackendWrite>,
}

/// In-memory backend that records every write.
#[derive(Debug)]
pub struct RecordingBackend {
	tables: Mutex<Tables>,
	next_id: AtomicI64,
	failing: AtomicBool,
	/// Blocking writes still accepted before the backend starts failing.
	blocking_budget: AtomicUsize,
}

impl Default for RecordingBackend {
	fn default() -> Self {
		Self::new()
	}
}

impl RecordingBackend {
	pub fn new() -> Self {
		Self {
			tables: Mutex::new(Tables::default()),
			next_id: AtomicI64::new(1),
			failing: AtomicBool::new(false),
			blocking_budget: AtomicUsize::new(usize::MAX),
		}
	}

	/// Blocking delivery accepts `writes` more writes, then fails with a 503.
	pub fn fail_blocking_after(&self, writes: usize) {
		self.blocking_budget.store(writes, Ordering::SeqCst);
	}

	/// While set, every write fails with a 503.
	pub fn set_failing(&self, failing: bool) {
		self.failing.store(failing, Ordering::SeqCst);
	}

	pub fn session(&self, id: SessionId) -> Option<SessionRecord> {
		self.lock().sessions.get(&id).cloned()
	}

	pub fn sessions(&self) -> Vec<SessionRecord> {
		let mut sessions: Vec<_> = self.lock().sessions.values().cloned().collect();
		sessions.sort_by_key(|s| s.started_at);
		sessions
	}

	pub fn page_view(&self, id: PageViewId) -> Option<PageViewRecord> {
		self.lock().page_views.get(&id).cloned()
	}

	/// Page views in insertion order.
	pub fn page_views(&self) -> Vec<(PageViewId, PageViewRecord)> {
		self.lock()
			.page_views
			.iter()
			.map(|(id, view)| (*id, view.clone()))
			.collect()
	}

	pub fn events(&self) -> Vec<EventRecord> {
		self.lock().events.clone()
	}

	/// Every async write that succeeded, in order.
	pub fn writes(&self) -> Vec<BackendWrite> {
		self.lock().log.clone()
	}

	/// Every write delivered through the blocking exit path, in order.
	pub fn blocking_writes(&self) -> Vec<BackendWrite> {
		self.lock().blocking.clone()
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, Tables> {
		self.tables.lock().unwrap_or_else(|e| e.into_inner())
	}

	fn check(&self) -> Result<()> {
		if self.failing.load(Ordering::SeqCst) {
			return Err(TelemetryError::ServerError {
				status: 503,
				message: "recording backend set to fail".to_string(),
			});
		}
		Ok(())
	}

	fn record(&self, write: &BackendWrite) -> Option<PageViewId> {
		let mut tables = self.lock();
		let assigned = match write {
			BackendWrite::InsertSession { record } => {
				tables.sessions.insert(record.session_id, record.clone());
				None
			}
			BackendWrite::UpdateSession { session_id, patch } => {
				if let Some(session) = tables.sessions.get_mut(session_id) {
					session.apply(patch);
				}
				None
			}
			BackendWrite::InsertPageView { record } => {
				let id = PageViewId(self.next_id.fetch_add(1, Ordering::SeqCst));
				tables.page_views.insert(id, record.clone());
				Some(id)
			}
			BackendWrite::UpdatePageView { id, patch } => {
				if let Some(view) = tables.page_views.get_mut(id) {
					view.apply(patch);
				}
				None
			}
			BackendWrite::InsertEvent { record } => {
				tables.events.push(record.clone());
				None
			}
		};
		tables.log.push(write.clone());
		assigned
	}
}

#[async_trait]
impl TelemetryBackend for RecordingBackend {
	async fn insert_session(&self, record: &SessionRecord) -> Result<()> {
		self.check()?;
		self.record(&BackendWrite::InsertSession {
			record: record.clone(),
		});
		Ok(())
	}

	async fn update_session(&self, session_id: SessionId, patch: &SessionPatch) -> Result<()> {
		self.check()?;
		self.record(&BackendWrite::UpdateSession {
			session_id,
			patch: patch.clone(),
		});
		Ok(())
	}

	async fn insert_page_view(&self, record: &PageViewRecord) -> Result<PageViewId> {
		self.check()?;
		self.record(&BackendWrite::InsertPageView {
			record: record.clone(),
		})
		.ok_or(TelemetryError::UnresolvedPageView)
	}

	async fn update_page_view(&self, id: PageViewId, patch: &PageViewPatch) -> Result<()> {
		self.check()?;
		self.record(&BackendWrite::UpdatePageView {
			id,
			patch: patch.clone(),
		});
		Ok(())
	}

	async fn insert_event(&self, record: &EventRecord) -> Result<()> {
		self.check()?;
		self.record(&BackendWrite::InsertEvent {
			record: record.clone(),
		});
		Ok(())
	}

	fn deliver_blocking(&self, writes: &[BackendWrite]) -> DeliveryReport {
		if let Err(e) = self.check() {
			return DeliveryReport::failed(0, e);
		}
		for (delivered, write) in writes.iter().enumerate() {
			let spent = self
				.blocking_budget
				.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1));
			if spent.is_err() {
				return DeliveryReport::failed(
					delivered,
					TelemetryError::ServerError {
						status: 503,
						message: "unavailable".to_string(),
					},
				);
			}
			self.record(write);
			self.lock().blocking.push(write.clone());
		}
		DeliveryReport::complete(writes.len())
	}
}
