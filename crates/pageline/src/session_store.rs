// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Session lifecycle: resume, create, expire.
//!
//! The store is the only component that applies the idle timeout. It reads the
//! slot on every call so that state written by another tracker sharing the
//! same state directory is honored. Local state always advances; backend
//! writes are enqueued and never awaited.
//!
//! Every write is also kept in memory. When the slot cannot be written, reads
//! that miss the slot fall back to that copy, so an unwritable state directory
//! degrades to an in-memory session instead of a new session per navigation.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use pageline_core::{
	elapsed_seconds, is_bounce, resolve_acquisition, DeviceProfile, SessionId, SessionPatch,
	SessionRecord,
};
use tracing::{debug, info, warn};

use crate::backend::BackendWrite;
use crate::dispatch::Dispatcher;
use crate::navigation::Navigation;
use crate::slot::{SessionSlot, StoredSession};

pub struct SessionStore {
	slot: Arc<dyn SessionSlot>,
	dispatcher: Dispatcher,
	idle_timeout: chrono::Duration,
	local: Mutex<LocalCopy>,
}

/// Write-through copy of the last stored session.
#[derive(Debug, Default)]
struct LocalCopy {
	session: Option<StoredSession>,
	/// Set while the last slot write failed.
	unpersisted: bool,
}

impl std::fmt::Debug for SessionStore {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SessionStore")
			.field("idle_timeout", &self.idle_timeout)
			.finish_non_exhaustive()
	}
}

impl SessionStore {
	pub fn new(
		slot: Arc<dyn SessionSlot>,
		dispatcher: Dispatcher,
		idle_timeout: std::time::Duration,
	) -> Self {
		Self {
			slot,
			dispatcher,
			idle_timeout: chrono::Duration::from_std(idle_timeout)
				.unwrap_or_else(|_| chrono::Duration::minutes(30)),
			local: Mutex::new(LocalCopy::default()),
		}
	}

	/// Returns the live session id, starting a new session if there is none.
	///
	/// An expired session is finalized with its duration measured to its last
	/// activity before the replacement is created.
	pub fn resume_or_create(
		&self,
		now: DateTime<Utc>,
		navigation: &Navigation,
		device: &DeviceProfile,
	) -> SessionId {
		let mut local = self.local.lock().unwrap_or_else(|e| e.into_inner());

		match self.load(&local) {
			Some(mut stored) if stored.is_live(now, self.idle_timeout) => {
				stored.last_activity = now;
				self.persist(&mut local, stored.clone());
				return stored.session_id;
			}
			Some(expired) => self.finalize(&expired),
			None => {}
		}

		let session_id = SessionId::new();
		let acquisition = resolve_acquisition(navigation.context_url(), navigation.referrer.as_deref());
		let record = SessionRecord::start(session_id, now, &navigation.path, device, &acquisition);

		self.persist(
			&mut local,
			StoredSession {
				session_id,
				started_at: now,
				last_activity: now,
				page_count: 0,
				landing_page: navigation.path.clone(),
			},
		);

		info!(
			session_id = %session_id,
			landing_page = %navigation.path,
			device_type = %device.device_type,
			referrer_domain = ?acquisition.referrer_domain,
			"session started"
		);
		self.dispatcher
			.enqueue_resolved(BackendWrite::InsertSession { record });
		session_id
	}

	/// Counts a page view against the stored session.
	///
	/// Returns the updated state, or `None` if no session is stored.
	pub fn record_page_view(&self, now: DateTime<Utc>) -> Option<StoredSession> {
		let mut local = self.local.lock().unwrap_or_else(|e| e.into_inner());

		let mut stored = self.load(&local)?;
		stored.page_count = stored.page_count.saturating_add(1);
		stored.last_activity = now;
		self.persist(&mut local, stored.clone());

		let patch = SessionPatch {
			last_activity: Some(now),
			page_count: Some(stored.page_count),
			duration_seconds: Some(elapsed_seconds(stored.started_at, now)),
			is_bounce: Some(is_bounce(stored.page_count)),
			exit_page: None,
		};
		self.dispatcher.enqueue_resolved(BackendWrite::UpdateSession {
			session_id: stored.session_id,
			patch,
		});
		Some(stored)
	}

	/// The stored session if it is still inside the idle window. Never creates.
	pub fn current(&self, now: DateTime<Utc>) -> Option<StoredSession> {
		let local = self.local.lock().unwrap_or_else(|e| e.into_inner());
		self.load(&local)
			.filter(|stored| stored.is_live(now, self.idle_timeout))
	}

	/// Provisional-close patch for the stored session.
	///
	/// The session stays open: `last_activity` is left alone so the idle rule
	/// still measures from the last navigation. A session already past the
	/// idle window gets its final values instead, with the duration measured
	/// to its last activity.
	pub fn snapshot_patch(
		&self,
		now: DateTime<Utc>,
		exit_page: Option<&str>,
	) -> Option<(SessionId, SessionPatch)> {
		let stored = {
			let local = self.local.lock().unwrap_or_else(|e| e.into_inner());
			self.load(&local)?
		};
		let patch = if stored.is_live(now, self.idle_timeout) {
			SessionPatch {
				last_activity: None,
				page_count: Some(stored.page_count),
				duration_seconds: Some(elapsed_seconds(stored.started_at, now)),
				is_bounce: Some(is_bounce(stored.page_count)),
				exit_page: None,
			}
		} else {
			SessionPatch::finalize(stored.started_at, stored.last_activity, stored.page_count)
		};
		let patch = SessionPatch {
			exit_page: exit_page.map(str::to_string),
			..patch
		};
		Some((stored.session_id, patch))
	}

	fn finalize(&self, expired: &StoredSession) {
		let patch = SessionPatch::finalize(
			expired.started_at,
			expired.last_activity,
			expired.page_count,
		);
		info!(
			session_id = %expired.session_id,
			page_count = expired.page_count,
			duration_seconds = ?patch.duration_seconds,
			"session expired"
		);
		self.dispatcher.enqueue_resolved(BackendWrite::UpdateSession {
			session_id: expired.session_id,
			patch,
		});
	}

	/// The slot wins whenever it has a record. The in-memory copy only stands
	/// in while the slot is unwritable.
	fn load(&self, local: &LocalCopy) -> Option<StoredSession> {
		match self.slot.load() {
			Some(stored) => Some(stored),
			None if local.unpersisted => local.session.clone(),
			None => None,
		}
	}

	fn persist(&self, local: &mut LocalCopy, stored: StoredSession) {
		match self.slot.store(&stored) {
			Ok(()) => {
				debug!(session_id = %stored.session_id, page_count = stored.page_count, "session slot written");
				local.unpersisted = false;
			}
			Err(e) => {
				if !local.unpersisted {
					warn!(session_id = %stored.session_id, error = %e, "failed to persist session slot, keeping session in memory");
				}
				local.unpersisted = true;
			}
		}
		local.session = Some(stored);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::slot::MemorySessionSlot;
	use crate::testing::RecordingBackend;
	use std::sync::atomic::{AtomicBool, Ordering};
	use chrono::{Duration, TimeZone};
	use pageline_core::profile_user_agent;

	const FIREFOX: &str =
		"Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";

	fn t0() -> DateTime<Utc> {
		Utc.with_ymd_and_hms(2026, 5, 4, 8, 0, 0).unwrap()
	}

	/// Slot whose writes fail until `heal` is called; reads always miss.
	#[derive(Default)]
	struct ReadOnlySlot {
		healed: AtomicBool,
		inner: MemorySessionSlot,
	}

	impl ReadOnlySlot {
		fn heal(&self) {
			self.healed.store(true, Ordering::SeqCst);
		}
	}

	impl SessionSlot for ReadOnlySlot {
		fn load(&self) -> Option<StoredSession> {
			self.inner.load()
		}

		fn store(&self, session: &StoredSession) -> crate::error::Result<()> {
			if self.healed.load(Ordering::SeqCst) {
				return self.inner.store(session);
			}
			Err(std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only").into())
		}

		fn clear(&self) -> crate::error::Result<()> {
			self.inner.clear()
		}
	}

	fn store(backend: &Arc<RecordingBackend>) -> (SessionStore, Dispatcher, Arc<MemorySessionSlot>) {
		let (dispatcher, _task) = Dispatcher::spawn(backend.clone(), 64);
		let slot = Arc::new(MemorySessionSlot::new());
		let store = SessionStore::new(
			slot.clone(),
			dispatcher.clone(),
			std::time::Duration::from_secs(30 * 60),
		);
		(store, dispatcher, slot)
	}

	#[tokio::test]
	async fn test_creates_session_with_acquisition_context() {
		let backend = Arc::new(RecordingBackend::new());
		let (store, dispatcher, _slot) = store(&backend);
		let nav = Navigation::new("/events")
			.url("https://example.org/events?utm_source=newsletter&utm_campaign=may")
			.referrer("https://www.google.com/search?q=x");

		let id = store.resume_or_create(t0(), &nav, &profile_user_agent(FIREFOX));
		dispatcher.flush().await;

		let session = backend.session(id).unwrap();
		assert_eq!(session.landing_page, "/events");
		assert_eq!(session.page_count, 0);
		assert!(session.is_bounce);
		assert_eq!(session.browser, "Firefox");
		assert_eq!(session.referrer_domain.as_deref(), Some("google.com"));
		assert_eq!(session.utm_source.as_deref(), Some("newsletter"));
		assert_eq!(session.utm_campaign.as_deref(), Some("may"));
	}

	#[tokio::test]
	async fn test_resumes_within_idle_window() {
		let backend = Arc::new(RecordingBackend::new());
		let (store, dispatcher, slot) = store(&backend);
		let device = DeviceProfile::unknown();

		let first = store.resume_or_create(t0(), &Navigation::new("/"), &device);
		let later = t0() + Duration::minutes(29);
		let second = store.resume_or_create(later, &Navigation::new("/news"), &device);
		dispatcher.flush().await;

		assert_eq!(first, second);
		assert_eq!(slot.load().unwrap().last_activity, later);
		assert_eq!(backend.sessions().len(), 1);
	}

	#[tokio::test]
	async fn test_expired_session_is_finalized_to_last_activity() {
		let backend = Arc::new(RecordingBackend::new());
		let (store, dispatcher, _slot) = store(&backend);
		let device = DeviceProfile::unknown();

		let old = store.resume_or_create(t0(), &Navigation::new("/"), &device);
		store.record_page_view(t0());
		let second_view = t0() + Duration::seconds(90);
		store.resume_or_create(second_view, &Navigation::new("/news"), &device);
		store.record_page_view(second_view);

		let new = store.resume_or_create(
			second_view + Duration::minutes(30),
			&Navigation::new("/jobs"),
			&device,
		);
		dispatcher.flush().await;

		assert_ne!(old, new);
		let finalized = backend.session(old).unwrap();
		assert_eq!(finalized.duration_seconds, 90);
		assert_eq!(finalized.page_count, 2);
		assert!(!finalized.is_bounce);
		assert_eq!(backend.session(new).unwrap().landing_page, "/jobs");
	}

	#[tokio::test]
	async fn test_corrupt_slot_starts_fresh_session() {
		let backend = Arc::new(RecordingBackend::new());
		let (store, dispatcher, slot) = store(&backend);
		slot.set_raw("{not json");

		let id = store.resume_or_create(t0(), &Navigation::new("/"), &DeviceProfile::unknown());
		dispatcher.flush().await;

		assert_eq!(slot.load().unwrap().session_id, id);
		assert_eq!(backend.sessions().len(), 1);
	}

	#[tokio::test]
	async fn test_record_page_view_updates_bounce() {
		let backend = Arc::new(RecordingBackend::new());
		let (store, dispatcher, _slot) = store(&backend);
		let id = store.resume_or_create(t0(), &Navigation::new("/"), &DeviceProfile::unknown());

		assert_eq!(store.record_page_view(t0()).unwrap().page_count, 1);
		dispatcher.flush().await;
		assert!(backend.session(id).unwrap().is_bounce);

		assert_eq!(
			store
				.record_page_view(t0() + Duration::seconds(5))
				.unwrap()
				.page_count,
			2
		);
		dispatcher.flush().await;
		let session = backend.session(id).unwrap();
		assert!(!session.is_bounce);
		assert_eq!(session.duration_seconds, 5);
	}

	#[tokio::test]
	async fn test_current_never_creates() {
		let backend = Arc::new(RecordingBackend::new());
		let (store, _dispatcher, slot) = store(&backend);

		assert!(store.current(t0()).is_none());
		assert!(slot.load().is_none());

		store.resume_or_create(t0(), &Navigation::new("/"), &DeviceProfile::unknown());
		assert!(store.current(t0() + Duration::minutes(10)).is_some());
		assert!(store.current(t0() + Duration::minutes(31)).is_none());
	}

	#[tokio::test]
	async fn test_snapshot_patch_keeps_last_activity() {
		let backend = Arc::new(RecordingBackend::new());
		let (store, _dispatcher, slot) = store(&backend);
		store.resume_or_create(t0(), &Navigation::new("/"), &DeviceProfile::unknown());
		store.record_page_view(t0());

		let (_, patch) = store
			.snapshot_patch(t0() + Duration::seconds(42), Some("/"))
			.unwrap();
		assert_eq!(patch.duration_seconds, Some(42));
		assert_eq!(patch.exit_page.as_deref(), Some("/"));
		assert_eq!(patch.is_bounce, Some(true));
		assert!(patch.last_activity.is_none());
		assert_eq!(slot.load().unwrap().last_activity, t0());
	}

	#[tokio::test]
	async fn test_unwritable_slot_keeps_session_in_memory() {
		let backend = Arc::new(RecordingBackend::new());
		let (dispatcher, _task) = Dispatcher::spawn(backend.clone(), 64);
		let store = SessionStore::new(
			Arc::new(ReadOnlySlot::default()),
			dispatcher.clone(),
			std::time::Duration::from_secs(30 * 60),
		);
		let device = DeviceProfile::unknown();

		let mut ids = Vec::new();
		for (i, path) in ["/news", "/news/a", "/blog"].into_iter().enumerate() {
			let now = t0() + Duration::seconds(5 * i as i64);
			ids.push(store.resume_or_create(now, &Navigation::new(path), &device));
			assert_eq!(store.record_page_view(now).unwrap().page_count, i as u32 + 1);
		}
		dispatcher.flush().await;

		assert!(ids.iter().all(|id| *id == ids[0]));
		assert_eq!(backend.sessions().len(), 1);
		let session = backend.session(ids[0]).unwrap();
		assert_eq!(session.page_count, 3);
		assert_eq!(session.duration_seconds, 10);
		assert!(!session.is_bounce);
		assert!(store.current(t0() + Duration::seconds(10)).is_some());
	}

	#[tokio::test]
	async fn test_unwritable_slot_still_expires() {
		let backend = Arc::new(RecordingBackend::new());
		let (dispatcher, _task) = Dispatcher::spawn(backend.clone(), 64);
		let store = SessionStore::new(
			Arc::new(ReadOnlySlot::default()),
			dispatcher.clone(),
			std::time::Duration::from_secs(30 * 60),
		);
		let device = DeviceProfile::unknown();

		let old = store.resume_or_create(t0(), &Navigation::new("/"), &device);
		store.record_page_view(t0());
		let later = t0() + Duration::minutes(45);
		let new = store.resume_or_create(later, &Navigation::new("/jobs"), &device);
		dispatcher.flush().await;

		assert_ne!(old, new);
		assert_eq!(backend.session(old).unwrap().duration_seconds, 0);
		assert_eq!(store.record_page_view(later).unwrap().session_id, new);
	}

	#[tokio::test]
	async fn test_slot_wins_once_writable_again() {
		let backend = Arc::new(RecordingBackend::new());
		let (dispatcher, _task) = Dispatcher::spawn(backend.clone(), 64);
		let slot = Arc::new(ReadOnlySlot::default());
		let store = SessionStore::new(
			slot.clone(),
			dispatcher.clone(),
			std::time::Duration::from_secs(30 * 60),
		);
		let device = DeviceProfile::unknown();

		let id = store.resume_or_create(t0(), &Navigation::new("/"), &device);
		slot.heal();
		let later = t0() + Duration::seconds(30);
		assert_eq!(store.resume_or_create(later, &Navigation::new("/a"), &device), id);
		assert_eq!(slot.load().unwrap().last_activity, later);
	}

	#[tokio::test]
	async fn test_snapshot_of_expired_session_finalizes_to_last_activity() {
		let backend = Arc::new(RecordingBackend::new());
		let (store, _dispatcher, _slot) = store(&backend);
		store.resume_or_create(t0(), &Navigation::new("/"), &DeviceProfile::unknown());
		store.record_page_view(t0());
		store.record_page_view(t0() + Duration::seconds(75));

		let (_, patch) = store
			.snapshot_patch(t0() + Duration::hours(2), Some("/news"))
			.unwrap();
		assert_eq!(patch.duration_seconds, Some(75));
		assert_eq!(patch.last_activity, Some(t0() + Duration::seconds(75)));
		assert_eq!(patch.page_count, Some(2));
		assert_eq!(patch.is_bounce, Some(false));
		assert_eq!(patch.exit_page.as_deref(), Some("/news"));
	}
}
