// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! The durable "current session" slot.
//!
//! Exactly one session record lives in the slot at a time. Anything that
//! cannot be read back as a [`StoredSession`] is treated as absent, which makes
//! the next navigation start a fresh session.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use pageline_core::SessionId;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;

/// File name of the slot inside the state directory.
pub const SESSION_SLOT_FILE: &str = "current_session.json";

/// Locally persisted session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
	pub session_id: SessionId,
	pub started_at: DateTime<Utc>,
	pub last_activity: DateTime<Utc>,
	pub page_count: u32,
	pub landing_page: String,
}

impl StoredSession {
	/// Whether the session is still inside the idle window at `now`.
	pub fn is_live(&self, now: DateTime<Utc>, idle_timeout: chrono::Duration) -> bool {
		now - self.last_activity < idle_timeout
	}
}

/// Storage for the single current-session record.
pub trait SessionSlot: Send + Sync {
	/// Returns the stored session, or `None` if absent or unreadable.
	fn load(&self) -> Option<StoredSession>;
	fn store(&self, session: &StoredSession) -> Result<()>;
	fn clear(&self) -> Result<()>;
}

/// In-process slot for embedders without a state directory.
#[derive(Debug, Default)]
pub struct MemorySessionSlot {
	inner: Mutex<Option<String>>,
}

impl MemorySessionSlot {
	pub fn new() -> Self {
		Self::default()
	}

	/// Replaces the raw slot contents, bypassing serialization.
	pub fn set_raw(&self, raw: impl Into<String>) {
		*self.inner.lock().unwrap_or_else(|e| e.into_inner()) = Some(raw.into());
	}
}

impl SessionSlot for MemorySessionSlot {
	fn load(&self) -> Option<StoredSession> {
		let raw = self.inner.lock().unwrap_or_else(|e| e.into_inner()).clone()?;
		parse_slot(&raw)
	}

	fn store(&self, session: &StoredSession) -> Result<()> {
		let raw = serde_json::to_string(session)?;
		*self.inner.lock().unwrap_or_else(|e| e.into_inner()) = Some(raw);
		Ok(())
	}

	fn clear(&self) -> Result<()> {
		*self.inner.lock().unwrap_or_else(|e| e.into_inner()) = None;
		Ok(())
	}
}

/// Slot backed by a JSON file, replaced atomically on every write.
#[derive(Debug, Clone)]
pub struct FileSessionSlot {
	path: PathBuf,
}

impl FileSessionSlot {
	/// Slot file inside `state_dir`. The directory is created on first write.
	pub fn in_dir(state_dir: impl AsRef<Path>) -> Self {
		Self {
			path: state_dir.as_ref().join(SESSION_SLOT_FILE),
		}
	}

	pub fn path(&self) -> &Path {
		&self.path
	}
}

impl SessionSlot for FileSessionSlot {
	fn load(&self) -> Option<StoredSession> {
		match std::fs::read_to_string(&self.path) {
			Ok(raw) => parse_slot(&raw),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
			Err(e) => {
				warn!(path = %self.path.display(), error = %e, "failed to read session slot");
				None
			}
		}
	}

	fn store(&self, session: &StoredSession) -> Result<()> {
		if let Some(parent) = self.path.parent() {
			std::fs::create_dir_all(parent)?;
		}
		let tmp = self.path.with_extension("json.tmp");
		{
			let mut file = std::fs::File::create(&tmp)?;
			serde_json::to_writer(&mut file, session)?;
			file.flush()?;
			file.sync_all()?;
		}
		std::fs::rename(&tmp, &self.path)?;
		Ok(())
	}

	fn clear(&self) -> Result<()> {
		match std::fs::remove_file(&self.path) {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(e.into()),
		}
	}
}

fn parse_slot(raw: &str) -> Option<StoredSession> {
	match serde_json::from_str(raw) {
		Ok(session) => Some(session),
		Err(e) => {
			debug!(error = %e, "discarding unreadable session slot");
			None
		}
	}
}
