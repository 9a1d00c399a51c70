// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Heartbeat and unload flushing.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::backend::TelemetryBackend;
use crate::clock::Clock;
use crate::recorder::PageViewRecorder;
use crate::spool::ExitSpool;

/// Spawns the heartbeat loop. The first tick fires one full interval after
/// start, not immediately.
pub fn spawn_heartbeat(
	recorder: Arc<PageViewRecorder>,
	clock: Arc<dyn Clock>,
	every: Duration,
) -> JoinHandle<()> {
	tokio::spawn(async move {
		debug!(interval_secs = every.as_secs(), "heartbeat started");
		let start = tokio::time::Instant::now() + every;
		let mut ticker = tokio::time::interval_at(start, every);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
		loop {
			ticker.tick().await;
			recorder.heartbeat(clock.now());
		}
	})
}

/// What an unload call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnloadOutcome {
	/// Unload already ran; nothing was written.
	AlreadyUnloaded,
	/// No page view or session was open.
	Empty,
	/// Terminal writes reached the backend.
	Delivered,
	/// Delivery failed; the undelivered writes stay in the spool for the next
	/// start.
	Spooled,
	/// Delivery failed permanently and the writes were discarded.
	Dropped,
}

/// Terminal flush run once, synchronously, before the host exits.
pub struct ExitFlusher {
	recorder: Arc<PageViewRecorder>,
	backend: Arc<dyn TelemetryBackend>,
	spool: ExitSpool,
	done: AtomicBool,
}

impl std::fmt::Debug for ExitFlusher {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ExitFlusher")
			.field("spool", &self.spool)
			.field("done", &self.done)
			.finish_non_exhaustive()
	}
}

impl ExitFlusher {
	pub fn new(
		recorder: Arc<PageViewRecorder>,
		backend: Arc<dyn TelemetryBackend>,
		spool: ExitSpool,
	) -> Self {
		Self {
			recorder,
			backend,
			spool,
			done: AtomicBool::new(false),
		}
	}

	/// Spools and delivers the terminal writes, blocking the calling thread.
	/// Only the first call does anything.
	pub fn unload(&self, clock: &dyn Clock) -> UnloadOutcome {
		if self.done.swap(true, Ordering::SeqCst) {
			return UnloadOutcome::AlreadyUnloaded;
		}

		let writes = self.recorder.terminal_writes(clock.now());
		if writes.is_empty() {
			return UnloadOutcome::Empty;
		}

		let spooled = match self.spool.append(&writes) {
			Ok(()) => true,
			Err(e) => {
				warn!(error = %e, "failed to spool exit writes");
				false
			}
		};

		let report = self.backend.deliver_blocking(&writes);
		let delivered = report.delivered.min(writes.len());
		match report.error {
			None => {
				info!(writes = writes.len(), "exit writes delivered");
				self.clear_spool();
				UnloadOutcome::Delivered
			}
			Some(e) if e.is_transient() && spooled => {
				let remaining = &writes[delivered..];
				if let Err(e) = self.spool.replace(remaining) {
					warn!(error = %e, "failed to trim exit spool");
				}
				warn!(
					error = %e,
					delivered,
					remaining = remaining.len(),
					"exit delivery failed, kept in spool"
				);
				UnloadOutcome::Spooled
			}
			Some(e) => {
				warn!(error = %e, delivered, writes = writes.len(), "exit delivery failed, writes dropped");
				self.clear_spool();
				UnloadOutcome::Dropped
			}
		}
	}

	pub fn is_done(&self) -> bool {
		self.done.load(Ordering::SeqCst)
	}

	fn clear_spool(&self) {
		if let Err(e) = self.spool.clear() {
			warn!(error = %e, "failed to clear exit spool");
		}
	}
}
