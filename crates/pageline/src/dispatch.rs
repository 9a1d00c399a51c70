// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Fire-and-forget write dispatch.
//!
//! Tracking code never awaits a backend call. Writes are pushed onto a bounded
//! channel with `try_send` and a single background task applies them in
//! enqueue order. A full queue drops the write. Backend failures are logged at
//! debug level and dropped; nothing is retried.
//!
//! Page views are addressed by a local [`ViewKey`] until the backend assigns a
//! [`PageViewId`]. The task records the mapping after each insert and resolves
//! later patches through it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use pageline_core::{PageViewId, PageViewPatch, PageViewRecord, ViewKey};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::backend::{BackendWrite, TelemetryBackend};

/// One queued unit of work for the dispatcher task.
#[derive(Debug)]
pub enum Write {
	/// A write that needs no id resolution.
	Resolved(BackendWrite),
	InsertPageView {
		key: ViewKey,
		record: PageViewRecord,
	},
	UpdatePageView {
		key: ViewKey,
		patch: PageViewPatch,
	},
	/// The view is closed; drop its id mapping once earlier writes are done.
	ForgetView(ViewKey),
	/// Completes once every write queued before it has been applied.
	Barrier(oneshot::Sender<()>),
}

/// Shared `ViewKey -> PageViewId` map.
#[derive(Debug, Clone, Default)]
pub struct ViewIds {
	inner: Arc<Mutex<HashMap<ViewKey, PageViewId>>>,
}

impl ViewIds {
	pub fn resolve(&self, key: ViewKey) -> Option<PageViewId> {
		self.inner
			.lock()
			.unwrap_or_else(|e| e.into_inner())
			.get(&key)
			.copied()
	}

	fn insert(&self, key: ViewKey, id: PageViewId) {
		self.inner
			.lock()
			.unwrap_or_else(|e| e.into_inner())
			.insert(key, id);
	}

	fn remove(&self, key: ViewKey) {
		self.inner
			.lock()
			.unwrap_or_else(|e| e.into_inner())
			.remove(&key);
	}

	#[cfg(test)]
	fn len(&self) -> usize {
		self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
	}

	#[cfg(test)]
	fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

/// Handle used by the tracking components to enqueue writes.
#[derive(Debug, Clone)]
pub struct Dispatcher {
	tx: mpsc::Sender<Write>,
	view_ids: ViewIds,
}

impl Dispatcher {
	/// Spawns the dispatcher task on the current tokio runtime.
	pub fn spawn(
		backend: Arc<dyn TelemetryBackend>,
		capacity: usize,
	) -> (Self, JoinHandle<()>) {
		let (tx, rx) = mpsc::channel(capacity.max(1));
		let view_ids = ViewIds::default();
		let worker = DispatchWorker {
			backend,
			view_ids: view_ids.clone(),
		};
		let handle = tokio::spawn(worker.run(rx));
		(Self { tx, view_ids }, handle)
	}

	/// Queues a write without waiting. Returns false if it was dropped.
	pub fn enqueue(&self, write: Write) -> bool {
		match self.tx.try_send(write) {
			Ok(()) => true,
			Err(mpsc::error::TrySendError::Full(write)) => {
				warn!(write = write_kind(&write), "telemetry queue full, dropping write");
				false
			}
			Err(mpsc::error::TrySendError::Closed(_)) => {
				debug!("telemetry dispatcher stopped, dropping write");
				false
			}
		}
	}

	pub fn enqueue_resolved(&self, write: BackendWrite) -> bool {
		self.enqueue(Write::Resolved(write))
	}

	/// Waits until everything queued so far has been applied.
	pub async fn flush(&self) {
		let (tx, rx) = oneshot::channel();
		if self.tx.send(Write::Barrier(tx)).await.is_ok() {
			let _ = rx.await;
		}
	}

	pub fn view_ids(&self) -> &ViewIds {
		&self.view_ids
	}
}

fn write_kind(write: &Write) -> &'static str {
	match write {
		Write::Resolved(w) => w.kind(),
		Write::InsertPageView { .. } => "insert_page_view",
		Write::UpdatePageView { .. } => "update_page_view",
		Write::ForgetView(_) => "forget_view",
		Write::Barrier(_) => "barrier",
	}
}

struct DispatchWorker {
	backend: Arc<dyn TelemetryBackend>,
	view_ids: ViewIds,
}

impl DispatchWorker {
	async fn run(self, mut rx: mpsc::Receiver<Write>) {
		info!("telemetry dispatcher started");
		while let Some(write) = rx.recv().await {
			self.apply(write).await;
		}
		info!("telemetry dispatcher stopped");
	}

	async fn apply(&self, write: Write) {
		match write {
			Write::Resolved(write) => {
				if let Err(e) = self.backend.apply(&write).await {
					debug!(op = write.kind(), error = %e, "telemetry write dropped");
				}
			}
			Write::InsertPageView { key, record } => {
				match self.backend.insert_page_view(&record).await {
					Ok(id) => self.view_ids.insert(key, id),
					Err(e) => {
						debug!(view = %key, path = %record.path, error = %e, "page view insert dropped")
					}
				}
			}
			Write::UpdatePageView { key, patch } => match self.view_ids.resolve(key) {
				Some(id) => {
					if let Err(e) = self.backend.update_page_view(id, &patch).await {
						debug!(page_view_id = %id, error = %e, "page view update dropped");
					}
				}
				None => debug!(view = %key, "page view id unresolved, dropping update"),
			},
			Write::ForgetView(key) => self.view_ids.remove(key),
			Write::Barrier(done) => {
				let _ = done.send(());
			}
		}
	}
}
