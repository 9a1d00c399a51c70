// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Persistence backend: the three telemetry tables behind a REST interface.
//!
//! The collector talks to the backend through [`TelemetryBackend`]. The
//! production implementation, [`HttpBackend`], speaks the PostgREST dialect
//! used by hosted Postgres services: `POST /rest/v1/{table}` to insert and
//! `PATCH /rest/v1/{table}?{key}=eq.{value}` to update.

use std::time::Duration;

use async_trait::async_trait;
use pageline_core::{
	EventRecord, PageViewId, PageViewPatch, PageViewRecord, SessionId, SessionPatch,
	SessionRecord,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ApiKey;
use crate::error::{Result, TelemetryError};
use crate::http;

/// Timeout for the blocking exit delivery.
pub const BLOCKING_TIMEOUT: Duration = Duration::from_secs(5);

/// A single fully resolved backend write.
///
/// This is also the on-disk format of the exit spool, so variants must stay
/// backwards compatible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum BackendWrite {
	InsertSession {
		record: SessionRecord,
	},
	UpdateSession {
		session_id: SessionId,
		patch: SessionPatch,
	},
	InsertPageView {
		record: PageViewRecord,
	},
	UpdatePageView {
		id: PageViewId,
		patch: PageViewPatch,
	},
	InsertEvent {
		record: EventRecord,
	},
}

impl BackendWrite {
	pub fn kind(&self) -> &'static str {
		match self {
			BackendWrite::InsertSession { .. } => "insert_session",
			BackendWrite::UpdateSession { .. } => "update_session",
			BackendWrite::InsertPageView { .. } => "insert_page_view",
			BackendWrite::UpdatePageView { .. } => "update_page_view",
			BackendWrite::InsertEvent { .. } => "insert_event",
		}
	}
}

/// How far a blocking delivery got. Writes are sent in order, so the first
/// `delivered` writes reached the backend and the rest did not.
#[derive(Debug)]
pub struct DeliveryReport {
	pub delivered: usize,
	/// Why delivery stopped early.
	pub error: Option<TelemetryError>,
}

impl DeliveryReport {
	pub fn complete(delivered: usize) -> Self {
		Self {
			delivered,
			error: None,
		}
	}

	pub fn failed(delivered: usize, error: TelemetryError) -> Self {
		Self {
			delivered,
			error: Some(error),
		}
	}

	pub fn is_complete(&self) -> bool {
		self.error.is_none()
	}
}

/// Table names on the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
	pub sessions: String,
	pub page_views: String,
	pub events: String,
}

impl Default for TableNames {
	fn default() -> Self {
		Self {
			sessions: "analytics_sessions".to_string(),
			page_views: "analytics_page_views".to_string(),
			events: "analytics_events".to_string(),
		}
	}
}

/// Persistence collaborator for sessions, page views and events.
#[async_trait]
pub trait TelemetryBackend: Send + Sync {
	async fn insert_session(&self, record: &SessionRecord) -> Result<()>;
	async fn update_session(&self, session_id: SessionId, patch: &SessionPatch) -> Result<()>;
	/// Inserts a page view and returns the id the backend assigned.
	async fn insert_page_view(&self, record: &PageViewRecord) -> Result<PageViewId>;
	async fn update_page_view(&self, id: PageViewId, patch: &PageViewPatch) -> Result<()>;
	async fn insert_event(&self, record: &EventRecord) -> Result<()>;

	/// Delivers writes in order, blocking the calling thread until done.
	///
	/// Used only on unload, where the process may exit before an async
	/// request resolves. Safe to call from inside an async runtime. Stops at
	/// the first failure and reports how many writes went through.
	fn deliver_blocking(&self, writes: &[BackendWrite]) -> DeliveryReport;

	/// Applies one resolved write through the async path.
	async fn apply(&self, write: &BackendWrite) -> Result<()> {
		match write {
			BackendWrite::InsertSession { record } => self.insert_session(record).await,
			BackendWrite::UpdateSession { session_id, patch } => {
				self.update_session(*session_id, patch).await
			}
			BackendWrite::InsertPageView { record } => self.insert_page_view(record).await.map(|_| ()),
			BackendWrite::UpdatePageView { id, patch } => self.update_page_view(*id, patch).await,
			BackendWrite::InsertEvent { record } => self.insert_event(record).await,
		}
	}
}

#[derive(Debug, Deserialize)]
struct InsertedRow {
	id: i64,
}

/// REST backend for a hosted Postgres service.
#[derive(Clone)]
pub struct HttpBackend {
	base_url: String,
	api_key: ApiKey,
	tables: TableNames,
	client: reqwest::Client,
}

impl HttpBackend {
	pub fn new(base_url: impl Into<String>, api_key: ApiKey, timeout: Duration) -> Result<Self> {
		let base_url = base_url.into().trim_end_matches('/').to_string();
		if base_url.is_empty() {
			return Err(TelemetryError::InvalidBaseUrl);
		}
		if api_key.expose().is_empty() {
			return Err(TelemetryError::InvalidApiKey);
		}

		let client = http::builder(&api_key, timeout).build()?;

		Ok(Self {
			base_url,
			api_key,
			tables: TableNames::default(),
			client,
		})
	}

	pub fn with_tables(mut self, tables: TableNames) -> Self {
		self.tables = tables;
		self
	}

	fn table_url(&self, table: &str) -> String {
		table_url(&self.base_url, table)
	}
}

fn table_url(base_url: &str, table: &str) -> String {
	format!("{base_url}/rest/v1/{table}")
}

fn filter_eq(key: &str, value: impl std::fmt::Display) -> [(String, String); 1] {
	[(key.to_string(), format!("eq.{value}"))]
}

async fn check_response(response: reqwest::Response) -> Result<reqwest::Response> {
	if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
		return Err(TelemetryError::RateLimited {
			retry_after_secs: retry_after(response.headers()),
		});
	}

	if !response.status().is_success() {
		let status = response.status().as_u16();
		let message = response.text().await.unwrap_or_default();
		return Err(TelemetryError::ServerError { status, message });
	}

	Ok(response)
}

fn check_blocking_response(
	response: reqwest::blocking::Response,
) -> Result<reqwest::blocking::Response> {
	if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
		return Err(TelemetryError::RateLimited {
			retry_after_secs: retry_after(response.headers()),
		});
	}

	if !response.status().is_success() {
		let status = response.status().as_u16();
		let message = response.text().unwrap_or_default();
		return Err(TelemetryError::ServerError { status, message });
	}

	Ok(response)
}

fn retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
	headers
		.get(reqwest::header::RETRY_AFTER)
		.and_then(|v| v.to_str().ok())
		.and_then(|s| s.parse().ok())
}

#[async_trait]
impl TelemetryBackend for HttpBackend {
	async fn insert_session(&self, record: &SessionRecord) -> Result<()> {
		let response = self
			.client
			.post(self.table_url(&self.tables.sessions))
			.json(record)
			.send()
			.await?;
		check_response(response).await?;
		debug!(session_id = %record.session_id, "session inserted");
		Ok(())
	}

	async fn update_session(&self, session_id: SessionId, patch: &SessionPatch) -> Result<()> {
		let response = self
			.client
			.patch(self.table_url(&self.tables.sessions))
			.query(&filter_eq("session_id", session_id))
			.json(patch)
			.send()
			.await?;
		check_response(response).await?;
		Ok(())
	}

	async fn insert_page_view(&self, record: &PageViewRecord) -> Result<PageViewId> {
		let response = self
			.client
			.post(self.table_url(&self.tables.page_views))
			.query(&[("select", "id")])
			.header("Prefer", "return=representation")
			.json(record)
			.send()
			.await?;
		let rows: Vec<InsertedRow> = check_response(response).await?.json().await?;
		let id = rows
			.first()
			.map(|row| PageViewId(row.id))
			.ok_or(TelemetryError::UnresolvedPageView)?;
		debug!(page_view_id = %id, path = %record.path, "page view inserted");
		Ok(id)
	}

	async fn update_page_view(&self, id: PageViewId, patch: &PageViewPatch) -> Result<()> {
		let response = self
			.client
			.patch(self.table_url(&self.tables.page_views))
			.query(&filter_eq("id", id))
			.json(patch)
			.send()
			.await?;
		check_response(response).await?;
		Ok(())
	}

	async fn insert_event(&self, record: &EventRecord) -> Result<()> {
		let response = self
			.client
			.post(self.table_url(&self.tables.events))
			.json(record)
			.send()
			.await?;
		check_response(response).await?;
		Ok(())
	}

	fn deliver_blocking(&self, writes: &[BackendWrite]) -> DeliveryReport {
		if writes.is_empty() {
			return DeliveryReport::complete(0);
		}

		let base_url = self.base_url.clone();
		let api_key = self.api_key.clone();
		let tables = self.tables.clone();
		let writes = writes.to_vec();

		// reqwest's blocking client owns a runtime of its own, which panics if
		// created or dropped on an async runtime thread.
		let handle = match std::thread::Builder::new()
			.name("pageline-exit".to_string())
			.spawn(move || send_blocking(&base_url, &api_key, &tables, &writes))
		{
			Ok(handle) => handle,
			Err(e) => return DeliveryReport::failed(0, TelemetryError::BlockingDelivery(e.to_string())),
		};
		handle.join().unwrap_or_else(|_| {
			DeliveryReport::failed(
				0,
				TelemetryError::BlockingDelivery("delivery thread panicked".to_string()),
			)
		})
	}
}

fn send_blocking(
	base_url: &str,
	api_key: &ApiKey,
	tables: &TableNames,
	writes: &[BackendWrite],
) -> DeliveryReport {
	let client = match http::blocking_builder(api_key, BLOCKING_TIMEOUT).build() {
		Ok(client) => client,
		Err(e) => return DeliveryReport::failed(0, e.into()),
	};

	for (delivered, write) in writes.iter().enumerate() {
		let request = match write {
			BackendWrite::InsertSession { record } => client
				.post(table_url(base_url, &tables.sessions))
				.json(record),
			BackendWrite::UpdateSession { session_id, patch } => client
				.patch(table_url(base_url, &tables.sessions))
				.query(&filter_eq("session_id", session_id))
				.json(patch),
			BackendWrite::InsertPageView { record } => client
				.post(table_url(base_url, &tables.page_views))
				.json(record),
			BackendWrite::UpdatePageView { id, patch } => client
				.patch(table_url(base_url, &tables.page_views))
				.query(&filter_eq("id", id))
				.json(patch),
			BackendWrite::InsertEvent { record } => client
				.post(table_url(base_url, &tables.events))
				.json(record),
		};
		let sent = request
			.send()
			.map_err(TelemetryError::from)
			.and_then(check_blocking_response);
		if let Err(e) = sent {
			return DeliveryReport::failed(delivered, e);
		}
		debug!(op = write.kind(), "exit write delivered");
	}

	DeliveryReport::complete(writes.len())
}
