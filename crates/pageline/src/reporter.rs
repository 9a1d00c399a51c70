// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Explicit error reporting for feature code.
//!
//! Errors are recorded as `error` events with the message, a short type name
//! and the `source()` chain. Each session gets a fixed budget of reports so a
//! failing loop cannot flood the backend.

use std::sync::{Arc, Mutex};

use pageline_core::SessionId;
use serde_json::Value;
use tracing::debug;

use crate::emitter::EventEmitter;
use crate::event_data::EventData;

const ERROR_EVENT: &str = "error";

#[derive(Debug, Default)]
struct Budget {
	session: Option<SessionId>,
	used: u32,
}

#[derive(Debug, Clone)]
pub struct ErrorReporter {
	emitter: Arc<EventEmitter>,
	limit: u32,
	budget: Arc<Mutex<Budget>>,
}

impl ErrorReporter {
	pub fn new(emitter: Arc<EventEmitter>, limit: u32) -> Self {
		Self {
			emitter,
			limit,
			budget: Arc::new(Mutex::new(Budget::default())),
		}
	}

	/// Reports an error value. Returns false if it was not recorded.
	pub fn report<E>(&self, error: &E) -> bool
	where
		E: std::error::Error + ?Sized,
	{
		let mut chain = Vec::new();
		let mut source = error.source();
		while let Some(cause) = source {
			chain.push(Value::String(cause.to_string()));
			source = cause.source();
		}
		let data = EventData::new()
			.insert("message", error.to_string())
			.insert("kind", short_type_name::<E>())
			.insert("chain", Value::Array(chain));
		self.submit(data)
	}

	/// Reports a free-form failure with optional extra fields.
	pub fn report_message(&self, message: &str, extra: Option<EventData>) -> bool {
		let data = EventData::new()
			.insert("message", message)
			.insert("kind", "message")
			.insert("chain", Value::Array(Vec::new()));
		let data = match extra {
			Some(extra) => extra.merge(data),
			None => data,
		};
		self.submit(data)
	}

	fn submit(&self, data: EventData) -> bool {
		let Some(session) = self.emitter.current_session() else {
			return false;
		};
		{
			let mut budget = self.budget.lock().unwrap_or_else(|e| e.into_inner());
			if budget.session != Some(session) {
				budget.session = Some(session);
				budget.used = 0;
			}
			if budget.used >= self.limit {
				debug!(session_id = %session, limit = self.limit, "error report limit reached");
				return false;
			}
			budget.used += 1;
		}
		self.emitter.record(ERROR_EVENT, Some(ERROR_EVENT), Some(data))
	}
}

fn short_type_name<E: ?Sized>() -> &'static str {
	let full = std::any::type_name::<E>();
	let base = full.split('<').next().unwrap_or(full);
	base.rsplit("::").next().unwrap_or(base)
}
