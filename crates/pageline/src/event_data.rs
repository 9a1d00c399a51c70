// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Payload builder for custom events.

use serde_json::{Map, Value};

/// The `data` object attached to an event row.
///
/// ```
/// use pageline::EventData;
///
/// let data = EventData::new()
///     .insert("sponsor_id", "acme")
///     .insert("slot", 2);
/// assert_eq!(data.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventData {
	inner: Map<String, Value>,
}

impl EventData {
	pub fn new() -> Self {
		Self { inner: Map::new() }
	}

	pub fn insert<K, V>(mut self, key: K, value: V) -> Self
	where
		K: Into<String>,
		V: Into<Value>,
	{
		self.inner.insert(key.into(), value.into());
		self
	}

	/// Inserts only when `value` is present.
	pub fn insert_opt<K, V>(self, key: K, value: Option<V>) -> Self
	where
		K: Into<String>,
		V: Into<Value>,
	{
		match value {
			Some(value) => self.insert(key, value),
			None => self,
		}
	}

	/// Keys in `other` win.
	pub fn merge(mut self, other: EventData) -> Self {
		self.inner.extend(other.inner);
		self
	}

	pub fn is_empty(&self) -> bool {
		self.inner.is_empty()
	}

	pub fn len(&self) -> usize {
		self.inner.len()
	}

	pub fn get(&self, key: &str) -> Option<&Value> {
		self.inner.get(key)
	}

	pub fn into_value(self) -> Value {
		Value::Object(self.inner)
	}
}

impl From<EventData> for Value {
	fn from(data: EventData) -> Self {
		data.into_value()
	}
}

/// Non-object JSON is wrapped as `{ "value": ... }` rather than discarded.
impl From<Value> for EventData {
	fn from(value: Value) -> Self {
		match value {
			Value::Object(map) => Self { inner: map },
			Value::Null => Self::new(),
			other => Self::new().insert("value", other),
		}
	}
}
