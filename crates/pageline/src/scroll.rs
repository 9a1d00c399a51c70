// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Maximum scroll depth for the open page view.

use std::sync::atomic::{AtomicU8, Ordering};

/// Lock-free running maximum of scroll depth, in whole percent.
///
/// Observations are called from scroll handlers and must stay cheap: no
/// allocation, no locking, no logging.
#[derive(Debug, Default)]
pub struct ScrollDepth {
	max: AtomicU8,
}

impl ScrollDepth {
	pub fn new() -> Self {
		Self::default()
	}

	/// Records a scroll position and returns the maximum seen so far.
	///
	/// A page that fits in the viewport counts as fully read. Non-finite or
	/// negative geometry is ignored.
	pub fn observe(&self, scrolled: f64, document_height: f64, viewport_height: f64) -> u8 {
		match depth_percent(scrolled, document_height, viewport_height) {
			Some(depth) => {
				let prev = self.max.fetch_max(depth, Ordering::Relaxed);
				prev.max(depth)
			}
			None => self.max(),
		}
	}

	pub fn max(&self) -> u8 {
		self.max.load(Ordering::Relaxed)
	}

	/// Starts a new page view at zero.
	pub fn reset(&self) {
		self.max.store(0, Ordering::Relaxed);
	}
}

fn depth_percent(scrolled: f64, document_height: f64, viewport_height: f64) -> Option<u8> {
	if !(scrolled.is_finite() && document_height.is_finite() && viewport_height.is_finite()) {
		return None;
	}
	if document_height < 0.0 || viewport_height < 0.0 {
		return None;
	}
	let scrollable = document_height - viewport_height;
	if scrollable <= 0.0 {
		return Some(100);
	}
	let ratio = (scrolled / scrollable).clamp(0.0, 1.0);
	Some((ratio * 100.0).round() as u8)
}
