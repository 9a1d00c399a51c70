// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core types for pageline session and page-view telemetry.
//!
//! This crate holds the data model shared by the collector and anything that
//! reads the persisted rows, plus the two pure enrichment functions:
//!
//! - [`profile_user_agent`]: device class, browser and OS from a user-agent
//! - [`resolve_acquisition`]: UTM parameters and referrer domain from a
//!   navigation URL
//!
//! Nothing in here performs I/O.

pub mod context;
pub mod device;
pub mod error;
pub mod event;
pub mod page_view;
pub mod session;

pub use context::{
	resolve_acquisition, AcquisitionContext, PathCategories, UtmParams, DEFAULT_PATH_PREFIXES,
};
pub use device::{profile_user_agent, DeviceProfile, DeviceType};
pub use error::{CoreError, Result};
pub use event::EventRecord;
pub use page_view::{PageViewId, PageViewPatch, PageViewRecord, ViewKey};
pub use session::{elapsed_seconds, is_bounce, SessionId, SessionPatch, SessionRecord};
