// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Durable queue of unload writes.
//!
//! Terminal writes are appended here, fsync'd, and only then delivered. If the
//! process dies or the delivery fails, the next tracker start replays them.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::backend::BackendWrite;
use crate::error::Result;

pub const EXIT_SPOOL_FILE: &str = "exit_spool.jsonl";

#[derive(Debug, Clone, Default)]
pub struct ExitSpool {
	path: Option<PathBuf>,
}

impl ExitSpool {
	/// Spool file inside `state_dir`.
	pub fn at(state_dir: impl AsRef<Path>) -> Self {
		Self {
			path: Some(state_dir.as_ref().join(EXIT_SPOOL_FILE)),
		}
	}

	/// A spool that stores nothing. Unload still attempts blocking delivery.
	pub fn disabled() -> Self {
		Self { path: None }
	}

	pub fn path(&self) -> Option<&Path> {
		self.path.as_deref()
	}

	pub fn append(&self, writes: &[BackendWrite]) -> Result<()> {
		let Some(path) = &self.path else {
			return Ok(());
		};
		if writes.is_empty() {
			return Ok(());
		}
		if let Some(parent) = path.parent() {
			std::fs::create_dir_all(parent)?;
		}

		let buf = encode(writes)?;
		let mut opts = OpenOptions::new();
		opts.create(true).append(true);
		#[cfg(unix)]
		opts.mode(0o600);
		let mut file = opts.open(path)?;
		file.write_all(buf.as_bytes())?;
		file.sync_all()?;
		Ok(())
	}

	/// Replaces the spool contents with `writes`. The old contents stay
	/// intact until the new file is fully written.
	pub fn replace(&self, writes: &[BackendWrite]) -> Result<()> {
		let Some(path) = &self.path else {
			return Ok(());
		};
		if writes.is_empty() {
			return self.clear();
		}

		let buf = encode(writes)?;
		let tmp = path.with_extension("jsonl.tmp");
		let mut opts = OpenOptions::new();
		opts.create(true).write(true).truncate(true);
		#[cfg(unix)]
		opts.mode(0o600);
		let mut file = opts.open(&tmp)?;
		file.write_all(buf.as_bytes())?;
		file.sync_all()?;
		std::fs::rename(&tmp, path)?;
		Ok(())
	}

	/// Pending writes, oldest first. Lines that fail to parse are skipped.
	pub fn read_all(&self) -> Result<Vec<BackendWrite>> {
		let Some(path) = &self.path else {
			return Ok(Vec::new());
		};
		let file = match File::open(path) {
			Ok(file) => file,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
			Err(e) => return Err(e.into()),
		};

		let mut writes = Vec::new();
		for line in BufReader::new(file).lines() {
			let line = line?;
			if line.trim().is_empty() {
				continue;
			}
			match serde_json::from_str(&line) {
				Ok(write) => writes.push(write),
				Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable exit spool entry"),
			}
		}
		Ok(writes)
	}

	/// Reads every pending write and empties the spool.
	pub fn take(&self) -> Result<Vec<BackendWrite>> {
		let writes = self.read_all()?;
		self.clear()?;
		Ok(writes)
	}

	pub fn clear(&self) -> Result<()> {
		let Some(path) = &self.path else {
			return Ok(());
		};
		match std::fs::remove_file(path) {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(e.into()),
		}
	}
}

fn encode(writes: &[BackendWrite]) -> Result<String> {
	let mut buf = String::new();
	for write in writes {
		buf.push_str(&serde_json::to_string(write)?);
		buf.push('\n');
	}
	Ok(buf)
}
