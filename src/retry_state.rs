//! Per-directory retry state: which page, if any, awaits a corrective rescan.

use std::{
   collections::BTreeMap,
   fs,
   io::Write,
   path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{Result, config};

pub const STATE_FILE: &str = "retry_state.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryState {
   /// New arrivals take the next slot from the sequencer.
   Advancing,
   /// New arrivals become extra scans of this page.
   AwaitingRescan(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRescan {
   pub page:  u32,
   pub since: DateTime<Utc>,
}

/// Retry state of every watch directory.
///
/// The map has its own lock, independent of the per-directory work queues.
/// With a store path, each transition is written through to disk.
#[derive(Debug, Default)]
pub struct RetryStates {
   pending: Mutex<BTreeMap<PathBuf, PendingRescan>>,
   store:   Option<PathBuf>,
}

impl RetryStates {
   pub fn in_memory() -> Self {
      Self::default()
   }

   /// Loads (or starts) a state file at `path`.
   pub fn persistent(path: PathBuf) -> Result<Self> {
      let pending = if path.exists() { load(&path)? } else { BTreeMap::new() };
      if !pending.is_empty() {
         tracing::info!("restored {} pending rescans from {}", pending.len(), path.display());
      }
      Ok(Self { pending: Mutex::new(pending), store: Some(path) })
   }

   pub fn from_config(cfg: &config::Config) -> Result<Self> {
      if cfg.persist_retry_state {
         Self::persistent(default_store_path())
      } else {
         Ok(Self::in_memory())
      }
   }

   pub fn state(&self, dir: &Path) -> DirectoryState {
      self
         .pending
         .lock()
         .get(dir)
         .map_or(DirectoryState::Advancing, |p| DirectoryState::AwaitingRescan(p.page))
   }

   /// Marks `page` of `dir` as awaiting a rescan.
   pub fn await_rescan(&self, dir: &Path, page: u32) {
      let mut pending = self.pending.lock();
      let since = match pending.get(dir) {
         Some(p) if p.page == page => p.since,
         _ => Utc::now(),
      };
      pending.insert(dir.to_path_buf(), PendingRescan { page, since });
      tracing::info!("{}: awaiting rescan of page {page}", dir.display());
      self.write_through(&pending);
   }

   /// Returns `dir` to advancing mode if `page` is the one awaiting a rescan.
   pub fn resolve(&self, dir: &Path, page: u32) -> bool {
      let mut pending = self.pending.lock();
      if pending.get(dir).is_none_or(|p| p.page != page) {
         return false;
      }
      pending.remove(dir);
      tracing::info!("{}: page {page} recovered", dir.display());
      self.write_through(&pending);
      true
   }

   pub fn snapshot(&self) -> BTreeMap<PathBuf, PendingRescan> {
      self.pending.lock().clone()
   }

   fn write_through(&self, pending: &BTreeMap<PathBuf, PendingRescan>) {
      if let Some(path) = &self.store
         && let Err(e) = write_atomic(path, pending)
      {
         tracing::warn!("failed to persist retry state to {}: {e}", path.display());
      }
   }
}

pub fn default_store_path() -> PathBuf {
   config::state_dir().join(STATE_FILE)
}

pub fn load(path: &Path) -> Result<BTreeMap<PathBuf, PendingRescan>> {
   let raw = fs::read_to_string(path)?;
   Ok(serde_json::from_str(&raw)?)
}

fn write_atomic(path: &Path, pending: &BTreeMap<PathBuf, PendingRescan>) -> Result<()> {
   if let Some(parent) = path.parent() {
      fs::create_dir_all(parent)?;
   }
   let tmp_path = path.with_extension("json.tmp");
   let data = serde_json::to_string_pretty(pending)?;
   {
      let mut file = fs::File::create(&tmp_path)?;
      file.write_all(data.as_bytes())?;
      file.sync_all()?;
   }
   fs::rename(&tmp_path, path)?;
   Ok(())
}
