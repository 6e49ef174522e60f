//! Dry-run of the filename sequencer.

use std::path::PathBuf;

use crate::{Result, sequencer};

/// Prints the name the next arrival in `dir` would receive.
///
/// With `page`, prints the retry slot for that page instead.
pub fn execute(dir: PathBuf, page: Option<u32>) -> Result<()> {
   let identity = match page {
      Some(page) => sequencer::retry_scan(&dir, page)?,
      None => sequencer::next_scan(&dir)?,
   };
   println!("{}", identity.file_name());
   Ok(())
}
