//! Assignment of the next page/scan slot in a watch directory.

use std::{
   collections::BTreeMap,
   fs,
   path::{Path, PathBuf},
};

use crate::{
   Result,
   grammar::{BookPrefix, COVER_PAGE, ScanIdentity},
};

/// Non-cover pages advance after this many scans unless a rescan is pending.
pub const SCANS_PER_PAGE: u32 = 2;

/// One canonical scan file found in a watch directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanFile {
   pub identity: ScanIdentity,
   pub path:     PathBuf,
}

/// Snapshot of the canonical scan files in one directory.
///
/// Non-canonical names (the incoming sentinel, temporary files, anything a
/// person dropped in by hand) are skipped.
#[derive(Debug, Clone, Default)]
pub struct DirectoryScans {
   files: Vec<ScanFile>,
}

impl DirectoryScans {
   pub fn read(dir: &Path) -> Result<Self> {
      let mut files = Vec::new();
      for entry in fs::read_dir(dir)? {
         let entry = entry?;
         if !entry.file_type()?.is_file() {
            continue;
         }
         let path = entry.path();
         if let Some(identity) = ScanIdentity::from_path(&path) {
            files.push(ScanFile { identity, path });
         }
      }
      files.sort_by(|a, b| {
         a.identity
            .ordering_key()
            .cmp(&b.identity.ordering_key())
            .then_with(|| a.path.cmp(&b.path))
      });
      Ok(Self { files })
   }

   pub fn is_empty(&self) -> bool {
      self.files.is_empty()
   }

   pub fn files(&self) -> &[ScanFile] {
      &self.files
   }

   /// The scan with the greatest `(page, scan)` key.
   pub fn latest(&self) -> Option<&ScanFile> {
      self.files.last()
   }

   /// Scans of one page, ordered by scan number.
   pub fn page(&self, page: u32) -> Vec<&ScanFile> {
      self.files.iter().filter(|f| f.identity.page == page).collect()
   }

   pub fn page_paths(&self, page: u32) -> Vec<PathBuf> {
      self.page(page).into_iter().map(|f| f.path.clone()).collect()
   }

   /// Highest scan number recorded for every page of `book`.
   pub fn scans_per_page(&self, book: &BookPrefix) -> BTreeMap<u32, u32> {
      let mut pages = BTreeMap::new();
      for file in self.files.iter().filter(|f| &f.identity.prefix() == book) {
         let max = pages.entry(file.identity.page).or_insert(0);
         *max = (*max).max(file.identity.scan);
      }
      pages
   }
}

/// Advancement policy applied to the greatest existing scan.
///
/// The cover is a single scan; every other page gets [`SCANS_PER_PAGE`] scans
/// before moving on. Extra scans only come from the retry path.
pub fn advance(last: &ScanIdentity) -> ScanIdentity {
   let prefix = last.prefix();
   if last.page == COVER_PAGE {
      prefix.scan(COVER_PAGE + 1, 1)
   } else if last.scan < SCANS_PER_PAGE {
      prefix.scan(last.page, last.scan + 1)
   } else {
      prefix.scan(last.page + 1, 1)
   }
}

/// Next slot for a directory in advancing mode.
///
/// An empty directory (or one holding only non-canonical names) starts at the
/// cover, `{prefix}_P01_S01.tif`, with the prefix taken from the directory name.
pub fn next_scan(dir: &Path) -> Result<ScanIdentity> {
   let scans = DirectoryScans::read(dir)?;
   match scans.latest() {
      Some(last) => Ok(advance(&last.identity)),
      None => Ok(BookPrefix::from_directory(dir)?.scan(COVER_PAGE, 1)),
   }
}

/// Next slot for a page awaiting a corrective rescan: one past its highest scan.
pub fn retry_scan(dir: &Path, page: u32) -> Result<ScanIdentity> {
   let scans = DirectoryScans::read(dir)?;
   match scans.page(page).last() {
      Some(last) => Ok(last.identity.prefix().scan(page, last.identity.scan + 1)),
      None => Ok(BookPrefix::from_directory(dir)?.scan(page, 1)),
   }
}
