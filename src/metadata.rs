//! Descriptive XMP tagging of installed scans.

use std::{collections::BTreeMap, path::Path, sync::Arc};

use crate::{
   Result,
   grammar::ScanIdentity,
   sequencer::DirectoryScans,
   tools::{MetadataTags, MetadataWriter, TagUpdate},
};

/// Page and scan counts of one book as found on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookTotals {
   scans_per_page: BTreeMap<u32, u32>,
}

impl BookTotals {
   pub fn for_scan(scans: &DirectoryScans, identity: &ScanIdentity) -> Self {
      Self { scans_per_page: scans.scans_per_page(&identity.prefix()) }
   }

   /// Highest page number present. Missing pages still count, so the total
   /// matches the physical book rather than the pages scanned so far.
   pub fn total_pages(&self) -> u32 {
      self.scans_per_page.keys().next_back().copied().unwrap_or(0)
   }

   pub fn scans_for(&self, page: u32) -> u32 {
      self.scans_per_page.get(&page).copied().unwrap_or(1)
   }
}

/// Human-readable description, e.g.
/// `EU (1973) - Book 02, Page 05 of 12, Scan S02 of 2 total`.
pub fn describe(identity: &ScanIdentity, totals: &BookTotals) -> String {
   format!(
      "{} ({}) - Book {}, Page {:02} of {:02}, Scan S{:02} of {} total",
      identity.collection,
      identity.years,
      identity.book,
      identity.page,
      totals.total_pages(),
      identity.scan,
      totals.scans_for(identity.page)
   )
}

#[derive(Clone)]
pub struct MetadataTagger {
   writer:  Arc<dyn MetadataWriter>,
   creator: Option<String>,
}

impl MetadataTagger {
   /// An empty `creator` leaves the creator tag alone.
   pub fn new(writer: Arc<dyn MetadataWriter>, creator: &str) -> Self {
      let creator = Some(creator.trim()).filter(|c| !c.is_empty()).map(str::to_string);
      Self { writer, creator }
   }

   /// The write needed to bring `current` up to date, if any.
   pub fn plan(&self, current: &MetadataTags, description: &str) -> Option<TagUpdate> {
      let duplicated = match (&self.creator, &current.creator) {
         (Some(wanted), Some(have)) => have.matches(wanted.as_str()).count() > 1,
         _ => false,
      };
      let creator_ok = self.creator.is_none() || current.creator == self.creator;
      if current.description.as_deref() == Some(description) && creator_ok && !duplicated {
         return None;
      }
      Some(TagUpdate {
         clear_creator: duplicated,
         creator:       self.creator.clone(),
         description:   description.to_string(),
      })
   }

   /// Tags `path` with `description`; returns whether anything was written.
   pub async fn apply(&self, path: &Path, description: &str) -> Result<bool> {
      let current = self.writer.read_tags(path).await?;
      let Some(update) = self.plan(&current, description) else {
         tracing::debug!("metadata of {} already current", path.display());
         return Ok(false);
      };
      self.writer.write_tags(path, &update).await?;
      tracing::debug!("tagged {}: {description}", path.display());
      Ok(true)
   }

   /// Tags the scans whose description changes with the arrival of `identity`.
   ///
   /// The scan count belongs to the page, so every scan of that page is
   /// re-described. A scan that opens a new last page changes the book's page
   /// total, so then the whole book is. Unchanged files cost one read. Every
   /// candidate is tried; the first failure is returned afterwards.
   pub async fn tag_arrival(&self, identity: &ScanIdentity, scans: &DirectoryScans) -> Result<usize> {
      let book = identity.prefix();
      let totals = BookTotals::for_scan(scans, identity);
      let new_last_page = identity.scan == 1 && identity.page == totals.total_pages();

      let mut written = 0;
      let mut failure = None;
      let stale = scans
         .files()
         .iter()
         .filter(|f| f.identity.prefix() == book)
         .filter(|f| new_last_page || f.identity.page == identity.page);
      for file in stale {
         match self.apply(&file.path, &describe(&file.identity, &totals)).await {
            Ok(true) => written += 1,
            Ok(false) => {},
            Err(e) => {
               tracing::warn!("metadata for {} not written: {e}", file.path.display());
               failure.get_or_insert(e);
            },
         }
      }
      failure.map_or(Ok(written), Err)
   }
}

impl std::fmt::Debug for MetadataTagger {
   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      f.debug_struct("MetadataTagger")
         .field("creator", &self.creator)
         .finish_non_exhaustive()
   }
}
