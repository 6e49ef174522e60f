//! One ingestion unit: sentinel file in, exactly one terminal outcome out.
//!
//! Per watch directory the unit runs a two-state machine. In advancing mode
//! the sequencer picks the next slot; while a page awaits a rescan, new files
//! become extra scans of that page until it stitches.

use std::{
   path::{Path, PathBuf},
   sync::Arc,
   time::Duration,
};

use tokio::{fs, time};

use crate::{
   config::Config,
   grammar::{ScanIdentity, is_sentinel},
   install::{self, RetryPolicy},
   metadata::MetadataTagger,
   normalize::TiffNormalizer,
   report::{Outcome, Reporter},
   retry_state::{DirectoryState, RetryStates},
   sequencer::{self, DirectoryScans},
   stitch::{StitchValidator, StitchVerdict},
   tools::{CanonicalEncoding, Toolbox, Viewer},
};

/// What one unit did, as reported to the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitReport {
   /// Canonical name assigned, or the incoming name if none could be.
   pub file:      String,
   pub outcome:   Outcome,
   pub installed: Option<PathBuf>,
}

impl UnitReport {
   fn error(file: impl Into<String>, installed: Option<PathBuf>) -> Self {
      Self { file: file.into(), outcome: Outcome::Error, installed }
   }
}

pub struct Pipeline {
   incoming_name:  String,
   settle_delay:   Duration,
   install_policy: RetryPolicy,
   cleanup_policy: RetryPolicy,
   normalizer:     TiffNormalizer,
   validator:      StitchValidator,
   tagger:         Option<MetadataTagger>,
   viewer:         Option<Arc<dyn Viewer>>,
   retry:          Arc<RetryStates>,
   reporter:       Arc<dyn Reporter>,
}

impl Pipeline {
   pub fn new(
      cfg: &Config,
      tools: Toolbox,
      retry: Arc<RetryStates>,
      reporter: Arc<dyn Reporter>,
   ) -> Self {
      let install_policy = cfg.lock_retry_policy();
      Self {
         incoming_name: cfg.incoming_name.clone(),
         settle_delay: cfg.settle_delay(),
         install_policy,
         cleanup_policy: cfg.preview_cleanup_policy(),
         normalizer: TiffNormalizer::new(
            tools.inspector,
            tools.converter,
            tools.comparator,
            CanonicalEncoding::from_config(cfg),
            install_policy,
         ),
         validator: StitchValidator::new(tools.stitcher, cfg.stitch_ladder.clone()),
         tagger: tools.metadata.map(|w| MetadataTagger::new(w, &cfg.creator)),
         viewer: tools.viewer,
         retry,
         reporter,
      }
   }

   pub fn incoming_name(&self) -> &str {
      &self.incoming_name
   }

   pub fn retry_states(&self) -> &Arc<RetryStates> {
      &self.retry
   }

   /// Whether a created path should start a unit.
   pub fn is_trigger(&self, path: &Path) -> bool {
      is_sentinel(path, &self.incoming_name)
   }

   /// Runs one unit for a created `path`. Returns `None` for non-trigger paths.
   ///
   /// Waits the settle delay first so the writing client can finish flushing.
   pub async fn handle(&self, path: &Path) -> Option<UnitReport> {
      if !self.is_trigger(path) {
         return None;
      }
      time::sleep(self.settle_delay).await;
      // Duplicate notifications for an arrival an earlier unit already took.
      if !fs::try_exists(path).await.unwrap_or(true) {
         tracing::debug!("{} is gone, skipping", path.display());
         return None;
      }
      let report = self.ingest(path).await;
      self.reporter.report(&report.file, report.outcome);
      Some(report)
   }

   async fn ingest(&self, incoming: &Path) -> UnitReport {
      let incoming_file = incoming
         .file_name()
         .map_or_else(|| incoming.display().to_string(), |n| n.to_string_lossy().into_owned());
      let Some(dir) = incoming.parent() else {
         tracing::error!("{} has no parent directory", incoming.display());
         return UnitReport::error(incoming_file, None);
      };

      let slot = match self.retry.state(dir) {
         DirectoryState::Advancing => sequencer::next_scan(dir),
         DirectoryState::AwaitingRescan(page) => sequencer::retry_scan(dir, page),
      };
      let identity = match slot {
         Ok(identity) => identity,
         Err(e) => {
            tracing::error!("cannot name {}: {e}", incoming.display());
            return UnitReport::error(incoming_file, None);
         },
      };
      let name = identity.file_name();
      let dest = dir.join(&name);

      if let Err(e) = install::install(incoming, &dest, self.install_policy).await {
         tracing::error!("install of {name} failed: {e}");
         return UnitReport::error(name, None);
      }
      if let Err(e) = self.normalizer.normalize(&dest).await {
         tracing::error!("normalization of {name} failed: {e}");
         return UnitReport::error(name, Some(dest));
      }

      let scans = match DirectoryScans::read(dir) {
         Ok(scans) => scans,
         Err(e) => {
            tracing::error!("cannot list {}: {e}", dir.display());
            return UnitReport::error(name, Some(dest));
         },
      };
      self.tag(&dest, &identity, &scans).await;

      let verdict = self.validate_page(&scans, &identity).await;
      let outcome = if verdict.is_success() {
         self.retry.resolve(dir, identity.page);
         self.present(dest.clone(), verdict.preview().map(Path::to_path_buf)).await;
         Outcome::Ok
      } else {
         self.retry.await_rescan(dir, identity.page);
         self.reporter.alert();
         Outcome::StitchFailed
      };
      UnitReport { file: name, outcome, installed: Some(dest) }
   }

   async fn validate_page(&self, scans: &DirectoryScans, identity: &ScanIdentity) -> StitchVerdict {
      let files = scans.page_paths(identity.page);
      if files.len() < 2 {
         return StitchVerdict::Trivial;
      }
      tracing::debug!("validating page {} ({} scans)", identity.page, files.len());
      self.validator.validate(&files).await.unwrap_or_else(|e| {
         tracing::error!("stitch validation of page {} could not run: {e}", identity.page);
         StitchVerdict::Failed
      })
   }

   async fn tag(&self, path: &Path, identity: &ScanIdentity, scans: &DirectoryScans) {
      let Some(tagger) = &self.tagger else {
         return;
      };
      match tagger.tag_arrival(identity, scans).await {
         Ok(written) => tracing::debug!("{written} descriptions updated after {}", path.display()),
         Err(_) => tracing::warn!("metadata incomplete after installing {}", path.display()),
      }
   }

   /// Hands the preview (or the installed scan) to the viewer and removes the
   /// preview once the viewer has closed.
   async fn present(&self, installed: PathBuf, preview: Option<PathBuf>) {
      let policy = self.cleanup_policy;
      let Some(viewer) = self.viewer.clone() else {
         if let Some(preview) = preview {
            discard_preview(&preview, policy).await;
         }
         return;
      };
      let shown = preview.clone().unwrap_or(installed);
      tokio::spawn(async move {
         if let Err(e) = viewer.show(&shown).await {
            tracing::warn!("viewer failed for {}: {e}", shown.display());
         }
         if let Some(preview) = preview {
            discard_preview(&preview, policy).await;
         }
      });
   }
}

async fn discard_preview(preview: &Path, policy: RetryPolicy) {
   if let Err(e) = install::remove_with_retry(preview, policy).await {
      tracing::warn!("could not remove preview {}: {e}", preview.display());
   }
}

impl std::fmt::Debug for Pipeline {
   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      f.debug_struct("Pipeline")
         .field("incoming_name", &self.incoming_name)
         .field("settle_delay", &self.settle_delay)
         .field("validator", &self.validator)
         .finish_non_exhaustive()
   }
}
