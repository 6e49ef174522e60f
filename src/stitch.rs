//! Stitch validation of multi-scan pages.
//!
//! A page is valid when one configuration of the ladder combines every scan
//! into a single panorama. Configurations are tried in order, most precise
//! first; a partial panorama counts as a failed attempt.

use std::{
   fmt,
   path::{Path, PathBuf},
   sync::Arc,
};

use serde::{Deserialize, Serialize};

use crate::{Result, tools::Stitcher};

const PREVIEW_PREFIX: &str = ".albumscan-preview-";

/// Feature detector used to match overlapping scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Detector {
   Sift,
   Orb,
   Brisk,
   Akaze,
}

impl fmt::Display for Detector {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str(match self {
         Self::Sift => "sift",
         Self::Orb => "orb",
         Self::Brisk => "brisk",
         Self::Akaze => "akaze",
      })
   }
}

/// One rung of the stitch ladder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StitchConfig {
   pub detector:             Detector,
   pub confidence_threshold: f64,
}

impl fmt::Display for StitchConfig {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(f, "{}@{}", self.detector, self.confidence_threshold)
   }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StitchVerdict {
   /// Fewer than two scans; nothing to combine.
   Trivial,
   /// Every scan made it into the panorama written to `preview`.
   Stitched { config: StitchConfig, preview: PathBuf },
   /// The ladder was exhausted without a full-inclusion result.
   Failed,
}

impl StitchVerdict {
   pub const fn is_success(&self) -> bool {
      !matches!(self, Self::Failed)
   }

   pub fn preview(&self) -> Option<&Path> {
      match self {
         Self::Stitched { preview, .. } => Some(preview),
         _ => None,
      }
   }
}

#[derive(Clone)]
pub struct StitchValidator {
   stitcher: Arc<dyn Stitcher>,
   ladder:   Vec<StitchConfig>,
}

impl StitchValidator {
   pub fn new(stitcher: Arc<dyn Stitcher>, ladder: Vec<StitchConfig>) -> Self {
      Self { stitcher, ladder }
   }

   pub fn ladder(&self) -> &[StitchConfig] {
      &self.ladder
   }

   /// Validates the ordered scans of one page.
   ///
   /// Each attempt writes into a hidden preview file next to the scans; only
   /// the successful attempt's preview survives, and the caller owns it.
   pub async fn validate(&self, files: &[PathBuf]) -> Result<StitchVerdict> {
      let Some(first) = files.first() else {
         return Ok(StitchVerdict::Trivial);
      };
      if files.len() < 2 {
         return Ok(StitchVerdict::Trivial);
      }
      let dir = first.parent().unwrap_or_else(|| Path::new("."));

      for config in &self.ladder {
         let preview = tempfile::Builder::new()
            .prefix(PREVIEW_PREFIX)
            .suffix(".tif")
            .tempfile_in(dir)?
            .into_temp_path();

         match self.stitcher.stitch(files, config, &preview).await {
            Ok(attempt) if attempt.all_included => {
               let preview = preview.keep().map_err(|e| e.error)?;
               tracing::info!("stitched {} scans with {config}", files.len());
               return Ok(StitchVerdict::Stitched { config: *config, preview });
            },
            Ok(_) => tracing::warn!("{config}: panorama left out some scans"),
            Err(e) => tracing::warn!("{config}: {e}"),
         }
      }
      Ok(StitchVerdict::Failed)
   }
}

impl fmt::Debug for StitchValidator {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.debug_struct("StitchValidator")
         .field("ladder", &self.ladder)
         .finish_non_exhaustive()
   }
}
