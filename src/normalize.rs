//! In-place normalization of master scans to the canonical lossless encoding.
//!
//! The original file is only ever replaced by a converted copy that was
//! verified pixel-for-pixel; every failure leaves it byte-for-byte intact.

use std::{path::Path, sync::Arc};

use tokio::fs;

use crate::{
   Result,
   error::Error,
   install::{RetryPolicy, rename_with_retry},
   tools::{CanonicalEncoding, EncodingInspector, ImageConverter, PixelComparator},
};

const TEMP_PREFIX: &str = ".albumscan-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizationResult {
   /// Already canonical; nothing was written.
   AlreadyCanonical,
   /// Replaced by a pixel-identical canonical copy.
   Converted,
}

impl NormalizationResult {
   pub const fn needs_conversion(self) -> bool {
      matches!(self, Self::Converted)
   }
}

#[derive(Clone)]
pub struct TiffNormalizer {
   inspector:      Arc<dyn EncodingInspector>,
   converter:      Arc<dyn ImageConverter>,
   comparator:     Arc<dyn PixelComparator>,
   target:         CanonicalEncoding,
   replace_policy: RetryPolicy,
}

impl TiffNormalizer {
   pub fn new(
      inspector: Arc<dyn EncodingInspector>,
      converter: Arc<dyn ImageConverter>,
      comparator: Arc<dyn PixelComparator>,
      target: CanonicalEncoding,
      replace_policy: RetryPolicy,
   ) -> Self {
      Self { inspector, converter, comparator, target, replace_policy }
   }

   /// Whether `path` must be rewritten. An unreadable encoding counts as "yes".
   pub async fn needs_conversion(&self, path: &Path) -> bool {
      match self.inspector.inspect(path).await {
         Ok(attrs) => !self.target.is_satisfied_by(&attrs),
         Err(e) => {
            tracing::warn!("cannot inspect {}: {e}", path.display());
            true
         },
      }
   }

   pub async fn normalize(&self, path: &Path) -> Result<NormalizationResult> {
      if !self.needs_conversion(path).await {
         tracing::debug!("{} already canonical", path.display());
         return Ok(NormalizationResult::AlreadyCanonical);
      }

      let dir = path.parent().unwrap_or_else(|| Path::new("."));
      // Dropping the handle deletes the copy on every early return below.
      let converted = tempfile::Builder::new()
         .prefix(TEMP_PREFIX)
         .suffix(".tif")
         .tempfile_in(dir)?
         .into_temp_path();

      self.converter.convert(path, &converted, &self.target).await?;

      let differing = self.comparator.differing_pixels(path, &converted).await?;
      if differing != 0 {
         return Err(Error::PixelMismatch { path: path.to_path_buf(), differing });
      }

      let converted = converted.keep().map_err(|e| e.error)?;
      if let Err(e) = rename_with_retry(&converted, path, self.replace_policy).await {
         let _ = fs::remove_file(&converted).await;
         return Err(e);
      }
      tracing::info!("normalized {}", path.display());
      Ok(NormalizationResult::Converted)
   }
}

impl std::fmt::Debug for TiffNormalizer {
   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      f.debug_struct("TiffNormalizer")
         .field("target", &self.target)
         .field("replace_policy", &self.replace_policy)
         .finish_non_exhaustive()
   }
}
