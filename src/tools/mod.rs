//! Narrow interfaces over the external programs the pipeline drives.
//!
//! Every pipeline stage talks to one of these traits instead of spawning
//! processes itself, so the ingestion logic can run against fakes.

pub mod exiftool;
pub mod magick;
pub mod stitcher;
pub mod viewer;

use std::{
   ffi::OsStr,
   path::{Path, PathBuf},
   process::{Output, Stdio},
   sync::Arc,
};

use async_trait::async_trait;
use tokio::process::Command;

pub use self::{
   exiftool::ExifTool, magick::Magick, stitcher::CommandStitcher, viewer::CommandViewer,
};
use crate::{
   Result,
   config::Config,
   error::Error,
   stitch::StitchConfig,
};

/// Container-level encoding attributes of a raster file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EncodingAttributes {
   pub has_alpha:   bool,
   pub compression: Option<String>,
   pub predictor:   Option<u8>,
}

/// Encoding every master scan is normalized to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalEncoding {
   pub compression: String,
   pub predictor:   u8,
}

impl CanonicalEncoding {
   pub fn from_config(cfg: &Config) -> Self {
      Self { compression: cfg.canonical_compression.clone(), predictor: cfg.canonical_predictor }
   }

   /// Alpha-free, with the canonical compression and predictor.
   pub fn is_satisfied_by(&self, attrs: &EncodingAttributes) -> bool {
      !attrs.has_alpha
         && attrs
            .compression
            .as_deref()
            .is_some_and(|c| c.eq_ignore_ascii_case(&self.compression))
         && attrs.predictor == Some(self.predictor)
   }
}

impl Default for CanonicalEncoding {
   fn default() -> Self {
      Self { compression: "lzw".to_string(), predictor: 2 }
   }
}

/// Descriptive tags stored alongside each master scan.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MetadataTags {
   pub creator:     Option<String>,
   pub description: Option<String>,
}

/// A metadata write in "overwrite original, preserve other tags" mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagUpdate {
   /// Clear the creator list before assigning it.
   pub clear_creator: bool,
   pub creator:       Option<String>,
   pub description:   String,
}

/// Result of one stitch attempt that completed without a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StitchAttempt {
   /// False when the capability warned that some inputs were left out.
   pub all_included: bool,
}

#[async_trait]
pub trait EncodingInspector: Send + Sync {
   async fn inspect(&self, path: &Path) -> Result<EncodingAttributes>;
}

#[async_trait]
pub trait ImageConverter: Send + Sync {
   /// Writes an alpha-free copy of `source` with the given encoding to `output`.
   async fn convert(&self, source: &Path, output: &Path, target: &CanonicalEncoding) -> Result<()>;
}

#[async_trait]
pub trait PixelComparator: Send + Sync {
   /// Number of pixels that differ between two images; `0` means identical.
   async fn differing_pixels(&self, a: &Path, b: &Path) -> Result<u64>;
}

#[async_trait]
pub trait MetadataWriter: Send + Sync {
   async fn read_tags(&self, path: &Path) -> Result<MetadataTags>;
   async fn write_tags(&self, path: &Path, update: &TagUpdate) -> Result<()>;
}

#[async_trait]
pub trait Stitcher: Send + Sync {
   /// Combines `files` (in order) into `output`. An `Err` is a fault of this
   /// configuration, not of the whole validation.
   async fn stitch(
      &self,
      files: &[PathBuf],
      config: &StitchConfig,
      output: &Path,
   ) -> Result<StitchAttempt>;
}

#[async_trait]
pub trait Viewer: Send + Sync {
   /// Shows `path`, resolving once the viewer has closed.
   async fn show(&self, path: &Path) -> Result<()>;
}

/// Every external capability the pipeline uses.
#[derive(Clone)]
pub struct Toolbox {
   pub inspector:  Arc<dyn EncodingInspector>,
   pub converter:  Arc<dyn ImageConverter>,
   pub comparator: Arc<dyn PixelComparator>,
   pub metadata:   Option<Arc<dyn MetadataWriter>>,
   pub stitcher:   Arc<dyn Stitcher>,
   pub viewer:     Option<Arc<dyn Viewer>>,
}

impl Toolbox {
   /// Process-backed tools as configured.
   pub fn from_config(cfg: &Config) -> Self {
      let magick = Arc::new(Magick::new(cfg.magick_program.clone()));
      let exiftool = Arc::new(ExifTool::new(cfg.exiftool_program.clone()));
      Self {
         inspector:  exiftool.clone(),
         converter:  magick.clone(),
         comparator: magick,
         metadata:   cfg
            .apply_metadata
            .then(|| exiftool as Arc<dyn MetadataWriter>),
         stitcher:   Arc::new(CommandStitcher::new(cfg.stitcher_program.clone())),
         viewer:     cfg
            .viewer_program
            .clone()
            .map(|p| Arc::new(CommandViewer::new(p)) as Arc<dyn Viewer>),
      }
   }
}

impl std::fmt::Debug for Toolbox {
   fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
      f.debug_struct("Toolbox")
         .field("metadata", &self.metadata.is_some())
         .field("viewer", &self.viewer.is_some())
         .finish_non_exhaustive()
   }
}

pub(crate) fn tool_name(program: &Path) -> String {
   program
      .file_stem()
      .and_then(|s| s.to_str())
      .map_or_else(|| program.display().to_string(), str::to_string)
}

/// Runs `program` to completion and captures its output, whatever the status.
pub(crate) async fn run_capture<I, S>(program: &Path, args: I) -> Result<Output>
where
   I: IntoIterator<Item = S>,
   S: AsRef<OsStr>,
{
   let name = tool_name(program);
   tracing::debug!("running {name}");
   Command::new(program)
      .args(args)
      .stdin(Stdio::null())
      .kill_on_drop(true)
      .output()
      .await
      .map_err(|e| Error::tool_spawn(&name, e))
}

/// Like [`run_capture`], but a non-zero exit is an error.
pub(crate) async fn run_checked<I, S>(program: &Path, args: I) -> Result<Output>
where
   I: IntoIterator<Item = S>,
   S: AsRef<OsStr>,
{
   let output = run_capture(program, args).await?;
   if output.status.success() {
      return Ok(output);
   }
   Err(Error::ToolFailed {
      tool:   tool_name(program),
      status: output.status,
      stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
   })
}
