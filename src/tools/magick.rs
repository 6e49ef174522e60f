//! ImageMagick-backed conversion and pixel comparison.

use std::{
   ffi::OsString,
   path::{Path, PathBuf},
};

use async_trait::async_trait;

use super::{CanonicalEncoding, ImageConverter, PixelComparator, run_capture, run_checked, tool_name};
use crate::{Result, error::Error};

#[derive(Debug, Clone)]
pub struct Magick {
   program: PathBuf,
}

impl Magick {
   pub const fn new(program: PathBuf) -> Self {
      Self { program }
   }
}

#[async_trait]
impl ImageConverter for Magick {
   async fn convert(&self, source: &Path, output: &Path, target: &CanonicalEncoding) -> Result<()> {
      let args: Vec<OsString> = vec![
         source.into(),
         "-alpha".into(),
         "off".into(),
         "-compress".into(),
         target.compression.as_str().into(),
         "-define".into(),
         format!("tiff:predictor={}", target.predictor).into(),
         output.into(),
      ];
      run_checked(&self.program, args).await?;
      Ok(())
   }
}

#[async_trait]
impl PixelComparator for Magick {
   async fn differing_pixels(&self, a: &Path, b: &Path) -> Result<u64> {
      let args: Vec<OsString> = vec![
         "compare".into(),
         "-metric".into(),
         "AE".into(),
         a.into(),
         b.into(),
         "null:".into(),
      ];
      // compare exits 1 when the images differ; only 2 and up is a failure.
      let output = run_capture(&self.program, args).await?;
      if output.status.code().is_none_or(|code| code > 1) {
         return Err(Error::ToolFailed {
            tool:   tool_name(&self.program),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
         });
      }
      parse_absolute_error(&String::from_utf8_lossy(&output.stderr))
         .ok_or_else(|| Error::tool_output(&tool_name(&self.program), "no AE metric in output"))
   }
}

/// Reads the leading absolute-error count, e.g. `0`, `1534 (0.0023)` or `1.2e+06`.
fn parse_absolute_error(stderr: &str) -> Option<u64> {
   let token = stderr.split_whitespace().next()?;
   if let Ok(count) = token.parse::<u64>() {
      return Some(count);
   }
   let value: f64 = token.parse().ok()?;
   (value.is_finite() && value >= 0.0).then(|| value.round() as u64)
}
