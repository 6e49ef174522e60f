//! Panorama stitching through an external command.
//!
//! The command is invoked as
//! `stitch --detector <d> --confidence-threshold <t> --output <file> <inputs...>`.
//! It must exit zero and leave a non-empty output file; a partial panorama is
//! reported through its warning text rather than the exit status.

use std::{
   ffi::OsString,
   path::{Path, PathBuf},
};

use async_trait::async_trait;
use tokio::fs;

use super::{StitchAttempt, Stitcher, run_checked, tool_name};
use crate::{Result, error::Error, stitch::StitchConfig};

/// Warning emitted when the stitched panorama leaves out some inputs.
pub const PARTIAL_PANORAMA_WARNING: &str = "not all images are included in the final panorama";

#[derive(Debug, Clone)]
pub struct CommandStitcher {
   program: PathBuf,
}

impl CommandStitcher {
   pub const fn new(program: PathBuf) -> Self {
      Self { program }
   }
}

#[async_trait]
impl Stitcher for CommandStitcher {
   async fn stitch(
      &self,
      files: &[PathBuf],
      config: &StitchConfig,
      output: &Path,
   ) -> Result<StitchAttempt> {
      let mut args: Vec<OsString> = vec![
         "--detector".into(),
         config.detector.to_string().into(),
         "--confidence-threshold".into(),
         config.confidence_threshold.to_string().into(),
         "--output".into(),
         output.into(),
      ];
      args.extend(files.iter().map(OsString::from));

      let result = run_checked(&self.program, args).await?;
      let produced = fs::metadata(output).await.is_ok_and(|m| m.len() > 0);
      if !produced {
         return Err(Error::tool_output(&tool_name(&self.program), "no panorama was written"));
      }

      let mut log = String::from_utf8_lossy(&result.stdout).into_owned();
      log.push_str(&String::from_utf8_lossy(&result.stderr));
      Ok(StitchAttempt { all_included: !mentions_partial_panorama(&log) })
   }
}

pub fn mentions_partial_panorama(log: &str) -> bool {
   log.to_lowercase().contains(PARTIAL_PANORAMA_WARNING)
}
