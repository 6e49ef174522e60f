//! One-off stitch validation of a page.

use std::path::PathBuf;

use console::style;

use crate::{
   Result,
   config::Config,
   error::Error,
   install::{self, RetryPolicy},
   sequencer::DirectoryScans,
   stitch::{StitchValidator, StitchVerdict},
   tools::Toolbox,
};

/// Runs the stitch ladder over the scans of `page` in `dir`.
pub async fn execute(cfg: &Config, dir: PathBuf, page: u32, keep_preview: bool) -> Result<()> {
   let files = DirectoryScans::read(&dir)?.page_paths(page);
   if files.is_empty() {
      println!("{}", style(format!("No scans for page {page:02}")).yellow());
      return Ok(());
   }

   let validator = StitchValidator::new(Toolbox::from_config(cfg).stitcher, cfg.stitch_ladder.clone());
   match validator.validate(&files).await? {
      StitchVerdict::Trivial => {
         println!("{} Page {page:02}: single scan, nothing to stitch", style("✓").green());
      },
      StitchVerdict::Stitched { config, preview } => {
         println!(
            "{} Page {page:02}: {} scans stitched {}",
            style("✓").green(),
            files.len(),
            style(format!("({config})")).dim()
         );
         if keep_preview {
            println!("{} {}", style("Preview:").dim(), preview.display());
         } else {
            install::remove_with_retry(&preview, RetryPolicy::immediate(1)).await?;
         }
      },
      StitchVerdict::Failed => {
         println!(
            "{} Page {page:02}: {} scans did not stitch with any of {} configurations",
            style("✗").red(),
            files.len(),
            validator.ladder().len()
         );
         return Err(Error::Reported { message: "stitch failed".to_string(), exit_code: 2 });
      },
   }
   Ok(())
}
