//! System health check command.
//!
//! Verifies that the external tools can be launched and that the configured
//! directories exist.

use std::path::Path;

use console::style;
use tokio::process::Command;

use crate::{Result, config::{self, Config}};

/// Executes the doctor command.
pub async fn execute(cfg: &Config) -> Result<()> {
   println!("{}\n", style("albumscan Doctor").bold());

   check_dir("Config", config::base_dir());
   match &cfg.watch_root {
      Some(root) => check_dir("Watch root", root),
      None => println!("{} Watch root: {}", style("○").yellow(), style("not configured").dim()),
   }

   println!();

   let mut all_good = true;
   all_good &= check_tool("Image conversion", &cfg.magick_program, "-version").await;
   all_good &= check_tool("Metadata", &cfg.exiftool_program, "-ver").await;
   all_good &= check_tool("Stitcher", &cfg.stitcher_program, "--help").await;
   match &cfg.viewer_program {
      Some(viewer) => {
         let exists = viewer_launchable(viewer);
         let symbol = if exists { style("✓").green() } else { style("○").yellow() };
         println!("{} Viewer: {}", symbol, style(viewer.display()).dim());
      },
      None => println!("{} Viewer: {}", style("○").yellow(), style("disabled").dim()),
   }

   println!(
      "\n{} {} ({} stitch configurations, {} install attempts)",
      style("Policy:").dim(),
      cfg.incoming_name,
      cfg.stitch_ladder.len(),
      cfg.install_attempts
   );

   if all_good {
      println!("\n{}", style("✓ All checks passed! Ready to scan.").green().bold());
   } else {
      println!("\n{}", style("✗ Some tools are missing. Check the *_program settings.").red().bold());
   }
   Ok(())
}

fn check_dir(name: &str, path: &Path) {
   let symbol = if path.is_dir() { style("✓").green() } else { style("✗").red() };
   println!("{} {}: {}", symbol, name, style(path.display()).dim());
}

/// Launches `program probe` and reports whether it started at all.
async fn check_tool(name: &str, program: &Path, probe: &str) -> bool {
   let launched = Command::new(program).arg(probe).output().await;
   let (symbol, detail) = match &launched {
      Ok(out) => {
         let first = String::from_utf8_lossy(&out.stdout).lines().next().unwrap_or_default().to_string();
         (style("✓").green(), first)
      },
      Err(e) => (style("✗").red(), e.to_string()),
   };
   println!("{} {}: {} {}", symbol, name, program.display(), style(detail).dim());
   launched.is_ok()
}

/// An explicit path that exists, or a name `PATH` resolves (honoring `PATHEXT` on Windows).
fn viewer_launchable(viewer: &Path) -> bool {
   viewer.exists() || which::which(viewer).is_ok()
}
