//! Hands finished scans and stitch previews to an external image viewer.
//!
//! `show` resolves only when the viewer process exits, so a caller can delete
//! the preview afterwards.

use std::{
   path::{Path, PathBuf},
   process::Stdio,
};

use async_trait::async_trait;
use tokio::process::Command;

use super::{Viewer, tool_name};
use crate::{Result, error::Error};

/// Opens files in an external image viewer and waits for it to close.
#[derive(Debug, Clone)]
pub struct CommandViewer {
   program: PathBuf,
}

impl CommandViewer {
   pub const fn new(program: PathBuf) -> Self {
      Self { program }
   }
}

#[async_trait]
impl Viewer for CommandViewer {
   async fn show(&self, path: &Path) -> Result<()> {
      let name = tool_name(&self.program);
      let mut child = Command::new(&self.program)
         .arg(path)
         .stdin(Stdio::null())
         .stdout(Stdio::null())
         .stderr(Stdio::null())
         .spawn()
         .map_err(|e| Error::tool_spawn(&name, e))?;
      let status = child.wait().await?;
      tracing::debug!("{name} closed with {status}");
      Ok(())
   }
}
