//! Long-running watch command.
//!
//! Starts the reactor on the watch root and runs until interrupted. An
//! interrupt stops new arrivals from being picked up; units already running
//! finish before the command returns.

use std::{path::PathBuf, sync::Arc};

use console::style;
use tokio::signal;
use tokio_util::sync::CancellationToken;

use crate::{
   Result,
   config::Config,
   dispatch::Pipeline,
   error::Error,
   reactor::Reactor,
   report::OperatorConsole,
   retry_state::RetryStates,
   tools::Toolbox,
};

/// Executes the watch command.
pub async fn execute(cfg: &Config, root: Option<PathBuf>) -> Result<()> {
   let root = cfg.resolve_watch_root(root)?;
   if !root.is_dir() {
      return Err(Error::WatchRootMissing(root));
   }

   let retry = Arc::new(RetryStates::from_config(cfg)?);
   let reporter = Arc::new(OperatorConsole::new(cfg.alert_bell));
   let pipeline = Arc::new(Pipeline::new(cfg, Toolbox::from_config(cfg), retry, reporter));

   println!("{} {} in:", style("Watching for").bold(), style(&cfg.incoming_name).cyan());
   println!("{}", style(root.display()).dim());

   let shutdown = CancellationToken::new();
   let interrupt = shutdown.clone();
   tokio::spawn(async move {
      if signal::ctrl_c().await.is_ok() {
         println!("{}", style("Stopping, finishing in-flight scans...").yellow());
         interrupt.cancel();
      }
   });

   let reactor = Reactor::new(pipeline, root, cfg.max_concurrent_units, cfg.sweep_on_start);
   let units = reactor.run(shutdown).await?;
   println!("{}", style(format!("Stopped after {units} arrivals")).dim());
   Ok(())
}
