use std::path::PathBuf;

use albumscan::{Error, Result, cmd, config};
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Command-line arguments for the albumscan application
#[derive(Parser)]
#[command(name = "albumscan")]
#[command(about = "Ingest, normalize and stitch-check photo album scans")]
#[command(version)]
struct Cli {
   #[arg(
      long,
      global = true,
      env = "ALBUMSCAN_CONFIG",
      help = "Config file (default: ~/.albumscan/config.toml)"
   )]
   config: Option<PathBuf>,

   #[command(subcommand)]
   command: Cmd,
}

/// Available subcommands for albumscan
#[derive(Subcommand)]
enum Cmd {
   #[command(about = "Watch for incoming scans until interrupted")]
   Watch {
      #[arg(long, help = "Directory tree to watch (default: watch_root from config)")]
      root: Option<PathBuf>,
   },

   #[command(about = "Print the name the next scan in a directory would get")]
   Next {
      #[arg(help = "Watch directory of one book")]
      dir: PathBuf,

      #[arg(long, help = "Print the rescan slot for this page instead")]
      page: Option<u32>,
   },

   #[command(about = "Check whether the scans of one page stitch together")]
   Validate {
      #[arg(help = "Watch directory of one book")]
      dir: PathBuf,

      #[arg(long, help = "Page number")]
      page: u32,

      #[arg(long, help = "Keep the stitched preview and print its path")]
      keep_preview: bool,
   },

   #[command(about = "List pages awaiting a rescan")]
   Status {
      #[arg(long, help = "JSON output")]
      json: bool,
   },

   #[command(about = "Check external tools and configuration")]
   Doctor,
}

#[tokio::main]
async fn main() {
   tracing_subscriber::fmt()
      .with_env_filter(EnvFilter::from_default_env().add_directive(Level::WARN.into()))
      .init();

   let cli = Cli::parse();
   if let Err(err) = run(cli).await {
      if !matches!(err, Error::Reported { .. }) {
         eprintln!("{err}");
      }
      std::process::exit(err.exit_code());
   }
}

async fn run(cli: Cli) -> Result<()> {
   let cfg = match &cli.config {
      Some(path) => config::init_from(path)?,
      None => config::get(),
   };

   match cli.command {
      Cmd::Watch { root } => cmd::watch::execute(cfg, root).await,
      Cmd::Next { dir, page } => cmd::next::execute(dir, page),
      Cmd::Validate { dir, page, keep_preview } => {
         cmd::validate::execute(cfg, dir, page, keep_preview).await
      },
      Cmd::Status { json } => cmd::status::execute(json),
      Cmd::Doctor => cmd::doctor::execute(cfg).await,
   }
}
