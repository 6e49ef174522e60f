use std::{io, path::PathBuf, process::ExitStatus};

use thiserror::Error;

/// Main error type for the albumscan application.
///
/// Stitch validation failures are not represented here: a page that fails to
/// stitch is a normal outcome that drives the retry state machine.
#[derive(Debug, Error)]
pub enum Error {
   /// I/O error occurred during a file operation.
   #[error("io error: {0}")]
   Io(#[from] io::Error),

   /// Configuration-related error occurred.
   #[error("config error: {0}")]
   Config(#[from] ConfigError),

   /// JSON serialization or deserialization error occurred.
   #[error("json error: {0}")]
   Json(#[from] serde_json::Error),

   /// Filesystem watcher could not be created or attached.
   #[error("watch error: {0}")]
   Watch(#[from] notify::Error),

   /// A filename does not follow the canonical scan grammar.
   #[error("malformed scan name: {name}")]
   MalformedName { name: String },

   /// A watch directory's name cannot supply a canonical filename prefix.
   #[error("watch directory does not name a book: {shown}", shown = .dir.display())]
   MalformedDirectory { dir: PathBuf },

   /// A path stayed locked by another process for every retry attempt.
   #[error(
      "{src_path} -> {dst_path} still locked after {attempts} attempts: {source}",
      src_path = .from.display(),
      dst_path = .to.display()
   )]
   TransientLock {
      from:     PathBuf,
      to:       PathBuf,
      attempts: u32,
      #[source]
      source:   io::Error,
   },

   /// An external tool could not be launched.
   #[error("failed to run {tool}: {source}")]
   ToolSpawn {
      tool:   String,
      #[source]
      source: io::Error,
   },

   /// An external tool exited unsuccessfully.
   #[error("{tool} exited with {status}: {stderr}")]
   ToolFailed { tool: String, status: ExitStatus, stderr: String },

   /// An external tool produced output that could not be interpreted.
   #[error("unexpected output from {tool}: {reason}")]
   ToolOutput { tool: String, reason: String },

   /// A converted image does not match its source pixel-for-pixel.
   #[error("{differing} pixels differ after conversion of {shown}", shown = .path.display())]
   PixelMismatch { path: PathBuf, differing: u64 },

   /// The configured watch root does not exist or is not a directory.
   #[error("watch root not found: {}", .0.display())]
   WatchRootMissing(PathBuf),

   /// Error already reported to the user (e.g., a failed validation printed).
   #[error("{message}")]
   Reported { message: String, exit_code: i32 },
}

impl Error {
   pub(crate) fn tool_spawn(tool: &str, source: io::Error) -> Self {
      Self::ToolSpawn { tool: tool.to_string(), source }
   }

   pub(crate) fn tool_output(tool: &str, reason: impl Into<String>) -> Self {
      Self::ToolOutput { tool: tool.to_string(), reason: reason.into() }
   }

   pub fn exit_code(&self) -> i32 {
      match self {
         Self::Reported { exit_code, .. } => *exit_code,
         Self::WatchRootMissing(_) => 3,
         Self::Config(_) => 4,
         Self::Watch(_) => 5,
         _ => 1,
      }
   }
}

/// Errors raised while resolving or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
   /// Config file or environment overrides failed to parse.
   #[error("failed to load config: {0}")]
   Load(String),

   /// Config parsed but violates a constraint.
   #[error("invalid config: {0}")]
   Invalid(String),

   /// No watch root was given on the command line or in the config file.
   #[error("no watch root configured; pass --root or set watch_root")]
   NoWatchRoot,
}

/// Standard result type using [`enum@Error`] as the default error type
pub type Result<T, E = Error> = std::result::Result<T, E>;
