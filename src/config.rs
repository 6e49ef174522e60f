//! Configuration for the ingestion pipeline: tool locations, retry policy,
//! stitch ladder and paths.

use std::{
   fs,
   path::{Path, PathBuf},
   sync::OnceLock,
   time::Duration,
};

use directories::BaseDirs;
use figment::{
   Figment,
   providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::{
   error::{ConfigError, Result},
   install::RetryPolicy,
   stitch::{Detector, StitchConfig},
};

static CONFIG: OnceLock<Config> = OnceLock::new();

pub const DEFAULT_INCOMING_NAME: &str = "incoming_scan.tif";

/// Application configuration loaded from config file and environment variables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
   pub watch_root:    Option<PathBuf>,
   pub incoming_name: String,

   pub settle_delay_ms:        u64,
   pub install_attempts:       u32,
   pub install_retry_delay_ms: u64,
   pub max_concurrent_units:   usize,

   pub magick_program:   PathBuf,
   pub exiftool_program: PathBuf,
   pub stitcher_program: PathBuf,
   pub viewer_program:   Option<PathBuf>,

   pub canonical_compression: String,
   pub canonical_predictor:   u8,
   pub stitch_ladder:         Vec<StitchConfig>,

   pub apply_metadata: bool,
   pub creator:        String,

   pub persist_retry_state:      bool,
   pub alert_bell:               bool,
   pub preview_cleanup_attempts: u32,
   pub preview_cleanup_delay_ms: u64,
   pub sweep_on_start:           bool,
}

impl Default for Config {
   fn default() -> Self {
      Self {
         watch_root: None,
         incoming_name: DEFAULT_INCOMING_NAME.to_string(),
         settle_delay_ms: 2000,
         install_attempts: 30,
         install_retry_delay_ms: 1000,
         max_concurrent_units: 4,
         magick_program: PathBuf::from("magick"),
         exiftool_program: PathBuf::from("exiftool"),
         stitcher_program: PathBuf::from("stitch"),
         viewer_program: None,
         canonical_compression: "lzw".to_string(),
         canonical_predictor: 2,
         stitch_ladder: vec![
            StitchConfig { detector: Detector::Sift, confidence_threshold: 0.3 },
            StitchConfig { detector: Detector::Brisk, confidence_threshold: 0.1 },
         ],
         apply_metadata: true,
         creator: String::new(),
         persist_retry_state: false,
         alert_bell: true,
         preview_cleanup_attempts: 60,
         preview_cleanup_delay_ms: 2000,
         sweep_on_start: true,
      }
   }
}

impl Config {
   pub fn load() -> Self {
      Self::load_layered(&ensure_global_config())
   }

   /// Loads defaults, then `path`, then `ALBUMSCAN_*` overrides.
   pub fn load_from(path: &Path) -> Result<Self> {
      let cfg: Self = Figment::from(Serialized::defaults(Self::default()))
         .merge(Toml::file(path))
         .merge(Env::prefixed("ALBUMSCAN_").lowercase(true))
         .extract()
         .map_err(|e| ConfigError::Load(e.to_string()))?;
      cfg.validate()?;
      Ok(cfg)
   }

   fn load_layered(path: &Path) -> Self {
      Self::load_from(path)
         .inspect_err(|e| tracing::warn!("failed to parse config: {e}"))
         .unwrap_or_default()
   }

   fn create_default_config(path: &Path) {
      if let Some(parent) = path.parent() {
         let _ = fs::create_dir_all(parent);
      }
      let default_config = Self::default();
      if let Ok(toml) = toml::to_string_pretty(&default_config) {
         let _ = fs::write(path, toml);
      }
   }

   pub fn validate(&self) -> Result<()> {
      if self.stitch_ladder.is_empty() {
         return Err(ConfigError::Invalid("stitch_ladder must not be empty".to_string()).into());
      }
      if self.install_attempts == 0 {
         return Err(ConfigError::Invalid("install_attempts must be at least 1".to_string()).into());
      }
      if self.max_concurrent_units == 0 {
         return Err(
            ConfigError::Invalid("max_concurrent_units must be at least 1".to_string()).into(),
         );
      }
      if self.incoming_name.trim().is_empty() {
         return Err(ConfigError::Invalid("incoming_name must not be empty".to_string()).into());
      }
      for step in &self.stitch_ladder {
         if !(0.0..=1.0).contains(&step.confidence_threshold) {
            return Err(
               ConfigError::Invalid(format!(
                  "confidence threshold {} for {} is outside 0..=1",
                  step.confidence_threshold, step.detector
               ))
               .into(),
            );
         }
      }
      Ok(())
   }

   pub const fn settle_delay(&self) -> Duration {
      Duration::from_millis(self.settle_delay_ms)
   }

   /// Retry policy shared by the installer and the normalizer's replace step.
   pub const fn lock_retry_policy(&self) -> RetryPolicy {
      RetryPolicy {
         attempts: self.install_attempts,
         delay:    Duration::from_millis(self.install_retry_delay_ms),
      }
   }

   pub const fn preview_cleanup_policy(&self) -> RetryPolicy {
      RetryPolicy {
         attempts: self.preview_cleanup_attempts,
         delay:    Duration::from_millis(self.preview_cleanup_delay_ms),
      }
   }

   /// Resolves the watch root, preferring an explicit override.
   pub fn resolve_watch_root(&self, explicit: Option<PathBuf>) -> Result<PathBuf> {
      explicit
         .or_else(|| self.watch_root.clone())
         .ok_or_else(|| ConfigError::NoWatchRoot.into())
   }
}

/// Returns the global configuration instance
pub fn get() -> &'static Config {
   CONFIG.get_or_init(Config::load)
}

/// Initializes the global configuration from an explicit file.
///
/// Has no effect if the configuration was already initialized.
pub fn init_from(path: &Path) -> Result<&'static Config> {
   let cfg = Config::load_from(path)?;
   Ok(CONFIG.get_or_init(|| cfg))
}

/// Returns the base directory for albumscan configuration and state
pub fn base_dir() -> &'static PathBuf {
   static ONCE: OnceLock<PathBuf> = OnceLock::new();
   ONCE.get_or_init(|| resolve_base_dir(".albumscan"))
}

fn ensure_global_config() -> PathBuf {
   let config_path = config_file_path();
   if !config_path.exists() {
      Config::create_default_config(config_path);
   }
   config_path.clone()
}

fn resolve_base_dir(dir_name: &str) -> PathBuf {
   BaseDirs::new()
      .map(|d| d.home_dir().join(dir_name))
      .or_else(|| {
         std::env::var("HOME")
            .ok()
            .map(|h| PathBuf::from(h).join(dir_name))
      })
      .unwrap_or_else(|| {
         std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(dir_name)
      })
}

macro_rules! define_paths {
   ($($fn_name:ident: $path:literal),* $(,)?) => {
      $(
         pub fn $fn_name() -> &'static PathBuf {
            static ONCE: OnceLock<PathBuf> = OnceLock::new();
            ONCE.get_or_init(|| base_dir().join($path))
         }
      )*
   };
}

define_paths! {
   config_file_path: "config.toml",
   state_dir: "state",
}
