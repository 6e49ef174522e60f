#![allow(dead_code)]

use std::{
   collections::{HashMap, VecDeque},
   fs,
   path::{Path, PathBuf},
   sync::{
      Arc,
      atomic::{AtomicUsize, Ordering},
   },
};

use albumscan::{
   Result,
   config::Config,
   dispatch::Pipeline,
   report::{Outcome, Reporter},
   retry_state::RetryStates,
   stitch::StitchConfig,
   tools::{
      CanonicalEncoding, EncodingAttributes, EncodingInspector, ImageConverter, MetadataTags,
      MetadataWriter, PixelComparator, StitchAttempt, Stitcher, TagUpdate, Toolbox, Viewer,
   },
};
use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;

/// Fake rasters are `HEADER\npixels`; `CANON` marks the canonical encoding.
pub const CANONICAL_HEADER: &str = "CANON";
pub const RAW_HEADER: &str = "RAW";

pub fn raster(header: &str, pixels: &str) -> Vec<u8> {
   format!("{header}\n{pixels}").into_bytes()
}

fn split(path: &Path) -> std::io::Result<(String, String)> {
   let raw = fs::read_to_string(path)?;
   let (header, pixels) = raw.split_once('\n').unwrap_or((raw.as_str(), ""));
   Ok((header.to_string(), pixels.to_string()))
}

#[derive(Default)]
pub struct FakeInspector {
   pub calls: AtomicUsize,
}

#[async_trait]
impl EncodingInspector for FakeInspector {
   async fn inspect(&self, path: &Path) -> Result<EncodingAttributes> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      let (header, _) = split(path)?;
      Ok(if header == CANONICAL_HEADER {
         EncodingAttributes {
            has_alpha:   false,
            compression: Some("lzw".to_string()),
            predictor:   Some(2),
         }
      } else {
         EncodingAttributes { has_alpha: true, compression: None, predictor: None }
      })
   }
}

/// Rewrites the header, optionally corrupting the pixels.
#[derive(Default)]
pub struct FakeConverter {
   pub calls:   AtomicUsize,
   pub corrupt: bool,
}

#[async_trait]
impl ImageConverter for FakeConverter {
   async fn convert(&self, source: &Path, output: &Path, _target: &CanonicalEncoding) -> Result<()> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      let (_, pixels) = split(source)?;
      let pixels = if self.corrupt { format!("{pixels}!") } else { pixels };
      fs::write(output, raster(CANONICAL_HEADER, &pixels))?;
      Ok(())
   }
}

/// Counts differing pixel characters.
#[derive(Default)]
pub struct FakeComparator;

#[async_trait]
impl PixelComparator for FakeComparator {
   async fn differing_pixels(&self, a: &Path, b: &Path) -> Result<u64> {
      let (_, pa) = split(a)?;
      let (_, pb) = split(b)?;
      let common = pa.chars().zip(pb.chars()).filter(|(x, y)| x != y).count();
      let extra = pa.chars().count().abs_diff(pb.chars().count());
      Ok((common + extra) as u64)
   }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StitchStep {
   Full,
   Partial,
   Fault,
}

/// Answers attempts from a script; an empty script stitches fully.
#[derive(Default)]
pub struct FakeStitcher {
   script:    Mutex<VecDeque<StitchStep>>,
   pub calls: Mutex<Vec<(Vec<PathBuf>, StitchConfig)>>,
}

impl FakeStitcher {
   pub fn push(&self, steps: &[StitchStep]) {
      self.script.lock().extend(steps.iter().copied());
   }

   /// Every rung of the default ladder fails with a partial panorama.
   pub fn fail_next_page(&self) {
      self.push(&[StitchStep::Partial, StitchStep::Partial]);
   }

   pub fn call_count(&self) -> usize {
      self.calls.lock().len()
   }
}

#[async_trait]
impl Stitcher for FakeStitcher {
   async fn stitch(
      &self,
      files: &[PathBuf],
      config: &StitchConfig,
      output: &Path,
   ) -> Result<StitchAttempt> {
      self.calls.lock().push((files.to_vec(), *config));
      let step = self.script.lock().pop_front().unwrap_or(StitchStep::Full);
      match step {
         StitchStep::Fault => Err(albumscan::Error::ToolOutput {
            tool:   "stitch".to_string(),
            reason: "not enough keypoints".to_string(),
         }),
         StitchStep::Full | StitchStep::Partial => {
            fs::write(output, b"panorama")?;
            Ok(StitchAttempt { all_included: step == StitchStep::Full })
         },
      }
   }
}

#[derive(Default)]
pub struct FakeMetadata {
   pub writes: Mutex<Vec<(PathBuf, TagUpdate)>>,
   tags:       Mutex<HashMap<PathBuf, MetadataTags>>,
}

impl FakeMetadata {
   pub fn description(&self, path: &Path) -> Option<String> {
      self.tags.lock().get(path).and_then(|t| t.description.clone())
   }
}

#[async_trait]
impl MetadataWriter for FakeMetadata {
   async fn read_tags(&self, path: &Path) -> Result<MetadataTags> {
      Ok(self.tags.lock().get(path).cloned().unwrap_or_default())
   }

   async fn write_tags(&self, path: &Path, update: &TagUpdate) -> Result<()> {
      self.writes.lock().push((path.to_path_buf(), update.clone()));
      self.tags.lock().insert(path.to_path_buf(), MetadataTags {
         creator:     update.creator.clone(),
         description: Some(update.description.clone()),
      });
      Ok(())
   }
}

#[derive(Default)]
pub struct FakeViewer {
   pub shown: Mutex<Vec<PathBuf>>,
}

#[async_trait]
impl Viewer for FakeViewer {
   async fn show(&self, path: &Path) -> Result<()> {
      self.shown.lock().push(path.to_path_buf());
      Ok(())
   }
}

#[derive(Default)]
pub struct RecordingReporter {
   pub lines:  Mutex<Vec<(String, Outcome)>>,
   pub alerts: AtomicUsize,
}

impl RecordingReporter {
   pub fn outcomes(&self) -> Vec<(String, Outcome)> {
      self.lines.lock().clone()
   }

   pub fn alert_count(&self) -> usize {
      self.alerts.load(Ordering::SeqCst)
   }
}

impl Reporter for RecordingReporter {
   fn report(&self, file: &str, outcome: Outcome) {
      self.lines.lock().push((file.to_string(), outcome));
   }

   fn alert(&self) {
      self.alerts.fetch_add(1, Ordering::SeqCst);
   }
}

/// Fakes wired into one pipeline, kept around for assertions.
pub struct Harness {
   pub inspector: Arc<FakeInspector>,
   pub converter: Arc<FakeConverter>,
   pub stitcher:  Arc<FakeStitcher>,
   pub metadata:  Arc<FakeMetadata>,
   pub viewer:    Arc<FakeViewer>,
   pub reporter:  Arc<RecordingReporter>,
   pub retry:     Arc<RetryStates>,
   pub pipeline:  Arc<Pipeline>,
}

impl Harness {
   pub fn new() -> Self {
      Self::build(&test_config(), false)
   }

   pub fn with_viewer() -> Self {
      Self::build(&test_config(), true)
   }

   pub fn build(cfg: &Config, with_viewer: bool) -> Self {
      let inspector = Arc::new(FakeInspector::default());
      let converter = Arc::new(FakeConverter::default());
      let stitcher = Arc::new(FakeStitcher::default());
      let metadata = Arc::new(FakeMetadata::default());
      let viewer = Arc::new(FakeViewer::default());
      let reporter = Arc::new(RecordingReporter::default());
      let retry = Arc::new(RetryStates::in_memory());
      let tools = Toolbox {
         inspector:  inspector.clone(),
         converter:  converter.clone(),
         comparator: Arc::new(FakeComparator),
         metadata:   Some(metadata.clone() as Arc<dyn MetadataWriter>),
         stitcher:   stitcher.clone(),
         viewer:     with_viewer.then(|| viewer.clone() as Arc<dyn Viewer>),
      };
      let pipeline = Arc::new(Pipeline::new(cfg, tools, retry.clone(), reporter.clone()));
      Self { inspector, converter, stitcher, metadata, viewer, reporter, retry, pipeline }
   }

   /// Drops a raw scan as the sentinel and runs one unit for it.
   pub async fn ingest(&self, dir: &Path, pixels: &str) -> albumscan::dispatch::UnitReport {
      let sentinel = drop_scan(dir, pixels);
      self
         .pipeline
         .handle(&sentinel)
         .await
         .expect("sentinel path is a trigger")
   }
}

/// Zero delays and few attempts so tests never sleep.
pub fn test_config() -> Config {
   Config {
      settle_delay_ms: 0,
      install_attempts: 3,
      install_retry_delay_ms: 0,
      preview_cleanup_attempts: 2,
      preview_cleanup_delay_ms: 0,
      creator: "Test Archivist".to_string(),
      ..Config::default()
   }
}

pub fn album(tmp: &TempDir, name: &str) -> PathBuf {
   let dir = tmp.path().join(name);
   fs::create_dir_all(&dir).unwrap();
   dir
}

pub fn drop_scan(dir: &Path, pixels: &str) -> PathBuf {
   let path = dir.join("incoming_scan.tif");
   fs::write(&path, raster(RAW_HEADER, pixels)).unwrap();
   path
}

/// Canonical scan names in `dir`, sorted.
pub fn scan_names(dir: &Path) -> Vec<String> {
   let mut names: Vec<String> = fs::read_dir(dir)
      .unwrap()
      .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
      .filter(|n| !n.starts_with('.'))
      .collect();
   names.sort();
   names
}
