//! ExifTool-backed encoding inspection and descriptive tagging.

use std::{
   ffi::OsString,
   path::{Path, PathBuf},
   sync::LazyLock,
};

use async_trait::async_trait;
use regex::Regex;

use super::{
   EncodingAttributes, EncodingInspector, MetadataTags, MetadataWriter, TagUpdate, run_checked,
};
use crate::Result;

static ALPHA_RE: LazyLock<Regex> =
   LazyLock::new(|| Regex::new(r"(?i)(alpha|\b[1-9]\b)").expect("alpha regex is valid"));

#[derive(Debug, Clone)]
pub struct ExifTool {
   program: PathBuf,
}

impl ExifTool {
   pub const fn new(program: PathBuf) -> Self {
      Self { program }
   }

   async fn query(&self, path: &Path, tags: &[&str]) -> Result<String> {
      let mut args: Vec<OsString> = vec!["-s".into()];
      args.extend(tags.iter().map(|t| OsString::from(format!("-{t}"))));
      args.push(path.into());
      let output = run_checked(&self.program, args).await?;
      Ok(String::from_utf8_lossy(&output.stdout).into_owned())
   }
}

#[async_trait]
impl EncodingInspector for ExifTool {
   async fn inspect(&self, path: &Path) -> Result<EncodingAttributes> {
      let report = self.query(path, &["ExtraSamples", "Compression", "Predictor"]).await?;
      Ok(parse_encoding(&report))
   }
}

#[async_trait]
impl MetadataWriter for ExifTool {
   async fn read_tags(&self, path: &Path) -> Result<MetadataTags> {
      let report = self.query(path, &["XMP-dc:Creator", "XMP-dc:Description"]).await?;
      let mut tags = MetadataTags::default();
      for (name, value) in fields(&report) {
         match name {
            "Creator" => tags.creator = Some(value.to_string()),
            "Description" => tags.description = Some(value.to_string()),
            _ => {},
         }
      }
      Ok(tags)
   }

   async fn write_tags(&self, path: &Path, update: &TagUpdate) -> Result<()> {
      if update.clear_creator {
         let args: Vec<OsString> =
            vec!["-overwrite_original".into(), "-XMP-dc:Creator=".into(), path.into()];
         run_checked(&self.program, args).await?;
      }
      let mut args: Vec<OsString> = vec!["-overwrite_original".into()];
      if let Some(creator) = &update.creator {
         args.push(format!("-XMP-dc:Creator={creator}").into());
      }
      args.push(format!("-XMP-dc:Description={}", update.description).into());
      args.push(path.into());
      run_checked(&self.program, args).await?;
      Ok(())
   }
}

/// `Name : Value` pairs from `exiftool -s` output.
fn fields(report: &str) -> impl Iterator<Item = (&str, &str)> {
   report
      .lines()
      .filter_map(|line| line.split_once(':'))
      .map(|(name, value)| (name.trim(), value.trim()))
}

fn parse_encoding(report: &str) -> EncodingAttributes {
   let mut attrs = EncodingAttributes::default();
   for (name, value) in fields(report) {
      match name {
         "ExtraSamples" => attrs.has_alpha = ALPHA_RE.is_match(value),
         "Compression" => attrs.compression = Some(normalize_compression(value)),
         "Predictor" => attrs.predictor = parse_predictor(value),
         _ => {},
      }
   }
   attrs
}

fn normalize_compression(value: &str) -> String {
   value.to_ascii_lowercase()
}

fn parse_predictor(value: &str) -> Option<u8> {
   if let Ok(n) = value.parse() {
      return Some(n);
   }
   match value.to_ascii_lowercase().as_str() {
      "none" => Some(1),
      "horizontal differencing" => Some(2),
      "floating point" => Some(3),
      _ => None,
   }
}
