//! Ingestion pipeline for scanned photo-album pages.
//!
//! A sentinel file dropped into a book's watch directory is named, installed,
//! normalized to a canonical lossless TIFF and, once a page has several scans,
//! checked for stitchability. Pages that fail to stitch are reissued until a
//! rescan succeeds.

pub mod cmd;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod grammar;
pub mod install;
pub mod metadata;
pub mod normalize;
pub mod reactor;
pub mod report;
pub mod retry_state;
pub mod sequencer;
pub mod stitch;
pub mod tools;

pub use error::{Error, Result};
