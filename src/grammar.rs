//! Canonical scan filename grammar.
//!
//! A canonical name looks like `EU_1973_B02_P05_S02.tif`: collection, year or
//! year range, two-digit book (or the no-book sentinel `∅`), page and scan.
//! Matching is case-insensitive. Names that do not match are ignored by every
//! other stage of the pipeline.

use std::{
   fmt,
   path::Path,
   str::FromStr,
   sync::LazyLock,
};

use regex::Regex;

use crate::error::{Error, Result};

/// Book token used by albums that are not part of a numbered series.
pub const NO_BOOK: &str = "∅";

/// Page 1 is the album cover and always has exactly one scan.
pub const COVER_PAGE: u32 = 1;

const DIRECTORY_SUFFIX: &str = "_archive";

static SCAN_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
   Regex::new(
      r"(?i)^(?P<collection>[A-Z]{2,})_(?P<years>\d{4}(?:-\d{4})?)_B(?P<book>\d{2}|∅)_P(?P<page>\d{2,})_S(?P<scan>\d{2,})\.tif$",
   )
   .expect("scan name regex is valid")
});

static PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
   Regex::new(r"(?i)^(?P<collection>[A-Z]{2,})_(?P<years>\d{4}(?:-\d{4})?)_B(?P<book>\d{2}|∅)$")
      .expect("prefix regex is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Book {
   Numbered(u8),
   Unnumbered,
}

impl Book {
   fn parse(token: &str) -> Option<Self> {
      if token == NO_BOOK {
         return Some(Self::Unnumbered);
      }
      token.parse().ok().map(Self::Numbered)
   }
}

impl fmt::Display for Book {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      match self {
         Self::Numbered(n) => write!(f, "{n:02}"),
         Self::Unnumbered => f.write_str(NO_BOOK),
      }
   }
}

/// The `COLLECTION_YEARS_Bxx` part shared by every scan of one book.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BookPrefix {
   pub collection: String,
   pub years:      String,
   pub book:       Book,
}

impl BookPrefix {
   pub fn parse(prefix: &str) -> Option<Self> {
      let caps = PREFIX_RE.captures(prefix)?;
      Some(Self {
         collection: caps["collection"].to_string(),
         years:      caps["years"].to_string(),
         book:       Book::parse(&caps["book"])?,
      })
   }

   /// Derives the prefix from a watch directory name such as `EU_1973_B02_Archive`.
   pub fn from_directory(dir: &Path) -> Result<Self> {
      dir.file_name()
         .and_then(|n| n.to_str())
         .map(strip_directory_suffix)
         .and_then(Self::parse)
         .ok_or_else(|| Error::MalformedDirectory { dir: dir.to_path_buf() })
   }

   pub fn scan(&self, page: u32, scan: u32) -> ScanIdentity {
      ScanIdentity {
         collection: self.collection.clone(),
         years: self.years.clone(),
         book: self.book,
         page,
         scan,
      }
   }

   /// Key grouping every scan of one physical book, e.g. `EU_1973_B02`.
   pub fn book_key(&self) -> String {
      self.to_string()
   }
}

impl fmt::Display for BookPrefix {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(f, "{}_{}_B{}", self.collection, self.years, self.book)
   }
}

/// Identity of one scan file, derived losslessly from its canonical name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScanIdentity {
   pub collection: String,
   pub years:      String,
   pub book:       Book,
   pub page:       u32,
   pub scan:       u32,
}

impl ScanIdentity {
   /// Parses a bare filename; `None` means the name is not canonical.
   pub fn parse(name: &str) -> Option<Self> {
      let caps = SCAN_NAME_RE.captures(name)?;
      Some(Self {
         collection: caps["collection"].to_string(),
         years:      caps["years"].to_string(),
         book:       Book::parse(&caps["book"])?,
         page:       caps["page"].parse().ok()?,
         scan:       caps["scan"].parse().ok()?,
      })
   }

   pub fn from_path(path: &Path) -> Option<Self> {
      path.file_name().and_then(|n| n.to_str()).and_then(Self::parse)
   }

   pub fn prefix(&self) -> BookPrefix {
      BookPrefix {
         collection: self.collection.clone(),
         years:      self.years.clone(),
         book:       self.book,
      }
   }

   /// Canonical filename with page and scan zero-padded to two digits.
   pub fn file_name(&self) -> String {
      self.to_string()
   }

   /// Numeric `(page, scan)` ordering key.
   pub const fn ordering_key(&self) -> (u32, u32) {
      (self.page, self.scan)
   }

   pub const fn is_cover(&self) -> bool {
      self.page == COVER_PAGE
   }
}

impl fmt::Display for ScanIdentity {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      write!(
         f,
         "{}_{}_B{}_P{:02}_S{:02}.tif",
         self.collection, self.years, self.book, self.page, self.scan
      )
   }
}

impl FromStr for ScanIdentity {
   type Err = Error;

   fn from_str(s: &str) -> Result<Self> {
      Self::parse(s).ok_or_else(|| Error::MalformedName { name: s.to_string() })
   }
}

fn strip_directory_suffix(name: &str) -> &str {
   let split = name.len().saturating_sub(DIRECTORY_SUFFIX.len());
   match name.get(split..) {
      Some(tail) if tail.eq_ignore_ascii_case(DIRECTORY_SUFFIX) => &name[..split],
      _ => name,
   }
}

/// Returns whether `path` names the incoming-scan sentinel (case-insensitive).
pub fn is_sentinel(path: &Path, incoming_name: &str) -> bool {
   path.file_name()
      .and_then(|n| n.to_str())
      .is_some_and(|n| n.eq_ignore_ascii_case(incoming_name))
}
