//! Operator-facing status lines and alerts.

use std::fmt;

use console::{Term, style};

/// Terminal result of one ingestion unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
   /// Installed and normalized; no stitch needed or the stitch succeeded.
   Ok,
   /// Sequencing, install or normalization failed; nothing further attempted.
   Error,
   /// Installed and normalized, but the page failed validation.
   StitchFailed,
}

impl fmt::Display for Outcome {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str(match self {
         Self::Ok => "OK",
         Self::Error => "ERROR",
         Self::StitchFailed => "STITCH FAILED",
      })
   }
}

/// Receives exactly one status per completed unit.
pub trait Reporter: Send + Sync {
   fn report(&self, file: &str, outcome: Outcome);

   /// Attention signal distinct from the status line.
   fn alert(&self);
}

/// Colored status lines on stdout, with an optional terminal bell.
#[derive(Debug, Clone)]
pub struct OperatorConsole {
   term: Term,
   bell: bool,
}

impl OperatorConsole {
   pub fn new(bell: bool) -> Self {
      Self { term: Term::stdout(), bell }
   }
}

impl Reporter for OperatorConsole {
   fn report(&self, file: &str, outcome: Outcome) {
      let line = format!("{file} {outcome}");
      let styled = match outcome {
         Outcome::Ok => style(line).green(),
         Outcome::Error => style(line).red(),
         Outcome::StitchFailed => style(line).red().bold(),
      };
      let _ = self.term.write_line(&styled.to_string());
   }

   fn alert(&self) {
      if self.bell {
         let _ = self.term.write_str("\u{7}");
         let _ = self.term.flush();
      }
   }
}
