//! Retry-state listing.
//!
//! Shows the directories whose last page failed validation, as persisted by
//! a watch process with `persist_retry_state` enabled.

use console::style;
use serde::Serialize;

use crate::{Result, retry_state};

#[derive(Serialize)]
struct Row {
   directory: String,
   page:      u32,
   since:     String,
}

/// Executes the status command.
pub fn execute(json: bool) -> Result<()> {
   let path = retry_state::default_store_path();
   let pending = if path.exists() { retry_state::load(&path)? } else { Default::default() };
   let rows: Vec<Row> = pending
      .into_iter()
      .map(|(dir, p)| Row {
         directory: dir.display().to_string(),
         page:      p.page,
         since:     p.since.to_rfc3339(),
      })
      .collect();

   if json {
      println!("{}", serde_json::to_string_pretty(&rows)?);
      return Ok(());
   }

   if rows.is_empty() {
      println!("{}", style("No pages awaiting a rescan").dim());
      return Ok(());
   }

   println!("{}", style("Awaiting rescan:").bold());
   println!();
   for row in rows {
      println!(
         "  {} {} {}",
         style("●").red(),
         row.directory,
         style(format!("(page {:02}, since {})", row.page, row.since)).dim()
      );
   }
   Ok(())
}
