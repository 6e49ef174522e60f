mod support;

use std::{fs, path::PathBuf, time::Duration};

use albumscan::{
   config::Config, reactor::Reactor, report::Outcome, retry_state::DirectoryState, sequencer,
};
use support::{CANONICAL_HEADER, Harness, album, drop_scan, raster, scan_names, test_config};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const ALBUM: &str = "EU_1973_B02_Archive";

#[tokio::test]
async fn fresh_album_with_stitchable_page() {
   let tmp = TempDir::new().unwrap();
   let dir = album(&tmp, ALBUM);
   let h = Harness::new();

   let first = h.ingest(&dir, "cover").await;
   assert_eq!((first.file.as_str(), first.outcome), ("EU_1973_B02_P01_S01.tif", Outcome::Ok));

   let second = h.ingest(&dir, "p2-left").await;
   assert_eq!((second.file.as_str(), second.outcome), ("EU_1973_B02_P02_S01.tif", Outcome::Ok));
   assert_eq!(h.stitcher.call_count(), 0);

   let third = h.ingest(&dir, "p2-right").await;
   assert_eq!((third.file.as_str(), third.outcome), ("EU_1973_B02_P02_S02.tif", Outcome::Ok));
   assert_eq!(h.stitcher.call_count(), 1);

   assert_eq!(scan_names(&dir), [
      "EU_1973_B02_P01_S01.tif",
      "EU_1973_B02_P02_S01.tif",
      "EU_1973_B02_P02_S02.tif",
   ]);
   assert_eq!(sequencer::next_scan(&dir).unwrap().file_name(), "EU_1973_B02_P03_S01.tif");
}

#[tokio::test]
async fn fresh_album_with_unstitchable_page() {
   let tmp = TempDir::new().unwrap();
   let dir = album(&tmp, ALBUM);
   let h = Harness::new();

   h.ingest(&dir, "cover").await;
   h.ingest(&dir, "p2-left").await;
   h.stitcher.fail_next_page();
   let third = h.ingest(&dir, "p2-right").await;

   assert_eq!((third.file.as_str(), third.outcome), ("EU_1973_B02_P02_S02.tif", Outcome::StitchFailed));
   assert_eq!(h.retry.state(&dir), DirectoryState::AwaitingRescan(2));
   assert_eq!(h.reporter.outcomes().len(), 3);
   assert_eq!(h.reporter.alert_count(), 1);
}

/// Polls until `n` status lines were reported.
async fn wait_for_outcomes(h: &Harness, n: usize) -> Vec<(String, Outcome)> {
   for _ in 0..500 {
      let outcomes = h.reporter.outcomes();
      if outcomes.len() >= n {
         return outcomes;
      }
      tokio::time::sleep(Duration::from_millis(10)).await;
   }
   h.reporter.outcomes()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reactor_ingests_leftover_and_new_arrivals() {
   let tmp = TempDir::new().unwrap();
   let dir = album(&tmp, ALBUM);
   // The settle delay lets the test finish writing before the unit reads.
   let cfg = Config { settle_delay_ms: 200, ..test_config() };
   let h = Harness::build(&cfg, false);

   // Present before the reactor starts; only the startup sweep can find it.
   drop_scan(&dir, "cover");

   let shutdown = CancellationToken::new();
   let reactor = Reactor::new(h.pipeline.clone(), tmp.path().to_path_buf(), 2, true);
   let task = tokio::spawn(reactor.run(shutdown.clone()));

   let outcomes = wait_for_outcomes(&h, 1).await;
   assert_eq!(outcomes, vec![("EU_1973_B02_P01_S01.tif".to_string(), Outcome::Ok)]);

   // Give the watcher a moment to attach before the next arrival.
   tokio::time::sleep(Duration::from_millis(100)).await;
   drop_scan(&dir, "p2-left");
   let outcomes = wait_for_outcomes(&h, 2).await;
   assert_eq!(outcomes.get(1), Some(&("EU_1973_B02_P02_S01.tif".to_string(), Outcome::Ok)));

   shutdown.cancel();
   let units = task.await.unwrap().unwrap();
   assert!(units >= 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn relative_root_keeps_one_state_per_directory() {
   let tmp = TempDir::new().unwrap();
   let dir = album(&tmp, &format!("albums/{ALBUM}"));
   for (name, pixels) in [("EU_1973_B02_P01_S01.tif", "cover"), ("EU_1973_B02_P02_S01.tif", "p2-left")] {
      fs::write(dir.join(name), raster(CANONICAL_HEADER, pixels)).unwrap();
   }
   let cfg = Config { settle_delay_ms: 200, ..test_config() };
   let h = Harness::build(&cfg, false);
   h.stitcher.fail_next_page();

   // Left over from a previous run; found by the sweep under the relative root.
   drop_scan(&dir, "p2-right");
   std::env::set_current_dir(tmp.path()).unwrap();

   let shutdown = CancellationToken::new();
   let reactor = Reactor::new(h.pipeline.clone(), PathBuf::from("albums"), 2, true);
   let task = tokio::spawn(reactor.run(shutdown.clone()));

   let outcomes = wait_for_outcomes(&h, 1).await;
   assert_eq!(outcomes, vec![("EU_1973_B02_P02_S02.tif".to_string(), Outcome::StitchFailed)]);

   tokio::time::sleep(Duration::from_millis(100)).await;
   drop_scan(&dir, "p2-right-again");
   let outcomes = wait_for_outcomes(&h, 2).await;
   assert_eq!(outcomes.get(1), Some(&("EU_1973_B02_P02_S03.tif".to_string(), Outcome::Ok)));

   shutdown.cancel();
   task.await.unwrap().unwrap();
   assert!(h.retry.snapshot().is_empty());
   assert_eq!(h.retry.state(&fs::canonicalize(&dir).unwrap()), DirectoryState::Advancing);
}

#[tokio::test]
async fn missing_root_is_fatal() {
   let tmp = TempDir::new().unwrap();
   let h = Harness::new();
   let reactor = Reactor::new(h.pipeline.clone(), tmp.path().join("nope"), 1, true);
   let err = reactor.run(CancellationToken::new()).await.unwrap_err();
   assert_eq!(err.exit_code(), 3);
}
