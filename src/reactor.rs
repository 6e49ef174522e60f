//! Long-running watch loop.
//!
//! Filesystem notifications are bridged from the `notify` thread into tokio,
//! filtered down to sentinel arrivals and routed to one FIFO queue per watch
//! directory. Each queue has a single worker, so units of one directory never
//! overlap, while a semaphore bounds how many directories work at once.

use std::{
   collections::HashMap,
   path::{Path, PathBuf},
   sync::{
      Arc,
      atomic::{AtomicUsize, Ordering},
   },
};

use async_trait::async_trait;
use notify::{
   EventKind, RecommendedWatcher, RecursiveMode, Watcher,
   event::{CreateKind, ModifyKind, RenameMode},
};
use tokio::{
   sync::{Semaphore, mpsc},
   task::JoinSet,
};
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::{Result, dispatch::Pipeline, error::Error, grammar::is_sentinel};

/// Prefix of every scratch file the pipeline creates next to the scans.
pub const SCRATCH_PREFIX: &str = ".albumscan-";

/// Work run for one queued path.
#[async_trait]
pub trait UnitHandler: Send + Sync {
   fn accepts(&self, path: &Path) -> bool;
   async fn run_unit(&self, path: PathBuf);
}

#[async_trait]
impl UnitHandler for Pipeline {
   fn accepts(&self, path: &Path) -> bool {
      self.is_trigger(path)
   }

   async fn run_unit(&self, path: PathBuf) {
      self.handle(&path).await;
   }
}

/// Per-directory FIFO queues with one worker each.
pub struct DirectoryQueues {
   handler:   Arc<dyn UnitHandler>,
   permits:   Arc<Semaphore>,
   shutdown:  CancellationToken,
   queues:    HashMap<PathBuf, mpsc::UnboundedSender<PathBuf>>,
   workers:   JoinSet<PathBuf>,
   completed: Arc<AtomicUsize>,
}

impl DirectoryQueues {
   pub fn new(
      handler: Arc<dyn UnitHandler>,
      max_concurrent: usize,
      shutdown: CancellationToken,
   ) -> Self {
      Self {
         handler,
         permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
         shutdown,
         queues: HashMap::new(),
         workers: JoinSet::new(),
         completed: Arc::new(AtomicUsize::new(0)),
      }
   }

   /// Queues `path` behind earlier paths of the same directory.
   pub fn submit(&mut self, path: PathBuf) {
      let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
      let path = match self.queues.get(&dir) {
         Some(tx) => match tx.send(path) {
            Ok(()) => return,
            Err(mpsc::error::SendError(path)) => path,
         },
         None => path,
      };

      let (tx, rx) = mpsc::unbounded_channel();
      // The receiver is alive until the worker below starts, so this cannot fail.
      let _ = tx.send(path);
      self.queues.insert(dir.clone(), tx);
      tracing::debug!("starting queue for {}", dir.display());
      self.workers.spawn(worker(
         dir,
         rx,
         self.handler.clone(),
         self.permits.clone(),
         self.shutdown.clone(),
         self.completed.clone(),
      ));
   }

   pub fn completed(&self) -> usize {
      self.completed.load(Ordering::SeqCst)
   }

   /// Reaps one worker that stopped on its own. Pending forever when none did.
   async fn reap(&mut self) {
      match self.workers.join_next().await {
         Some(Ok(dir)) => {
            self.queues.remove(&dir);
         },
         Some(Err(e)) => {
            tracing::error!("queue worker failed: {e}");
            self.queues.retain(|_, tx| !tx.is_closed());
         },
         None => std::future::pending().await,
      }
   }

   /// Stops taking new units, lets in-flight units finish and joins every worker.
   pub async fn shutdown(mut self) -> usize {
      self.shutdown.cancel();
      self.queues.clear();
      while let Some(res) = self.workers.join_next().await {
         if let Err(e) = res {
            tracing::error!("queue worker failed: {e}");
         }
      }
      self.completed()
   }
}

async fn worker(
   dir: PathBuf,
   mut rx: mpsc::UnboundedReceiver<PathBuf>,
   handler: Arc<dyn UnitHandler>,
   permits: Arc<Semaphore>,
   shutdown: CancellationToken,
   completed: Arc<AtomicUsize>,
) -> PathBuf {
   loop {
      let path = tokio::select! {
         biased;
         () = shutdown.cancelled() => break,
         next = rx.recv() => match next {
            Some(path) => path,
            None => break,
         },
      };
      let permit = tokio::select! {
         biased;
         () = shutdown.cancelled() => break,
         permit = permits.clone().acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => break,
         },
      };
      // Once started, a unit always runs to its terminal outcome.
      handler.run_unit(path).await;
      drop(permit);
      completed.fetch_add(1, Ordering::SeqCst);
   }
   let skipped = drain(&mut rx);
   if skipped > 0 {
      tracing::info!("{}: {skipped} queued arrivals left for the next start", dir.display());
   }
   dir
}

fn drain(rx: &mut mpsc::UnboundedReceiver<PathBuf>) -> usize {
   rx.close();
   let mut n = 0;
   while rx.try_recv().is_ok() {
      n += 1;
   }
   n
}

/// Paths a notification reports as newly present.
fn arrivals(event: notify::Event) -> Vec<PathBuf> {
   match event.kind {
      EventKind::Create(CreateKind::Folder) => Vec::new(),
      EventKind::Create(_) | EventKind::Modify(ModifyKind::Name(RenameMode::To)) => event.paths,
      EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
         event.paths.into_iter().last().into_iter().collect()
      },
      _ => Vec::new(),
   }
}

/// What the startup sweep found under the watch root.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Sweep {
   pub pending: Vec<PathBuf>,
   pub removed: usize,
}

/// Finds sentinel files left from a previous run and deletes stale scratch files.
pub fn sweep(root: &Path, incoming_name: &str) -> Sweep {
   let mut found = Sweep::default();
   for entry in WalkDir::new(root).follow_links(false).into_iter().filter_map(|e| e.ok()) {
      if !entry.file_type().is_file() {
         continue;
      }
      let path = entry.path();
      if is_sentinel(path, incoming_name) {
         found.pending.push(path.to_path_buf());
      } else if is_scratch(path) {
         match std::fs::remove_file(path) {
            Ok(()) => found.removed += 1,
            Err(e) => tracing::warn!("cannot remove stale {}: {e}", path.display()),
         }
      }
   }
   found.pending.sort();
   found
}

fn is_scratch(path: &Path) -> bool {
   path.file_name()
      .and_then(|n| n.to_str())
      .is_some_and(|n| n.starts_with(SCRATCH_PREFIX) && n.to_ascii_lowercase().ends_with(".tif"))
}

pub struct Reactor {
   handler:        Arc<dyn UnitHandler>,
   root:           PathBuf,
   incoming_name:  String,
   max_concurrent: usize,
   sweep_on_start: bool,
}

impl Reactor {
   pub fn new(pipeline: Arc<Pipeline>, root: PathBuf, max_concurrent: usize, sweep_on_start: bool) -> Self {
      let incoming_name = pipeline.incoming_name().to_string();
      Self { handler: pipeline, root, incoming_name, max_concurrent, sweep_on_start }
   }

   /// Watches until `shutdown` is cancelled; returns the number of units run.
   ///
   /// Only a missing root or a watcher that cannot attach is fatal.
   pub async fn run(mut self, shutdown: CancellationToken) -> Result<usize> {
      if !self.root.is_dir() {
         return Err(Error::WatchRootMissing(self.root));
      }
      // Sweep and notify paths must share one key per directory.
      self.root = match std::fs::canonicalize(&self.root) {
         Ok(root) => root,
         Err(_) => return Err(Error::WatchRootMissing(self.root)),
      };

      let (tx, mut rx) = mpsc::unbounded_channel::<PathBuf>();
      let mut watcher = RecommendedWatcher::new(
         move |res: notify::Result<notify::Event>| match res {
            Ok(event) => {
               for path in arrivals(event) {
                  let _ = tx.send(path);
               }
            },
            Err(e) => tracing::warn!("watch error: {e}"),
         },
         notify::Config::default(),
      )?;
      watcher.watch(&self.root, RecursiveMode::Recursive)?;
      tracing::info!("watching {} for {}", self.root.display(), self.incoming_name);

      let mut queues = DirectoryQueues::new(self.handler.clone(), self.max_concurrent, shutdown.clone());

      if self.sweep_on_start {
         let root = self.root.clone();
         let name = self.incoming_name.clone();
         let found = tokio::task::spawn_blocking(move || sweep(&root, &name))
            .await
            .unwrap_or_default();
         if found.removed > 0 {
            tracing::info!("removed {} stale scratch files", found.removed);
         }
         for path in found.pending {
            tracing::info!("picking up {}", path.display());
            queues.submit(path);
         }
      }

      loop {
         tokio::select! {
            () = shutdown.cancelled() => break,
            next = rx.recv() => match next {
               Some(path) if self.handler.accepts(&path) => queues.submit(path),
               Some(_) => {},
               None => break,
            },
            () = queues.reap() => {},
         }
      }

      drop(watcher);
      tracing::info!("shutting down, waiting for in-flight units");
      Ok(queues.shutdown().await)
   }
}
