//! Atomic installation of freshly arrived files under contention from a
//! syncing storage client.

use std::{
   io,
   path::{Path, PathBuf},
   time::Duration,
};

use tokio::{fs, time};

use crate::error::{Error, Result};

/// Bounded retry applied while another process holds a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
   pub attempts: u32,
   pub delay:    Duration,
}

impl RetryPolicy {
   pub const fn new(attempts: u32, delay: Duration) -> Self {
      Self { attempts, delay }
   }

   /// Policy for tests and one-shot commands: retry immediately.
   pub const fn immediate(attempts: u32) -> Self {
      Self { attempts, delay: Duration::ZERO }
   }
}

/// Whether an I/O failure looks like a lock held by a sync client.
///
/// Permission-denied and not-found are retried; everything else aborts.
pub fn is_transient(err: &io::Error) -> bool {
   if matches!(err.kind(), io::ErrorKind::PermissionDenied | io::ErrorKind::NotFound) {
      return true;
   }
   // ERROR_SHARING_VIOLATION / ERROR_LOCK_VIOLATION
   cfg!(windows) && matches!(err.raw_os_error(), Some(32 | 33))
}

/// Runs `op` until it succeeds, fails with a non-transient error, or the
/// policy's attempts are used up. The last error is returned unchanged.
async fn retry_transient<F, Fut>(policy: RetryPolicy, label: &str, mut op: F) -> io::Result<()>
where
   F: FnMut() -> Fut,
   Fut: Future<Output = io::Result<()>>,
{
   let attempts = policy.attempts.max(1);
   let mut attempt = 0;
   loop {
      attempt += 1;
      match op().await {
         Err(e) if is_transient(&e) && attempt < attempts => {
            tracing::debug!("{label} attempt {attempt}/{attempts} failed: {e}");
            time::sleep(policy.delay).await;
         },
         result => return result,
      }
   }
}

/// Renames `from` to `to`, retrying while the failure is transient.
///
/// The rename is a single filesystem operation, so the file is always present
/// under one of the two names. Existing targets are overwritten; use
/// [`install`] when the target must not exist.
pub async fn rename_with_retry(from: &Path, to: &Path, policy: RetryPolicy) -> Result<()> {
   let label = format!("rename {} -> {}", from.display(), to.display());
   match retry_transient(policy, &label, || fs::rename(from, to)).await {
      Ok(()) => Ok(()),
      Err(e) if is_transient(&e) => Err(Error::TransientLock {
         from: from.to_path_buf(),
         to: to.to_path_buf(),
         attempts: policy.attempts.max(1),
         source: e,
      }),
      Err(e) => Err(e.into()),
   }
}

/// Moves an incoming file to its canonical name.
///
/// Refuses to replace an existing canonical file so a sequencing mistake can
/// never overwrite a master scan.
pub async fn install(from: &Path, to: &Path, policy: RetryPolicy) -> Result<PathBuf> {
   if fs::try_exists(to).await? {
      return Err(
         io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("refusing to overwrite {}", to.display()),
         )
         .into(),
      );
   }
   rename_with_retry(from, to, policy).await?;
   tracing::info!("installed {} -> {}", from.display(), to.display());
   Ok(to.to_path_buf())
}

/// Deletes a scratch file, retrying while a viewer or sync client holds it.
///
/// A file that is already gone counts as removed.
pub async fn remove_with_retry(path: &Path, policy: RetryPolicy) -> Result<()> {
   let label = format!("remove {}", path.display());
   retry_transient(policy, &label, || async {
      match fs::remove_file(path).await {
         Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
         result => result,
      }
   })
   .await?;
   Ok(())
}

#[cfg(test)]
mod tests {
   use std::sync::atomic::{AtomicU32, Ordering};

   use tempfile::TempDir;

   use super::*;

   /// Fails with each of `errors` in turn, then succeeds; counts the calls.
   async fn scripted(errors: &[io::ErrorKind], attempts: u32) -> (io::Result<()>, u32) {
      let calls = AtomicU32::new(0);
      let result = retry_transient(RetryPolicy::immediate(attempts), "scripted", || {
         let n = calls.fetch_add(1, Ordering::SeqCst) as usize;
         let outcome = errors.get(n).map_or(Ok(()), |kind| Err(io::Error::from(*kind)));
         async move { outcome }
      })
      .await;
      (result, calls.load(Ordering::SeqCst))
   }

   #[tokio::test]
   async fn transient_failure_then_success_is_retried() {
      let (result, calls) = scripted(&[io::ErrorKind::PermissionDenied], 3).await;
      assert!(result.is_ok());
      assert_eq!(calls, 2);
   }

   #[tokio::test]
   async fn non_transient_failure_is_not_retried() {
      let (result, calls) = scripted(&[io::ErrorKind::InvalidInput], 5).await;
      assert_eq!(result.unwrap_err().kind(), io::ErrorKind::InvalidInput);
      assert_eq!(calls, 1);
   }

   #[tokio::test]
   async fn transient_failures_stop_at_the_attempt_limit() {
      let kinds = [io::ErrorKind::PermissionDenied; 4];
      let (result, calls) = scripted(&kinds, 3).await;
      assert_eq!(result.unwrap_err().kind(), io::ErrorKind::PermissionDenied);
      assert_eq!(calls, 3);
   }

   #[cfg(unix)]
   #[tokio::test]
   async fn rename_onto_a_directory_fails_without_retrying() {
      let tmp = TempDir::new().unwrap();
      let from = tmp.path().join("incoming_scan.tif");
      let to = tmp.path().join("EU_1973_B02_P01_S01.tif");
      std::fs::write(&from, b"pixels").unwrap();
      std::fs::create_dir(&to).unwrap();
      std::fs::write(to.join("occupant"), b"x").unwrap();

      let err = rename_with_retry(&from, &to, RetryPolicy::new(3, Duration::from_secs(5)))
         .await
         .unwrap_err();
      assert!(matches!(err, Error::Io(_)), "unexpected error: {err}");
      assert!(from.exists());
   }

   #[tokio::test]
   async fn install_moves_file() {
      let tmp = TempDir::new().unwrap();
      let from = tmp.path().join("incoming_scan.tif");
      let to = tmp.path().join("EU_1973_B02_P01_S01.tif");
      std::fs::write(&from, b"pixels").unwrap();

      install(&from, &to, RetryPolicy::immediate(3)).await.unwrap();

      assert!(!from.exists());
      assert_eq!(std::fs::read(&to).unwrap(), b"pixels");
   }

   #[tokio::test]
   async fn missing_source_exhausts_retries() {
      let tmp = TempDir::new().unwrap();
      let from = tmp.path().join("incoming_scan.tif");
      let to = tmp.path().join("EU_1973_B02_P01_S01.tif");

      let err = install(&from, &to, RetryPolicy::immediate(3)).await.unwrap_err();
      match err {
         Error::TransientLock { attempts, .. } => assert_eq!(attempts, 3),
         other => panic!("unexpected error: {other}"),
      }
      assert!(!to.exists());
   }

   #[tokio::test]
   async fn existing_target_is_never_overwritten() {
      let tmp = TempDir::new().unwrap();
      let from = tmp.path().join("incoming_scan.tif");
      let to = tmp.path().join("EU_1973_B02_P01_S01.tif");
      std::fs::write(&from, b"new").unwrap();
      std::fs::write(&to, b"master").unwrap();

      assert!(install(&from, &to, RetryPolicy::immediate(3)).await.is_err());
      assert_eq!(std::fs::read(&to).unwrap(), b"master");
      assert!(from.exists());
   }

   #[tokio::test]
   async fn removing_a_missing_file_succeeds() {
      let tmp = TempDir::new().unwrap();
      let path = tmp.path().join(".albumscan-preview-1.tif");
      std::fs::write(&path, b"preview").unwrap();
      remove_with_retry(&path, RetryPolicy::immediate(2)).await.unwrap();
      assert!(!path.exists());
      remove_with_retry(&path, RetryPolicy::immediate(2)).await.unwrap();
   }

   #[test]
   fn only_lock_like_errors_are_transient() {
      assert!(is_transient(&io::Error::from(io::ErrorKind::PermissionDenied)));
      assert!(is_transient(&io::Error::from(io::ErrorKind::NotFound)));
      assert!(!is_transient(&io::Error::from(io::ErrorKind::InvalidInput)));
      assert!(!is_transient(&io::Error::from(io::ErrorKind::AlreadyExists)));
   }
}
