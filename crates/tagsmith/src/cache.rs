//! Compilation gate over the artifact cache.
//!
//! An artifact is rebuilt when caching is disabled or when no artifact exists
//! at its path. Nothing else invalidates it: there is no content hash and no
//! modification-time check, so with caching on, a stale artifact is served
//! until it is deleted.
//!
//! Builds of the same artifact path are serialised within the process by a
//! per-path lock, and artifacts are written with a temp-file rename (see
//! [`store::write_atomic`]). A second caller waiting on the lock re-checks the
//! artifact and skips its own build if caching is enabled. A path's lock is
//! dropped from the registry by the last caller to release it, so the registry
//! only holds paths with a build in flight.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use once_cell::sync::Lazy;
use tracing::{debug, info};

use crate::error::Result;
use crate::store;

static BUILD_LOCKS: Lazy<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// What the gate did for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    /// An existing artifact was reused.
    Cached,
    /// The pipeline ran and a new artifact was written.
    Built,
}

/// Returns true if the artifact must be (re)built.
pub fn needs_build(use_cache: bool, artifact: &Path) -> bool {
    !use_cache || !artifact.is_file()
}

/// Ensures an artifact exists at `artifact`, running `compile` when needed.
pub fn ensure<F>(use_cache: bool, artifact: &Path, compile: F) -> Result<GateOutcome>
where
    F: FnOnce() -> Result<String>,
{
    if !needs_build(use_cache, artifact) {
        debug!(artifact = %artifact.display(), "using cached artifact");
        return Ok(GateOutcome::Cached);
    }

    let lock = build_lock(artifact);
    let outcome = build_locked(&lock, use_cache, artifact, compile);
    release_build_lock(artifact, lock);
    outcome
}

fn build_locked<F>(
    lock: &Mutex<()>,
    use_cache: bool,
    artifact: &Path,
    compile: F,
) -> Result<GateOutcome>
where
    F: FnOnce() -> Result<String>,
{
    let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

    // Another caller may have finished the build while we waited.
    if !needs_build(use_cache, artifact) {
        debug!(artifact = %artifact.display(), "artifact built concurrently");
        return Ok(GateOutcome::Cached);
    }

    let compiled = compile()?;
    store::write_atomic(artifact, &compiled)?;
    info!(artifact = %artifact.display(), bytes = compiled.len(), "compiled template");
    Ok(GateOutcome::Built)
}

fn build_lock(artifact: &Path) -> Arc<Mutex<()>> {
    let mut locks = BUILD_LOCKS.lock().unwrap_or_else(PoisonError::into_inner);
    locks
        .entry(artifact.to_path_buf())
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone()
}

fn release_build_lock(artifact: &Path, lock: Arc<Mutex<()>>) {
    let mut locks = BUILD_LOCKS.lock().unwrap_or_else(PoisonError::into_inner);
    // Clones are only handed out under the registry lock, so a count of two
    // (the registry's and ours) means nobody else is waiting on this path.
    if Arc::strong_count(&lock) == 2 {
        locks.remove(artifact);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CompileError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn registered(artifact: &Path) -> bool {
        BUILD_LOCKS.lock().unwrap().contains_key(artifact)
    }

    #[test]
    fn test_builds_when_missing() {
        let temp_dir = TempDir::new().unwrap();
        let artifact = temp_dir.path().join("dist/page.tsc");

        let outcome = ensure(true, &artifact, || Ok("v1".to_string())).unwrap();
        assert_eq!(outcome, GateOutcome::Built);
        assert_eq!(std::fs::read_to_string(&artifact).unwrap(), "v1");
        assert!(!registered(&artifact));
    }

    #[test]
    fn test_existing_artifact_is_reused() {
        let temp_dir = TempDir::new().unwrap();
        let artifact = temp_dir.path().join("page.tsc");
        std::fs::write(&artifact, "stale").unwrap();

        let outcome = ensure(true, &artifact, || Ok("fresh".to_string())).unwrap();
        assert_eq!(outcome, GateOutcome::Cached);
        assert_eq!(std::fs::read_to_string(&artifact).unwrap(), "stale");
    }

    #[test]
    fn test_disabled_cache_always_rebuilds() {
        let temp_dir = TempDir::new().unwrap();
        let artifact = temp_dir.path().join("page.tsc");
        std::fs::write(&artifact, "stale").unwrap();

        let outcome = ensure(false, &artifact, || Ok("fresh".to_string())).unwrap();
        assert_eq!(outcome, GateOutcome::Built);
        assert_eq!(std::fs::read_to_string(&artifact).unwrap(), "fresh");
    }

    #[test]
    fn test_compile_failure_writes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let artifact = temp_dir.path().join("page.tsc");

        let result = ensure(true, &artifact, || Err(CompileError::NoTemplate));
        assert!(matches!(result, Err(CompileError::NoTemplate)));
        assert!(!artifact.exists());
        assert!(!registered(&artifact));
    }

    #[test]
    fn test_concurrent_first_compiles_build_once() {
        let temp_dir = TempDir::new().unwrap();
        let artifact = Arc::new(temp_dir.path().join("shared.tsc"));
        let builds = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let artifact = Arc::clone(&artifact);
                let builds = Arc::clone(&builds);
                std::thread::spawn(move || {
                    ensure(true, &artifact, || {
                        builds.fetch_add(1, Ordering::SeqCst);
                        Ok("x".repeat(64 * 1024))
                    })
                    .unwrap();
                    std::fs::read_to_string(artifact.as_path()).unwrap()
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap().len(), 64 * 1024);
        }
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(!registered(&artifact));
    }
}
