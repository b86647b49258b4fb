//! Single-flight claims on file paths.
//!
//! At most one extraction pass runs per path. A change event for a path that
//! is already claimed is dropped rather than queued; once released, the next
//! event is handled against whatever is on disk at that point.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Default)]
pub struct ProcessingGuard {
    in_flight: Mutex<HashSet<PathBuf>>,
}

impl ProcessingGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if `path` is already claimed.
    pub fn try_claim(&self, path: &Path) -> bool {
        self.in_flight.lock().insert(path.to_path_buf())
    }

    pub fn release(&self, path: &Path) {
        self.in_flight.lock().remove(path);
    }

    pub fn is_claimed(&self, path: &Path) -> bool {
        self.in_flight.lock().contains(path)
    }

    /// Claim `path` for the lifetime of the returned value.
    ///
    /// The claim is released on drop, whatever way the pass ends.
    pub fn claim<'a>(&'a self, path: &Path) -> Option<Claim<'a>> {
        if self.try_claim(path) {
            Some(Claim {
                guard: self,
                path: path.to_path_buf(),
            })
        } else {
            None
        }
    }
}

/// A held claim; see [`ProcessingGuard::claim`].
#[derive(Debug)]
pub struct Claim<'a> {
    guard: &'a ProcessingGuard,
    path: PathBuf,
}

impl Claim<'_> {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        self.guard.release(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};

    #[test]
    fn test_second_claim_is_refused() {
        let guard = ProcessingGuard::new();
        let path = Path::new("/ws/a/state.vscdb");

        assert!(guard.try_claim(path));
        assert!(!guard.try_claim(path));
        assert!(guard.try_claim(Path::new("/ws/b/state.vscdb")));

        guard.release(path);
        assert!(guard.try_claim(path));
    }

    #[test]
    fn test_claim_released_on_drop() {
        let guard = ProcessingGuard::new();
        let path = Path::new("/ws/a/state.vscdb");
        {
            let claim = guard.claim(path).unwrap();
            assert_eq!(claim.path(), path);
            assert!(guard.claim(path).is_none());
        }
        assert!(!guard.is_claimed(path));
        assert!(guard.claim(path).is_some());
    }

    #[test]
    fn test_concurrent_claims_single_winner() {
        let guard = Arc::new(ProcessingGuard::new());
        let winners = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let guard = guard.clone();
                let winners = winners.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    if guard.try_claim(Path::new("/ws/same/state.vscdb")) {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(winners.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_release_after_panic() {
        let guard = Arc::new(ProcessingGuard::new());
        let path = PathBuf::from("/ws/panics/state.vscdb");

        let g = guard.clone();
        let p = path.clone();
        let result = std::thread::spawn(move || {
            let _claim = g.claim(&p).unwrap();
            panic!("extraction blew up");
        })
        .join();

        assert!(result.is_err());
        assert!(!guard.is_claimed(&path));
    }
}
