//! Recursive directory watching with dynamic subtree registration.
//!
//! Each directory is registered non-recursively so that directories created
//! after start-up can be added one by one through the same
//! [`DirectoryWatcher::register_tree`] call used for the initial walk.

use notify::{Event, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use walkdir::WalkDir;

use crate::logging::{EventLog, Level};

/// Errors that end (or prevent) a watch session.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Failed to initialize watcher: {reason}")]
    InitFailed { reason: String },

    #[error("Cannot watch root {path}: {reason}")]
    RootRegistration { path: PathBuf, reason: String },

    #[error("File system event error: {details}")]
    EventError { details: String },

    #[error("Event channel closed unexpectedly")]
    ChannelClosed,

    #[error("A watch session is already active")]
    AlreadyWatching,
}

impl From<notify::Error> for WatchError {
    fn from(e: notify::Error) -> Self {
        WatchError::InitFailed {
            reason: e.to_string(),
        }
    }
}

pub type EventReceiver = mpsc::Receiver<notify::Result<Event>>;

/// Owns the notify backend and the set of registered directories.
pub struct DirectoryWatcher {
    watcher: notify::RecommendedWatcher,
    watched: HashSet<PathBuf>,
    log: Arc<dyn EventLog>,
}

impl DirectoryWatcher {
    /// Create the backend. Events are forwarded into a channel of `capacity`
    /// slots; when it is full, new events are dropped at the source.
    pub fn new(
        log: Arc<dyn EventLog>,
        capacity: usize,
    ) -> Result<(Self, EventReceiver), WatchError> {
        let (tx, rx) = mpsc::channel(capacity);

        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = tx.try_send(res);
        })?;

        Ok((
            Self {
                watcher,
                watched: HashSet::new(),
                log,
            },
            rx,
        ))
    }

    /// Register `dir` and every directory below it.
    ///
    /// Failure to register `dir` itself is returned. Failures below it are
    /// logged and that subtree is skipped. Returns the number of directories
    /// that were not already in the watch set.
    ///
    /// Every directory is handed to the backend again even when it is already
    /// in the set: a directory can be replaced at the same path without a
    /// removal event reaching us, and the new inode needs its own watch.
    pub fn register_tree(&mut self, dir: &Path) -> Result<usize, WatchError> {
        let watcher = &mut self.watcher;
        register_walk(dir, &mut self.watched, self.log.as_ref(), |path| {
            watcher.watch(path, RecursiveMode::NonRecursive)
        })
    }

    /// Register `path` if it is a directory. Errors are logged, never returned.
    pub fn register_if_dir(&mut self, path: &Path) {
        if !path.is_dir() {
            return;
        }
        if let Err(e) = self.register_tree(path) {
            self.log
                .log(Level::Error, &format!("failed to watch new directory: {}", e));
        }
    }

    pub fn is_watched(&self, dir: &Path) -> bool {
        self.watched.contains(dir)
    }

    pub fn watched_count(&self) -> usize {
        self.watched.len()
    }

    /// Drop `dir` and everything registered below it.
    ///
    /// Used when a directory is removed or moved out from under the root.
    pub fn forget(&mut self, dir: &Path) {
        let gone: Vec<PathBuf> = self
            .watched
            .iter()
            .filter(|p| p.starts_with(dir))
            .cloned()
            .collect();
        for path in gone {
            self.watched.remove(&path);
            let _ = self.watcher.unwatch(&path);
        }
    }
}

/// Walk `dir`, registering each directory through `watch`.
fn register_walk<F>(
    dir: &Path,
    watched: &mut HashSet<PathBuf>,
    log: &dyn EventLog,
    mut watch: F,
) -> Result<usize, WatchError>
where
    F: FnMut(&Path) -> notify::Result<()>,
{
    watch(dir).map_err(|e| WatchError::RootRegistration {
        path: dir.to_path_buf(),
        reason: e.to_string(),
    })?;
    let mut added = usize::from(watched.insert(dir.to_path_buf()));

    let mut walker = WalkDir::new(dir).min_depth(1).into_iter();
    while let Some(entry) = walker.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log.log(
                    Level::Error,
                    &format!("failed to read directory under {}: {}", dir.display(), e),
                );
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }

        let path = entry.path();
        match watch(path) {
            Ok(()) => {
                if watched.insert(path.to_path_buf()) {
                    added += 1;
                }
            }
            Err(e) => {
                log.log(
                    Level::Error,
                    &format!("failed to watch {}: {}", path.display(), e),
                );
                walker.skip_current_dir();
            }
        }
    }

    Ok(added)
}
