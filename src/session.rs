//! Watch session lifecycle.
//!
//! ```text
//! Idle ──start──▶ Watching ──cancel / channel error──▶ Stopping ──▶ Stopped
//!                    ▲                                               │
//!                    └───────────────────start───────────────────────┘
//! ```
//!
//! An [`Orchestrator`] owns at most one active session. The session's
//! [`StopHandle`] can be cloned and handed to anything outside the dispatch
//! loop (a signal handler, a UI) that needs to end it.

use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind};
use parking_lot::{Mutex, RwLock};
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::guard::ProcessingGuard;
use crate::ingest::Pipeline;
use crate::logging::{EventLog, Level};
use crate::watch::{DirectoryWatcher, EventReceiver, WatchError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Watching,
    Stopping,
    Stopped,
}

/// Cancels the session it was taken from.
#[derive(Debug, Clone)]
pub struct StopHandle {
    token: CancellationToken,
}

impl StopHandle {
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }
}

pub struct Orchestrator {
    pipeline: Arc<Pipeline>,
    guard: Arc<ProcessingGuard>,
    state: Arc<RwLock<SessionState>>,
    target_file: String,
    channel_capacity: usize,
}

impl Orchestrator {
    pub fn new(pipeline: Arc<Pipeline>, target_file: &str, channel_capacity: usize) -> Self {
        Self {
            pipeline,
            guard: Arc::new(ProcessingGuard::new()),
            state: Arc::new(RwLock::new(SessionState::Idle)),
            target_file: target_file.to_string(),
            channel_capacity,
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    pub fn guard(&self) -> &Arc<ProcessingGuard> {
        &self.guard
    }

    /// Register `root` recursively and spawn the dispatch loop.
    ///
    /// Fails with [`WatchError::AlreadyWatching`] while another session from
    /// this orchestrator is still running, and with a setup error if the
    /// backend or the root registration fails.
    pub fn start(&self, root: &Path) -> Result<SessionHandle, WatchError> {
        let previous = {
            let mut state = self.state.write();
            if matches!(*state, SessionState::Watching | SessionState::Stopping) {
                return Err(WatchError::AlreadyWatching);
            }
            std::mem::replace(&mut *state, SessionState::Watching)
        };

        let log = self.pipeline.log().clone();
        let setup = DirectoryWatcher::new(log.clone(), self.channel_capacity).and_then(
            |(mut watcher, rx)| {
                let count = watcher.register_tree(root)?;
                Ok((watcher, rx, count))
            },
        );
        let (watcher, rx, count) = match setup {
            Ok(parts) => parts,
            Err(e) => {
                *self.state.write() = previous;
                return Err(e);
            }
        };

        log.log(
            Level::Info,
            &format!("watching {} ({} directories)", root.display(), count),
        );

        let token = CancellationToken::new();
        let watcher = Arc::new(Mutex::new(Some(watcher)));
        let dispatch = Dispatch {
            pipeline: self.pipeline.clone(),
            guard: self.guard.clone(),
            watcher: watcher.clone(),
            target_file: self.target_file.clone(),
            log,
        };
        let state = self.state.clone();
        let loop_token = token.clone();

        let join = tokio::spawn(async move {
            let result = dispatch.run(rx, loop_token).await;
            *state.write() = SessionState::Stopping;
            match &result {
                Ok(()) => dispatch.log.log(Level::Info, "watching stopped"),
                Err(e) => dispatch.log.log(Level::Error, &format!("watch error: {}", e)),
            }
            // Dropping the backend closes the OS watches.
            drop(dispatch.watcher.lock().take());
            *state.write() = SessionState::Stopped;
            result
        });

        Ok(SessionHandle {
            token,
            join: Some(join),
            watcher,
        })
    }
}

/// Handle to a running session.
///
/// Dropping the handle cancels the session. Call [`SessionHandle::wait`] to
/// keep it running until something else stops it.
pub struct SessionHandle {
    token: CancellationToken,
    join: Option<JoinHandle<Result<(), WatchError>>>,
    watcher: SharedWatcher,
}

impl SessionHandle {
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            token: self.token.clone(),
        }
    }

    /// Registered directory count; zero once the session has stopped.
    pub fn watched_dirs(&self) -> usize {
        self.watcher
            .lock()
            .as_ref()
            .map_or(0, DirectoryWatcher::watched_count)
    }

    pub fn is_watched(&self, dir: &Path) -> bool {
        self.watcher
            .lock()
            .as_ref()
            .is_some_and(|w| w.is_watched(dir))
    }

    /// Cancel and wait for the dispatch loop to exit.
    pub async fn stop(self) -> Result<(), WatchError> {
        self.token.cancel();
        self.wait().await
    }

    /// Wait for the session to end on its own (cancellation or watch error).
    pub async fn wait(mut self) -> Result<(), WatchError> {
        let Some(join) = self.join.take() else {
            return Ok(());
        };
        match join.await {
            Ok(result) => result,
            Err(e) => Err(WatchError::EventError {
                details: e.to_string(),
            }),
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// `None` once the session has closed its backend.
type SharedWatcher = Arc<Mutex<Option<DirectoryWatcher>>>;

struct Dispatch {
    pipeline: Arc<Pipeline>,
    guard: Arc<ProcessingGuard>,
    watcher: SharedWatcher,
    target_file: String,
    log: Arc<dyn EventLog>,
}

impl Dispatch {
    async fn run(&self, mut rx: EventReceiver, token: CancellationToken) -> Result<(), WatchError> {
        loop {
            tokio::select! {
                _ = token.cancelled() => return Ok(()),
                received = rx.recv() => match received {
                    Some(Ok(event)) => self.handle_event(event).await,
                    Some(Err(e)) => {
                        return Err(WatchError::EventError { details: e.to_string() });
                    }
                    None => return Err(WatchError::ChannelClosed),
                },
            }
        }
    }

    async fn handle_event(&self, event: Event) {
        self.update_watch_set(&event);

        if !is_write(&event.kind) {
            return;
        }
        for path in &event.paths {
            if self.is_target(path) {
                self.process(path).await;
            }
        }
    }

    fn update_watch_set(&self, event: &Event) {
        let mut watcher = self.watcher.lock();
        let Some(watcher) = watcher.as_mut() else {
            return;
        };
        match (&event.kind, event.paths.as_slice()) {
            (EventKind::Create(_), paths) => paths.iter().for_each(|p| watcher.register_if_dir(p)),
            (EventKind::Remove(_), paths)
            | (EventKind::Modify(ModifyKind::Name(RenameMode::From)), paths) => {
                paths.iter().for_each(|p| watcher.forget(p))
            }
            (EventKind::Modify(ModifyKind::Name(RenameMode::To)), paths) => {
                paths.iter().for_each(|p| watcher.register_if_dir(p))
            }
            (EventKind::Modify(ModifyKind::Name(RenameMode::Both)), [from, to]) => {
                watcher.forget(from);
                watcher.register_if_dir(to);
            }
            _ => {}
        }
    }

    fn is_target(&self, path: &Path) -> bool {
        path.file_name()
            .is_some_and(|name| name == OsStr::new(&self.target_file))
    }

    async fn process(&self, path: &Path) {
        let Some(_claim) = self.guard.claim(path) else {
            return;
        };

        let source_timestamp = chrono::Utc::now().timestamp();
        let summary = self.pipeline.process_file(path, source_timestamp).await;
        if summary.delivered > 0 || summary.failed > 0 {
            self.log.log(
                Level::Info,
                &format!(
                    "{}: {} delivered, {} failed, {} already sent",
                    path.display(),
                    summary.delivered,
                    summary.failed,
                    summary.duplicates
                ),
            );
        }
    }
}

/// Content writes only; metadata and rename notifications do not count.
fn is_write(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any)
    )
}
