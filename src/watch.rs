//! Watch mode for regenerating properties on source changes
//!
//! [`PropertyWatcher`] owns a debounced file system watcher over a fixed list
//! of glob patterns. The debounce window doubles as a write-stability
//! threshold: a change fires only once the file has been quiet for that long.

use glob::Pattern;
use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{
    new_debouncer, DebounceEventResult, DebouncedEvent, DebouncedEventKind, Debouncer,
};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::pipeline::{report_failure, FailureStage};

/// How often the loop checks whether it has been asked to stop
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Error during watch mode
#[derive(Debug, Error)]
pub enum WatchError {
    /// Failed to initialize file watcher
    #[error("failed to initialize file watcher")]
    WatcherInit(#[source] notify::Error),
    /// Failed to add watch path
    #[error("failed to watch {}", path.display())]
    WatchPath {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
    /// Pattern is not a valid glob
    #[error("invalid watch pattern '{pattern}'")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
    /// Channel receive error
    #[error("watch channel error: {0}")]
    ChannelError(String),
    /// `run` was called before `start`
    #[error("watcher has not been started")]
    NotStarted,
}

/// One watched pattern and the directory the backend has to observe for it
#[derive(Debug, Clone)]
pub struct WatchTarget {
    pattern: Pattern,
    base: PathBuf,
    recursive: bool,
}

impl WatchTarget {
    /// Parse a glob pattern.
    ///
    /// The base directory is the longest leading run of components without
    /// glob syntax, with `[?]`-style escapes read as the literal character.
    /// Patterns whose wildcards stop at the file name are watched
    /// non-recursively.
    pub fn new(pattern: &str) -> Result<Self, WatchError> {
        let compiled = Pattern::new(pattern)
            .map_err(|source| WatchError::Pattern { pattern: pattern.to_string(), source })?;

        let components: Vec<Component<'_>> = Path::new(pattern).components().collect();
        let mut literal_path = PathBuf::new();
        let mut literal = 0;
        for component in &components {
            match literal_component(&component.as_os_str().to_string_lossy()) {
                Some(text) => literal_path.push(text),
                None => break,
            }
            literal += 1;
        }

        let (base, recursive) = if literal == components.len() {
            // Plain file path: watch its directory
            let parent = literal_path.parent().map(Path::to_path_buf).unwrap_or_default();
            (parent, false)
        } else {
            (literal_path, literal + 1 < components.len())
        };

        Ok(Self { pattern: compiled, base, recursive })
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// Directory handed to the backend
    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn is_recursive(&self) -> bool {
        self.recursive
    }

    pub fn matches(&self, path: &Path) -> bool {
        self.pattern.matches_path(path)
    }
}

/// Text of a pattern component, or `None` if it holds a wildcard
fn literal_component(component: &str) -> Option<String> {
    let chars: Vec<char> = component.chars().collect();
    let mut text = String::with_capacity(component.len());
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '[' if i + 2 < chars.len()
                && chars[i + 2] == ']'
                && matches!(chars[i + 1], '?' | '*' | '[' | ']') =>
            {
                text.push(chars[i + 1]);
                i += 3;
            }
            '*' | '?' | '[' => return None,
            c => {
                text.push(c);
                i += 1;
            }
        }
    }
    Some(text)
}

/// Cloneable handle that asks a running [`PropertyWatcher`] loop to return
#[derive(Debug, Clone)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Debounced watcher over a fixed set of glob patterns.
///
/// Lifecycle: [`new`](Self::new) registers patterns, [`start`](Self::start)
/// attaches the backend, [`run`](Self::run) blocks dispatching changes, and
/// [`stop`](Self::stop) (or a [`StopHandle`]) detaches it again.
pub struct PropertyWatcher {
    targets: Vec<WatchTarget>,
    stability: Duration,
    debouncer: Option<Debouncer<RecommendedWatcher>>,
    events: Option<Receiver<DebounceEventResult>>,
    running: Arc<AtomicBool>,
}

impl std::fmt::Debug for PropertyWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyWatcher")
            .field("targets", &self.targets)
            .field("stability", &self.stability)
            .field("started", &self.debouncer.is_some())
            .field("running", &self.is_running())
            .finish()
    }
}

impl PropertyWatcher {
    /// Register `patterns` (absolute glob patterns) without touching the file system.
    pub fn new<S: AsRef<str>>(patterns: &[S], stability: Duration) -> Result<Self, WatchError> {
        let targets =
            patterns.iter().map(|p| WatchTarget::new(p.as_ref())).collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            targets,
            stability,
            debouncer: None,
            events: None,
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn targets(&self) -> &[WatchTarget] {
        &self.targets
    }

    pub fn stability(&self) -> Duration {
        self.stability
    }

    /// Comma separated pattern list for log output
    pub fn describe(&self) -> String {
        self.targets.iter().map(WatchTarget::pattern).collect::<Vec<_>>().join(", ")
    }

    /// Directories the backend observes, merged so each is watched once
    pub fn watch_dirs(&self) -> Vec<(PathBuf, bool)> {
        let mut dirs: BTreeMap<PathBuf, bool> = BTreeMap::new();
        for target in &self.targets {
            let recursive = dirs.entry(target.base.clone()).or_insert(false);
            *recursive |= target.recursive;
        }
        dirs.into_iter().collect()
    }

    /// Directories actually handed to the backend.
    ///
    /// A base that does not exist yet is replaced by its nearest existing
    /// ancestor, watched recursively so the path is seen once it is created.
    pub fn backend_dirs(&self) -> Vec<(PathBuf, bool)> {
        let mut dirs: BTreeMap<PathBuf, bool> = BTreeMap::new();
        for (dir, recursive) in self.watch_dirs() {
            let (dir, recursive) = if dir.is_dir() {
                (dir, recursive)
            } else {
                match dir.ancestors().skip(1).find(|a| a.is_dir()) {
                    Some(ancestor) => {
                        debug!(
                            missing = %dir.display(),
                            ancestor = %ancestor.display(),
                            "directory does not exist yet"
                        );
                        (ancestor.to_path_buf(), true)
                    }
                    None => {
                        warn!(dir = %dir.display(), "no existing directory to watch");
                        continue;
                    }
                }
            };
            *dirs.entry(dir).or_insert(false) |= recursive;
        }
        dirs.into_iter().collect()
    }

    /// Attach the file system backend. Calling it twice is a no-op.
    ///
    /// A directory the backend refuses is reported and skipped; only a backend
    /// that cannot be created at all is an error.
    pub fn start(&mut self) -> Result<(), WatchError> {
        if self.debouncer.is_some() {
            return Ok(());
        }

        let (tx, rx) = channel();
        let mut debouncer = new_debouncer(self.stability, tx).map_err(WatchError::WatcherInit)?;

        for (dir, recursive) in self.backend_dirs() {
            let mode = if recursive { RecursiveMode::Recursive } else { RecursiveMode::NonRecursive };
            match debouncer.watcher().watch(&dir, mode) {
                Ok(()) => debug!(dir = %dir.display(), recursive, "watching directory"),
                Err(source) => {
                    let error = WatchError::WatchPath { path: dir.clone(), source };
                    report_failure(FailureStage::Run, "watch", &error);
                }
            }
        }

        self.debouncer = Some(debouncer);
        self.events = Some(rx);
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Detach the backend; a blocked [`run`](Self::run) returns on its next poll.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.debouncer = None;
        self.events = None;
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(Arc::clone(&self.running))
    }

    /// Check whether `path` is covered by a registered pattern
    pub fn matches(&self, path: &Path) -> bool {
        self.targets.iter().any(|t| t.matches(path))
    }

    /// Distinct watched paths touched by a debounced batch, in arrival order.
    pub fn changed_paths(&self, events: &[DebouncedEvent]) -> Vec<PathBuf> {
        let mut changed: Vec<PathBuf> = Vec::new();
        for event in events {
            if matches!(event.kind, DebouncedEventKind::Any)
                && self.matches(&event.path)
                && !changed.contains(&event.path)
            {
                changed.push(event.path.clone());
            }
        }
        changed
    }

    /// Handle one debounced batch, calling `on_change` once per changed path.
    ///
    /// Backend errors are logged and skipped. Returns how many times
    /// `on_change` ran.
    pub fn dispatch<F>(&self, batch: DebounceEventResult, on_change: &mut F) -> usize
    where
        F: FnMut(&Path),
    {
        match batch {
            Ok(events) => {
                let changed = self.changed_paths(&events);
                for path in &changed {
                    on_change(path.as_path());
                }
                changed.len()
            }
            Err(error) => {
                // Watch error (non-fatal) - log but continue watching
                warn!("Watch error: {:?}", error);
                0
            }
        }
    }

    /// Block, dispatching changes until stopped.
    ///
    /// Changes are handled one at a time on the calling thread.
    pub fn run<F>(&mut self, mut on_change: F) -> Result<(), WatchError>
    where
        F: FnMut(&Path),
    {
        if self.events.is_none() {
            return Err(WatchError::NotStarted);
        }
        info!("Properties watching {}", self.describe());

        while self.is_running() {
            let batch = match self.events.as_ref().map(|rx| rx.recv_timeout(POLL_INTERVAL)) {
                Some(Ok(batch)) => batch,
                Some(Err(RecvTimeoutError::Timeout)) => continue,
                Some(Err(RecvTimeoutError::Disconnected)) => {
                    self.stop();
                    return Err(WatchError::ChannelError("event channel disconnected".to_string()));
                }
                None => break,
            };
            self.dispatch(batch, &mut on_change);
        }

        self.stop();
        Ok(())
    }
}
