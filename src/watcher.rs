//! Filesystem change notifications for a single log path.

use crate::error::WatchError;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// Notify-backed event source for one file.
///
/// The parent directory is watched so that the file can be created, removed or
/// replaced without losing the subscription.
pub(crate) struct PathWatcher {
    watcher: RecommendedWatcher,
    receiver: mpsc::UnboundedReceiver<notify::Result<Event>>,
    file_path: PathBuf,
    file_name: String,
}

impl PathWatcher {
    pub(crate) fn new<P: AsRef<Path>>(path: P) -> Result<Self, WatchError> {
        let file_path = path.as_ref().to_path_buf();
        let file_name = file_path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();

        let (tx, rx) = mpsc::unbounded_channel();

        let watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            Config::default(),
        )?;

        Ok(Self {
            watcher,
            receiver: rx,
            file_path,
            file_name,
        })
    }

    /// Starts watching the directory that holds the file.
    pub(crate) fn start_watching(&mut self) -> Result<(), WatchError> {
        let watch_path = match self.file_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        self.watcher.watch(watch_path, RecursiveMode::NonRecursive)?;
        Ok(())
    }

    /// Returns the next event that touches the watched file.
    ///
    /// Events for sibling files in the same directory are skipped.
    pub(crate) async fn next_event(&mut self) -> Option<notify::Result<Event>> {
        loop {
            match self.receiver.recv().await? {
                Ok(event) if !is_event_relevant_to_file(&event, &self.file_name) => continue,
                other => return Some(other),
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn file_path(&self) -> &Path {
        &self.file_path
    }
}

/// Waits on an optional watcher; with none, the future never resolves.
pub(crate) async fn next_event(watcher: &mut Option<PathWatcher>) -> Option<notify::Result<Event>> {
    match watcher {
        Some(watcher) => watcher.next_event().await,
        None => std::future::pending().await,
    }
}

/// Check if a notify event is relevant to a specific file
pub(crate) fn is_event_relevant_to_file(event: &Event, target_file_name: &str) -> bool {
    event.paths.iter().any(|path| {
        path.file_name()
            .map(|name| name.to_string_lossy() == target_file_name)
            .unwrap_or(false)
    })
}
