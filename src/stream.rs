//! Background tailing of a log file exposed as a stream of line batches.

use crate::config::WatchConfig;
use crate::error::{Result, WatchError};
use crate::reader::{TailCursor, read_appended};
use crate::watcher::{self, PathWatcher};
use futures::Stream;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// One item of a [`LineStream`]: newly completed lines, or a recoverable error.
pub type LineBatch = std::result::Result<Vec<String>, WatchError>;

/// A stream of lines appended to a file after the watch started.
///
/// Lines already in the file are never replayed. Truncation and replacement of
/// the file are tolerated, as is the file not existing yet.
pub struct LineStream {
    path: PathBuf,
    receiver: mpsc::Receiver<LineBatch>,
    shutdown_tx: broadcast::Sender<()>,
    task_handle: Option<JoinHandle<()>>,
}

impl LineStream {
    /// Starts tailing `path`.
    ///
    /// The start offset is fixed before this returns, so anything appended
    /// afterwards is delivered. A file that cannot be inspected yet does not
    /// fail here; the error is reported on the stream and reading starts at
    /// the file's end once it becomes readable.
    pub async fn new<P: AsRef<Path>>(path: P, config: WatchConfig) -> Result<Self> {
        let file_path = path.as_ref().to_path_buf();
        let cursor = TailCursor::at_end_of(&file_path).await;

        let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        debug!(path = %file_path.display(), offset = cursor.position(), "tail started");

        let task_path = file_path.clone();
        let task_handle = tokio::spawn(async move {
            tail_task(task_path, cursor, config, tx, shutdown_rx).await;
        });

        Ok(LineStream {
            path: file_path,
            receiver: rx,
            shutdown_tx,
            task_handle: Some(task_handle),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stops tailing and waits for the background task to release the file.
    ///
    /// Consumes the stream, so it can only happen once. Lines appended
    /// afterwards are not read.
    pub async fn unwatch(mut self) {
        let _ = self.shutdown_tx.send(());
        // Wakes the task if it is blocked on a full channel.
        self.receiver.close();

        if let Some(handle) = self.task_handle.take() {
            if let Err(e) = handle.await {
                warn!(path = %self.path.display(), error = %e, "tail task ended abnormally");
            }
        }
        debug!(path = %self.path.display(), "tail stopped");
    }

    /// Check if the stream has been closed/dropped
    #[cfg(test)]
    pub fn is_closed(&self) -> bool {
        self.receiver.is_closed()
    }
}

impl Drop for LineStream {
    fn drop(&mut self) {
        // Ignore errors if the task already exited.
        let _ = self.shutdown_tx.send(());
    }
}

impl Stream for LineStream {
    type Item = LineBatch;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

/// Outcome bookkeeping for error reporting across reads.
#[derive(Debug, Default)]
struct ReportState {
    missing_ticks: u32,
    missing_reported: bool,
    last_error: Option<String>,
}

/// Background task that handles file watching and reading
async fn tail_task(
    file_path: PathBuf,
    mut cursor: TailCursor,
    config: WatchConfig,
    tx: mpsc::Sender<LineBatch>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut state = ReportState::default();

    let mut fs_watcher = match start_path_watcher(&file_path) {
        Ok(watcher) => Some(watcher),
        Err(e) => {
            warn!(path = %file_path.display(), error = %e, "falling back to polling");
            if tx.send(Err(e)).await.is_err() {
                return;
            }
            None
        }
    };

    let mut ticker = tokio::time::interval(config.poll_interval.max(MIN_POLL_INTERVAL));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let keep_going = tokio::select! {
            _ = shutdown_rx.recv() => break,

            event = watcher::next_event(&mut fs_watcher) => match event {
                Some(Ok(_)) => scan(&file_path, &mut cursor, &mut state, &tx, None).await,
                Some(Err(e)) => report(&mut state, WatchError::Notify(e), &tx).await,
                None => {
                    // Notify side went away; poll ticks still cover us.
                    fs_watcher = None;
                    true
                }
            },

            _ = ticker.tick() => {
                let limit = Some(config.missing_retry_limit);
                scan(&file_path, &mut cursor, &mut state, &tx, limit).await
            }
        };

        if !keep_going {
            break;
        }
    }
}

fn start_path_watcher(path: &Path) -> std::result::Result<PathWatcher, WatchError> {
    let mut watcher = PathWatcher::new(path)?;
    watcher.start_watching()?;
    Ok(watcher)
}

/// Reads any new lines and forwards them. Returns `false` once the receiver is gone.
///
/// `missing_limit` is set on poll ticks only, so that the absence streak is
/// measured in ticks rather than in filesystem events.
async fn scan(
    path: &Path,
    cursor: &mut TailCursor,
    state: &mut ReportState,
    tx: &mpsc::Sender<LineBatch>,
    missing_limit: Option<u32>,
) -> bool {
    match read_appended(path, cursor).await {
        Ok(Some(lines)) => {
            state.missing_ticks = 0;
            state.missing_reported = false;
            state.last_error = None;
            if lines.is_empty() {
                return true;
            }
            tx.send(Ok(lines)).await.is_ok()
        }
        Ok(None) => {
            let Some(limit) = missing_limit else {
                return true;
            };
            state.missing_ticks = state.missing_ticks.saturating_add(1);
            if state.missing_reported || state.missing_ticks < limit {
                return true;
            }
            state.missing_reported = true;
            let path = path.display().to_string();
            warn!(path = %path, ticks = state.missing_ticks, "log file missing");
            tx.send(Err(WatchError::FileNotFound { path })).await.is_ok()
        }
        Err(e) => report(state, e, tx).await,
    }
}

/// Sends an error unless the same one was the last thing reported.
async fn report(state: &mut ReportState, error: WatchError, tx: &mpsc::Sender<LineBatch>) -> bool {
    let text = error.to_string();
    if state.last_error.as_deref() == Some(text.as_str()) {
        return true;
    }
    warn!(error = %text, "watch error");
    state.last_error = Some(text);
    tx.send(Err(error)).await.is_ok()
}
