//! Routes parsed chat lines to matching filters and their observers.
//!
//! A [`Monitor`] owns a [`FilterSet`] and a set of observers. While a file is
//! being watched, every new line is parsed and each filter matching it
//! produces one [`LineDelivery`], handed to every `on_line` callback and every
//! [`subscribe`](Monitor::subscribe) stream.

use crate::config::WatchConfig;
use crate::error::{Result, WatchError};
use crate::event::Event;
use crate::filter::FilterSet;
use crate::parser::{ParseError, parse_line};
use crate::stream::{LineBatch, LineStream};
use futures::Stream;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::task::{Context, Poll};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

/// A parsed line routed to one filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineDelivery {
    pub event: Event,
    /// Raw pattern of the filter that matched.
    pub matched_filter: String,
}

/// Everything a subscriber can receive.
#[derive(Debug, Clone)]
pub enum Delivery {
    Line(LineDelivery),
    Error(Arc<WatchError>),
}

/// Counters describing what a monitor has processed so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorStats {
    pub lines: u64,
    pub parse_failures: u64,
    pub deliveries: u64,
    pub watch_errors: u64,
    /// Callbacks that panicked; dispatch carries on after each one.
    pub callback_panics: u64,
}

type LineCallback = Arc<dyn Fn(&LineDelivery) + Send + Sync>;
type ErrorCallback = Arc<dyn Fn(&WatchError) + Send + Sync>;

#[derive(Default)]
struct Counters {
    lines: AtomicU64,
    parse_failures: AtomicU64,
    deliveries: AtomicU64,
    watch_errors: AtomicU64,
    callback_panics: AtomicU64,
}

/// State shared between the control side and the dispatch task.
#[derive(Default)]
struct Shared {
    filters: RwLock<FilterSet>,
    line_callbacks: RwLock<Vec<LineCallback>>,
    error_callbacks: RwLock<Vec<ErrorCallback>>,
    subscribers: Mutex<Vec<mpsc::Sender<Delivery>>>,
    counters: Counters,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Shared {
    async fn dispatch(&self, batch: LineBatch) {
        match batch {
            Ok(lines) => {
                for line in &lines {
                    self.process_line(line).await;
                }
            }
            Err(error) => self.process_error(error).await,
        }
    }

    /// Handles one raw line, splitting it first if it carries terminators.
    async fn process_line(&self, line: &str) {
        for line in line.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);

            let event = match parse_line(line) {
                Ok(event) => event,
                Err(ParseError::EmptyLine) => continue,
                Err(e) => {
                    self.counters.lines.fetch_add(1, Ordering::Relaxed);
                    self.counters.parse_failures.fetch_add(1, Ordering::Relaxed);
                    debug!(error = %e, "skipping unclassified line");
                    continue;
                }
            };
            self.counters.lines.fetch_add(1, Ordering::Relaxed);

            // Snapshot so no lock is held while observers run.
            let matched = read(&self.filters).matches(line);
            for matched_filter in matched {
                let delivery = LineDelivery {
                    event: event.clone(),
                    matched_filter,
                };
                self.counters.deliveries.fetch_add(1, Ordering::Relaxed);

                let callbacks = read(&self.line_callbacks).clone();
                for callback in &callbacks {
                    self.run_callback(|| callback(&delivery));
                }
                self.publish(Delivery::Line(delivery)).await;
            }
        }
    }

    async fn process_error(&self, error: WatchError) {
        self.counters.watch_errors.fetch_add(1, Ordering::Relaxed);

        let callbacks = read(&self.error_callbacks).clone();
        for callback in &callbacks {
            self.run_callback(|| callback(&error));
        }
        self.publish(Delivery::Error(Arc::new(error))).await;
    }

    /// Runs one observer callback, containing a panic so the dispatch task survives it.
    fn run_callback(&self, callback: impl FnOnce()) {
        if panic::catch_unwind(AssertUnwindSafe(callback)).is_err() {
            self.counters.callback_panics.fetch_add(1, Ordering::Relaxed);
            warn!("observer callback panicked");
        }
    }

    /// Sends to every subscriber, waiting for room in full queues.
    async fn publish(&self, delivery: Delivery) {
        let subscribers = lock(&self.subscribers).clone();
        if subscribers.is_empty() {
            return;
        }

        let mut saw_closed = false;
        for tx in &subscribers {
            if tx.send(delivery.clone()).await.is_err() {
                saw_closed = true;
            }
        }

        if saw_closed {
            lock(&self.subscribers).retain(|tx| !tx.is_closed());
        }
    }

    fn stats(&self) -> MonitorStats {
        MonitorStats {
            lines: self.counters.lines.load(Ordering::Relaxed),
            parse_failures: self.counters.parse_failures.load(Ordering::Relaxed),
            deliveries: self.counters.deliveries.load(Ordering::Relaxed),
            watch_errors: self.counters.watch_errors.load(Ordering::Relaxed),
            callback_panics: self.counters.callback_panics.load(Ordering::Relaxed),
        }
    }
}

struct ActiveWatch {
    path: PathBuf,
    shutdown_tx: broadcast::Sender<()>,
    task_handle: JoinHandle<()>,
}

/// Watches one chat log at a time and routes its lines to filters.
///
/// Filters and observers belong to the monitor and are kept when the watched
/// path changes. Filter operations take `&self` and may be called from any
/// thread while a watch is running.
///
/// `on_line` and `on_error` callbacks run on the dispatch task, one line at a
/// time in file order; they must return quickly. A callback that panics is
/// counted in [`MonitorStats::callback_panics`] and dispatch continues.
/// Use [`Monitor::subscribe`] to consume deliveries elsewhere through a
/// bounded queue.
pub struct Monitor {
    config: WatchConfig,
    shared: Arc<Shared>,
    active: Option<ActiveWatch>,
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new()
    }
}

impl Monitor {
    pub fn new() -> Self {
        Self::with_config(WatchConfig::default())
    }

    pub fn with_config(config: WatchConfig) -> Self {
        Self {
            config,
            shared: Arc::new(Shared::default()),
            active: None,
        }
    }

    /// Starts watching `path`, replacing any file watched so far.
    ///
    /// Only lines appended after this call are delivered.
    pub async fn watch<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.unwatch().await;

        let path = path.as_ref().to_path_buf();
        let lines = LineStream::new(&path, self.config.clone()).await?;
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let shared = Arc::clone(&self.shared);
        let task_handle = tokio::spawn(dispatch_task(lines, shared, shutdown_rx));

        info!(path = %path.display(), "watching chat log");
        self.active = Some(ActiveWatch {
            path,
            shutdown_tx,
            task_handle,
        });
        Ok(())
    }

    /// Stops watching. No delivery happens once this returns.
    ///
    /// Does nothing when no file is being watched.
    pub async fn unwatch(&mut self) {
        let Some(active) = self.active.take() else {
            return;
        };

        let _ = active.shutdown_tx.send(());
        if let Err(e) = active.task_handle.await {
            warn!(path = %active.path.display(), error = %e, "dispatch task ended abnormally");
        }
        info!(path = %active.path.display(), "stopped watching chat log");
    }

    /// Whether a watch is running. False once the dispatch task has ended.
    pub fn is_active(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| !active.task_handle.is_finished())
    }

    /// The path currently being watched.
    pub fn path(&self) -> Option<&Path> {
        self.active.as_ref().map(|active| active.path.as_path())
    }

    /// Adds a case-insensitive filter. Adding an existing pattern is a no-op.
    pub fn add_filter(&self, pattern: &str) -> Result<()> {
        write(&self.shared.filters).add(pattern)?;
        debug!(pattern, "filter added");
        Ok(())
    }

    /// Removes the filter with exactly this pattern, if any.
    pub fn remove_filter(&self, pattern: &str) -> bool {
        let removed = write(&self.shared.filters).remove(pattern);
        if removed {
            debug!(pattern, "filter removed");
        }
        removed
    }

    pub fn list_filters(&self) -> Vec<String> {
        read(&self.shared.filters).list()
    }

    /// Registers a callback for every line delivery.
    pub fn on_line<F>(&self, callback: F)
    where
        F: Fn(&LineDelivery) + Send + Sync + 'static,
    {
        write(&self.shared.line_callbacks).push(Arc::new(callback));
    }

    /// Registers a callback for every watch error.
    pub fn on_error<F>(&self, callback: F)
    where
        F: Fn(&WatchError) + Send + Sync + 'static,
    {
        write(&self.shared.error_callbacks).push(Arc::new(callback));
    }

    /// Returns a stream receiving every delivery from now on.
    ///
    /// The stream buffers up to `delivery_capacity` items; while it is full
    /// the dispatch task waits for it. Dropping the stream unsubscribes.
    pub fn subscribe(&self) -> DeliveryStream {
        let (tx, rx) = mpsc::channel(self.config.delivery_capacity.max(1));
        lock(&self.shared.subscribers).push(tx);
        DeliveryStream { receiver: rx }
    }

    pub fn stats(&self) -> MonitorStats {
        self.shared.stats()
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        if let Some(active) = &self.active {
            let _ = active.shutdown_tx.send(());
        }
    }
}

/// Background task feeding tailed lines through the filters.
async fn dispatch_task(
    mut lines: LineStream,
    shared: Arc<Shared>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,

            batch = lines.next() => {
                let Some(batch) = batch else { break };
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = shared.dispatch(batch) => {}
                }
            }
        }
    }

    lines.unwatch().await;
}

/// Deliveries from a [`Monitor`], in the order they were produced.
pub struct DeliveryStream {
    receiver: mpsc::Receiver<Delivery>,
}

impl Stream for DeliveryStream {
    type Item = Delivery;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}
