//! A chat log monitor that tails a game's chat log and routes lines to filters.
//!
//! New lines are classified into an [`Event`] (timestamp, [`Channel`],
//! speaker, message) and matched against case-insensitive regex filters. Each
//! matching filter yields one [`LineDelivery`] to the monitor's observers.
//!
//! # Example
//!
//! ```rust,no_run
//! use chatcop::{Delivery, Monitor};
//! use tokio_stream::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut monitor = Monitor::new();
//!     monitor.add_filter("wtb|divine")?;
//!     let mut deliveries = monitor.subscribe();
//!
//!     monitor.watch("Client.txt").await?;
//!
//!     while let Some(delivery) = deliveries.next().await {
//!         match delivery {
//!             Delivery::Line(line) => println!("[{}] {}", line.matched_filter, line.event),
//!             Delivery::Error(e) => eprintln!("Error: {}", e),
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

// Internal modules - not part of public API
mod config;
mod error;
mod event;
mod filter;
mod monitor;
mod parser;
mod reader;
mod stream;
mod watcher;

#[cfg(test)]
mod test_helpers;

// Public API exports
pub use config::{Settings, WatchConfig};
pub use error::{Error, Result, WatchError};
pub use event::{Channel, Event, Timestamp};
pub use filter::{Filter, FilterSet};
pub use monitor::{Delivery, DeliveryStream, LineDelivery, Monitor, MonitorStats};
pub use parser::{ParseError, parse_line};
pub use stream::{LineBatch, LineStream};

use std::path::Path;

/// Creates a stream of lines appended to a file from now on.
///
/// # Arguments
///
/// * `path` - File path to monitor; it does not need to exist yet
/// * `config` - Poll interval and buffering settings
///
/// # Example
///
/// ```rust,no_run
/// use chatcop::{WatchConfig, watch_lines};
/// use tokio_stream::StreamExt;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut stream = watch_lines("Client.txt", WatchConfig::default()).await?;
///
///     while let Some(batch) = stream.next().await {
///         for line in batch? {
///             println!("New line: {}", line);
///         }
///     }
///
///     Ok(())
/// }
/// ```
pub async fn watch_lines<P: AsRef<Path>>(path: P, config: WatchConfig) -> Result<LineStream> {
    LineStream::new(path, config).await
}
