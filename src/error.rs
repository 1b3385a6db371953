//! Error types for the chat log monitor.

use thiserror::Error;

/// The main error type for monitor operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A filter pattern is not a valid regular expression.
    #[error("Invalid filter pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Failure while tailing the log file.
    #[error(transparent)]
    Watch(#[from] WatchError),

    /// I/O errors outside of tailing, e.g. reading a settings file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Settings file could not be parsed.
    #[error("Config error: {0}")]
    Config(#[from] toml::de::Error),
}

/// Errors raised while tailing a file.
///
/// These never stop the tail task; they are reported to the owner and the
/// watcher keeps trying to recover.
#[derive(Error, Debug)]
pub enum WatchError {
    /// I/O errors when opening or reading the file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File watching errors from the notify crate.
    #[error("File watcher error: {0}")]
    Notify(#[from] notify::Error),

    /// The file has been absent for longer than the retry policy allows.
    #[error("File no longer exists: {path}")]
    FileNotFound { path: String },
}

/// A convenient Result type for monitor operations.
pub type Result<T> = std::result::Result<T, Error>;
