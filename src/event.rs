//! Structured chat events produced from log lines.

use chrono::NaiveDateTime;
use std::fmt;

/// The chat category a line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Global,
    Trade,
    Whisper,
    Local,
}

impl Channel {
    /// Channels in the order their markers must be tried.
    ///
    /// `Local`'s marker is a prefix of every other marker, so it goes last.
    pub const PRIORITY: [Channel; 4] = [
        Channel::Global,
        Channel::Trade,
        Channel::Whisper,
        Channel::Local,
    ];

    /// The substring that identifies this channel in a log line.
    pub fn marker(self) -> &'static str {
        match self {
            Channel::Global => "] #",
            Channel::Trade => "] $",
            Channel::Whisper => "] @",
            Channel::Local => "] ",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Global => "GLOBAL",
            Channel::Trade => "TRADE",
            Channel::Whisper => "WHISPER",
            Channel::Local => "LOCAL",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Leading date-time of a line.
///
/// Lines without a recognizable date still parse; they carry the raw text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Timestamp {
    Valid(NaiveDateTime),
    Invalid(String),
}

impl Timestamp {
    pub fn is_valid(&self) -> bool {
        matches!(self, Timestamp::Valid(_))
    }

    pub fn datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Timestamp::Valid(dt) => Some(*dt),
            Timestamp::Invalid(_) => None,
        }
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Timestamp::Valid(dt) => write!(f, "{}", dt.format("%m/%d/%y %I:%M:%S %p")),
            Timestamp::Invalid(_) => f.write_str("--/--/-- --:--:--"),
        }
    }
}

/// A parsed chat line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub timestamp: Timestamp,
    pub channel: Channel,
    pub speaker: String,
    pub message: String,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}: {}",
            self.timestamp, self.channel, self.speaker, self.message
        )
    }
}
