//! Classification of raw log lines into [`Event`]s.

use crate::event::{Channel, Event, Timestamp};
use chrono::NaiveDateTime;
use thiserror::Error;

/// Date-time layouts tried against the first two fields of a line.
const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%d/%b/%Y %H:%M:%S",
];

/// Why a line could not be turned into an [`Event`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty line")]
    EmptyLine,

    /// None of the channel markers occur in the line.
    #[error("no channel marker in line: {line:?}")]
    NoChannelMarker { line: String },
}

/// Parses one log line.
///
/// The timestamp comes from the first two whitespace-separated fields and may
/// be [`Timestamp::Invalid`]. The channel is the first entry of
/// [`Channel::PRIORITY`] whose marker occurs anywhere in the line.
pub fn parse_line(line: &str) -> Result<Event, ParseError> {
    if line.trim().is_empty() {
        return Err(ParseError::EmptyLine);
    }

    let timestamp = parse_timestamp(line);

    let (channel, remainder) = find_channel(line).ok_or_else(|| ParseError::NoChannelMarker {
        line: line.to_string(),
    })?;

    // Colons only separate the speaker; later ones are dropped from the message.
    let mut fragments = remainder.split(':');
    let speaker = fragments.next().unwrap_or_default();
    let message: String = fragments.collect();

    Ok(Event {
        timestamp,
        channel,
        speaker: clean_speaker(speaker).to_string(),
        message: message.trim().to_string(),
    })
}

fn parse_timestamp(line: &str) -> Timestamp {
    let mut fields = line.split_whitespace();
    let raw = match (fields.next(), fields.next()) {
        (Some(date), Some(time)) => format!("{date} {time}"),
        (Some(date), None) => date.to_string(),
        _ => String::new(),
    };

    TIMESTAMP_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(&raw, format).ok())
        .map_or(Timestamp::Invalid(raw), Timestamp::Valid)
}

/// Selects the channel and returns the text following its first marker.
fn find_channel(line: &str) -> Option<(Channel, &str)> {
    Channel::PRIORITY.iter().find_map(|&channel| {
        let marker = channel.marker();
        line.find(marker)
            .map(|idx| (channel, &line[idx + marker.len()..]))
    })
}

/// Drops a bracketed channel label (`Global] Trader`) in front of the name.
fn clean_speaker(speaker: &str) -> &str {
    let speaker = speaker.trim();
    match speaker.rfind("] ") {
        Some(idx) => speaker[idx + 2..].trim(),
        None => speaker,
    }
}
