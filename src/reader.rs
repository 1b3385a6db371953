//! Incremental reads from a tailed file.

use crate::error::WatchError;
use std::fs::Metadata;
use std::io::{self, ErrorKind, SeekFrom};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;

/// Identity of the file behind a path: device and inode on Unix.
///
/// Other platforms fall back to size-based truncation detection only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FileId {
    dev: u64,
    ino: u64,
}

impl FileId {
    #[cfg(unix)]
    pub(crate) fn from_metadata(metadata: &Metadata) -> Option<Self> {
        use std::os::unix::fs::MetadataExt;

        Some(Self {
            dev: metadata.dev(),
            ino: metadata.ino(),
        })
    }

    #[cfg(not(unix))]
    pub(crate) fn from_metadata(_metadata: &Metadata) -> Option<Self> {
        None
    }
}

/// Read position within the tailed file plus any unterminated trailing bytes.
#[derive(Debug, Default)]
pub(crate) struct TailCursor {
    position: u64,
    file_id: Option<FileId>,
    /// The byte just before `position`, re-checked on every read.
    last_byte: Option<u8>,
    partial: Vec<u8>,
    /// Start offset still unknown; fixed at the file's end on the next read.
    unanchored: bool,
}

impl TailCursor {
    /// Positions a cursor at the current end of `path`.
    ///
    /// A file that does not exist yet starts at offset zero so that everything
    /// written once it appears is read. Any other failure leaves the cursor
    /// unanchored; the next successful read places it at the end of the file.
    pub(crate) async fn at_end_of(path: &Path) -> Self {
        match Self::open_at_end(path).await {
            Ok(cursor) => cursor,
            Err(e) if e.kind() == ErrorKind::NotFound => Self::default(),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "start offset deferred");
                Self {
                    unanchored: true,
                    ..Self::default()
                }
            }
        }
    }

    async fn open_at_end(path: &Path) -> io::Result<Self> {
        let mut file = File::open(path).await?;
        let metadata = file.metadata().await?;
        let mut cursor = Self::default();
        cursor.reset_to_end(&mut file, &metadata).await?;
        Ok(cursor)
    }

    pub(crate) fn position(&self) -> u64 {
        self.position
    }

    /// Appends freshly read bytes and returns every line they complete.
    ///
    /// The bytes after the last `\n` stay buffered until their terminator
    /// arrives.
    pub(crate) fn push_bytes(&mut self, bytes: &[u8]) -> Vec<String> {
        self.partial.extend_from_slice(bytes);

        let Some(end) = self.partial.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };

        let rest = self.partial.split_off(end + 1);
        let complete = std::mem::replace(&mut self.partial, rest);
        split_lines(&complete)
    }

    /// Moves to the current end of `file`, dropping any buffered partial line.
    async fn reset_to_end(&mut self, file: &mut File, metadata: &Metadata) -> io::Result<()> {
        let size = metadata.len();
        let last_byte = match size.checked_sub(1) {
            Some(offset) => Some(byte_at(file, offset).await?),
            None => None,
        };

        self.position = size;
        self.file_id = FileId::from_metadata(metadata);
        self.last_byte = last_byte;
        self.partial.clear();
        self.unanchored = false;
        Ok(())
    }
}

async fn byte_at(file: &mut File, offset: u64) -> io::Result<u8> {
    file.seek(SeekFrom::Start(offset)).await?;
    file.read_u8().await
}

/// Reads whatever was appended to `path` since the cursor's position.
///
/// Returns `Ok(None)` when the file does not currently exist.
pub(crate) async fn read_appended(
    path: &Path,
    cursor: &mut TailCursor,
) -> Result<Option<Vec<String>>, WatchError> {
    let mut file = match File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let metadata = file.metadata().await?;
    let current_size = metadata.len();
    let current_id = FileId::from_metadata(&metadata);

    if cursor.unanchored {
        cursor.reset_to_end(&mut file, &metadata).await?;
        debug!(path = %path.display(), offset = cursor.position, "start offset fixed");
        return Ok(Some(Vec::new()));
    }

    // Handle rotation and truncation
    if detect_file_replaced(cursor.file_id, current_id)
        || detect_file_truncation(current_size, cursor.position)
    {
        debug!(
            path = %path.display(),
            old_position = cursor.position,
            new_position = current_size,
            "log file rotated or truncated"
        );
        cursor.reset_to_end(&mut file, &metadata).await?;
        return Ok(Some(Vec::new()));
    }
    cursor.file_id = current_id;

    let bytes_to_read = match calculate_bytes_to_read(current_size, cursor.position) {
        Some(bytes) => bytes,
        None => return Ok(Some(Vec::new())),
    };

    // Re-read the last consumed byte in front of the new data.
    let expected = cursor.last_byte.filter(|_| cursor.position > 0);
    let lead = u64::from(expected.is_some());

    file.seek(SeekFrom::Start(cursor.position - lead)).await?;

    let mut buf = Vec::new();
    (&mut file).take(bytes_to_read + lead).read_to_end(&mut buf).await?;

    let fresh = match expected {
        None => buf.as_slice(),
        Some(expected) => match buf.split_first() {
            Some((&first, rest)) if first == expected => rest,
            _ => {
                // Truncated and regrown past the old offset between two reads.
                debug!(
                    path = %path.display(),
                    old_position = cursor.position,
                    new_position = current_size,
                    "log file rewritten in place"
                );
                cursor.reset_to_end(&mut file, &metadata).await?;
                return Ok(Some(Vec::new()));
            }
        },
    };

    cursor.position += fresh.len() as u64;
    if let Some(&last) = fresh.last() {
        cursor.last_byte = Some(last);
    }

    Ok(Some(cursor.push_bytes(fresh)))
}

/// Splits terminated content into lines, dropping `\r` and blank lines.
fn split_lines(content: &[u8]) -> Vec<String> {
    content
        .split(|&b| b == b'\n')
        .filter_map(|raw| {
            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
            let line = String::from_utf8_lossy(raw);
            if line.trim().is_empty() {
                None
            } else {
                Some(line.into_owned())
            }
        })
        .collect()
}

/// A different inode behind the same path means the file was replaced.
fn detect_file_replaced(previous: Option<FileId>, current: Option<FileId>) -> bool {
    matches!((previous, current), (Some(prev), Some(cur)) if prev != cur)
}

/// Detect if the file was truncated by comparing current size with last position
fn detect_file_truncation(current_size: u64, last_position: u64) -> bool {
    current_size < last_position
}

/// Calculate bytes to read based on current size and last position
fn calculate_bytes_to_read(current_size: u64, last_position: u64) -> Option<u64> {
    if current_size <= last_position {
        None
    } else {
        Some(current_size - last_position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::TempLogFile;

    #[test]
    fn test_push_bytes_buffers_partial_line() {
        let mut cursor = TailCursor::default();

        assert!(cursor.push_bytes(b"[2023-...] #Global] Pl").is_empty());
        assert_eq!(
            cursor.push_bytes(b"ayer: hello\n"),
            vec!["[2023-...] #Global] Player: hello"]
        );
        assert!(cursor.partial.is_empty());
    }

    #[test]
    fn test_push_bytes_multiple_terminators() {
        let mut cursor = TailCursor::default();

        let lines = cursor.push_bytes(b"one\ntwo\nthree\nfou");
        assert_eq!(lines, vec!["one", "two", "three"]);
        assert_eq!(cursor.push_bytes(b"r\n"), vec!["four"]);
    }

    #[test]
    fn test_split_lines_strips_carriage_returns_and_blanks() {
        let lines = split_lines(b"a\r\n\r\n  \nb\n");
        assert_eq!(lines, vec!["a", "b"]);
    }

    #[test]
    fn test_split_lines_preserves_inner_whitespace() {
        let lines = split_lines(b"  line1  \n  line2  \n");
        assert_eq!(lines, vec!["  line1  ", "  line2  "]);
    }

    #[test]
    fn test_split_lines_lossy_utf8() {
        let lines = split_lines(b"caf\xff\n");
        assert_eq!(lines, vec!["caf\u{fffd}"]);
    }

    #[test]
    fn test_detect_file_truncation() {
        assert!(detect_file_truncation(100, 200));
        assert!(!detect_file_truncation(200, 100));
        assert!(!detect_file_truncation(100, 100));
        assert!(!detect_file_truncation(u64::MAX, u64::MAX - 1));
    }

    #[test]
    fn test_detect_file_replaced() {
        let a = FileId { dev: 1, ino: 10 };
        let b = FileId { dev: 1, ino: 11 };

        assert!(detect_file_replaced(Some(a), Some(b)));
        assert!(!detect_file_replaced(Some(a), Some(a)));
        assert!(!detect_file_replaced(None, Some(a)));
        assert!(!detect_file_replaced(Some(a), None));
    }

    #[test]
    fn test_calculate_bytes_to_read() {
        assert_eq!(calculate_bytes_to_read(200, 100), Some(100));
        assert_eq!(calculate_bytes_to_read(100, 100), None);
        assert_eq!(calculate_bytes_to_read(50, 100), None);
        assert_eq!(calculate_bytes_to_read(0, 0), None);
    }

    #[tokio::test]
    async fn test_cursor_starts_at_end_of_existing_file() {
        let log = TempLogFile::with_content("old line").unwrap();
        let mut cursor = TailCursor::at_end_of(log.path()).await;

        assert_eq!(cursor.position(), "old line\n".len() as u64);
        assert_eq!(read_appended(log.path(), &mut cursor).await.unwrap(), Some(vec![]));

        log.append_content("new line").unwrap();
        assert_eq!(
            read_appended(log.path(), &mut cursor).await.unwrap(),
            Some(vec!["new line".to_string()])
        );
    }

    #[tokio::test]
    async fn test_cursor_for_missing_file_reads_from_start() {
        let log = TempLogFile::new().unwrap();
        let path = log.path().with_file_name("later.log");
        let mut cursor = TailCursor::at_end_of(&path).await;

        assert_eq!(cursor.position(), 0);
        assert_eq!(read_appended(&path, &mut cursor).await.unwrap(), None);

        std::fs::write(&path, "first\nsecond\n").unwrap();
        assert_eq!(
            read_appended(&path, &mut cursor).await.unwrap(),
            Some(vec!["first".to_string(), "second".to_string()])
        );
    }

    #[tokio::test]
    async fn test_read_partial_line_across_appends() {
        let log = TempLogFile::new().unwrap();
        let mut cursor = TailCursor::at_end_of(log.path()).await;

        log.append_raw("2023-01-01 12:00:00 [Zone] #Pl").unwrap();
        assert_eq!(read_appended(log.path(), &mut cursor).await.unwrap(), Some(vec![]));

        log.append_raw("ayer: hello\n").unwrap();
        assert_eq!(
            read_appended(log.path(), &mut cursor).await.unwrap(),
            Some(vec!["2023-01-01 12:00:00 [Zone] #Player: hello".to_string()])
        );
    }

    #[tokio::test]
    async fn test_truncation_resumes_at_new_end() {
        let log = TempLogFile::with_content("line 1\nline 2\nline 3").unwrap();
        let mut cursor = TailCursor::at_end_of(log.path()).await;
        log.append_raw("half").unwrap();
        read_appended(log.path(), &mut cursor).await.unwrap();

        log.truncate().unwrap();
        assert_eq!(read_appended(log.path(), &mut cursor).await.unwrap(), Some(vec![]));
        assert_eq!(cursor.position(), 0);
        assert!(cursor.partial.is_empty());

        log.append_content("after rotation").unwrap();
        assert_eq!(
            read_appended(log.path(), &mut cursor).await.unwrap(),
            Some(vec!["after rotation".to_string()])
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_replaced_file_resumes_at_its_end() {
        let log = TempLogFile::with_content("short").unwrap();
        let mut cursor = TailCursor::at_end_of(log.path()).await;

        log.rotate("a much longer replacement file body\n").unwrap();
        assert_eq!(read_appended(log.path(), &mut cursor).await.unwrap(), Some(vec![]));
        assert_eq!(
            cursor.position(),
            "a much longer replacement file body\n".len() as u64
        );

        log.append_content("fresh").unwrap();
        assert_eq!(
            read_appended(log.path(), &mut cursor).await.unwrap(),
            Some(vec!["fresh".to_string()])
        );
    }

    #[tokio::test]
    async fn test_rewrite_past_old_offset_is_not_read_mid_line() {
        let log = TempLogFile::with_content("aaaaaaaaaa").unwrap();
        let mut cursor = TailCursor::at_end_of(log.path()).await;
        assert_eq!(cursor.position(), 11);

        log.truncate().unwrap();
        log.append_content("2023-01-01 12:00:00 [Zone] #X: hello").unwrap();

        assert_eq!(read_appended(log.path(), &mut cursor).await.unwrap(), Some(vec![]));
        assert_eq!(
            cursor.position(),
            "2023-01-01 12:00:00 [Zone] #X: hello\n".len() as u64
        );

        log.append_content("next").unwrap();
        assert_eq!(
            read_appended(log.path(), &mut cursor).await.unwrap(),
            Some(vec!["next".to_string()])
        );
    }

    #[tokio::test]
    async fn test_rewrite_drops_buffered_partial_line() {
        let log = TempLogFile::new().unwrap();
        let mut cursor = TailCursor::at_end_of(log.path()).await;
        log.append_raw("2023-01-01 12:00:00 [Zone] #Pl").unwrap();
        read_appended(log.path(), &mut cursor).await.unwrap();

        log.truncate().unwrap();
        log.append_content("0123456789012345678901234567890123456789").unwrap();

        assert_eq!(read_appended(log.path(), &mut cursor).await.unwrap(), Some(vec![]));
        assert!(cursor.partial.is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_path_defers_start_offset() {
        let log = TempLogFile::new().unwrap();
        // A regular file cannot have children, so this fails with something other than NotFound.
        let path = log.path().join("child");

        let mut cursor = TailCursor::at_end_of(&path).await;
        assert!(cursor.unanchored);
        assert!(matches!(
            read_appended(&path, &mut cursor).await,
            Err(WatchError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_unanchored_cursor_skips_existing_content() {
        let log = TempLogFile::with_content("written before the first read").unwrap();
        let mut cursor = TailCursor {
            unanchored: true,
            ..TailCursor::default()
        };

        assert_eq!(read_appended(log.path(), &mut cursor).await.unwrap(), Some(vec![]));
        assert_eq!(
            cursor.position(),
            "written before the first read\n".len() as u64
        );

        log.append_content("after").unwrap();
        assert_eq!(
            read_appended(log.path(), &mut cursor).await.unwrap(),
            Some(vec!["after".to_string()])
        );
    }
}
