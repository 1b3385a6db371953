//! Test utilities for creating temporary log files.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct TempLogFile {
    pub path: PathBuf,
    _temp_dir: tempfile::TempDir,
}

impl TempLogFile {
    /// Create a new, empty temporary log file
    pub fn new() -> std::io::Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("Client.txt");

        File::create(&path)?;

        Ok(Self {
            path,
            _temp_dir: temp_dir,
        })
    }

    /// Create a temporary log file with initial content
    pub fn with_content(content: &str) -> std::io::Result<Self> {
        let temp_file = Self::new()?;
        temp_file.append_content(content)?;
        Ok(temp_file)
    }

    /// Append content followed by a newline
    pub fn append_content(&self, content: &str) -> std::io::Result<()> {
        self.append_raw(&format!("{content}\n"))
    }

    /// Append bytes exactly as given, without a trailing newline
    pub fn append_raw(&self, content: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        file.write_all(content.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    /// Truncate the file in place
    pub fn truncate(&self) -> std::io::Result<()> {
        File::create(&self.path)?;
        Ok(())
    }

    /// Move the current file aside and create a new one holding `content`
    pub fn rotate(&self, content: &str) -> std::io::Result<()> {
        std::fs::rename(&self.path, self.path.with_extension("txt.1"))?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }

    /// Get the path to the temporary file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_log_file_creation() {
        let temp_file = TempLogFile::new().unwrap();
        assert!(temp_file.path().exists());
    }

    #[test]
    fn test_append_raw_and_content() {
        let temp_file = TempLogFile::new().unwrap();
        temp_file.append_raw("partial").unwrap();
        temp_file.append_content(" line").unwrap();

        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        assert_eq!(content, "partial line\n");
    }

    #[test]
    fn test_truncate() {
        let temp_file = TempLogFile::with_content("initial content").unwrap();
        temp_file.truncate().unwrap();

        let content = std::fs::read_to_string(temp_file.path()).unwrap();
        assert!(content.is_empty());
    }

    #[test]
    fn test_rotate_keeps_old_file_aside() {
        let temp_file = TempLogFile::with_content("old").unwrap();
        temp_file.rotate("new\n").unwrap();

        assert_eq!(std::fs::read_to_string(temp_file.path()).unwrap(), "new\n");
        let rotated = temp_file.path().with_extension("txt.1");
        assert_eq!(std::fs::read_to_string(rotated).unwrap(), "old\n");
    }
}
