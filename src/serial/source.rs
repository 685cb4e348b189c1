// Line sources feeding the telegram framer

use super::comm::{decode_line_bytes, Result, SerialPort, TransportError};
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Anything that yields P1 text lines, trimmed of their line terminators.
///
/// A read that times out returns `TransportError::Timeout`; callers retry
/// and any state they hold (framer buffer) stays intact.
#[allow(async_fn_in_trait)]
pub trait ByteSource {
    async fn read_line(&mut self, timeout: Duration) -> Result<String>;
}

impl ByteSource for SerialPort {
    async fn read_line(&mut self, timeout: Duration) -> Result<String> {
        SerialPort::read_line(self, timeout).await
    }
}

/// Replays a recorded capture, one line per read
#[derive(Debug, Clone, Default)]
pub struct ReplaySource {
    lines: VecDeque<String>,
}

impl ReplaySource {
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    /// Split a capture on LF; a trailing CR on each line is dropped
    pub fn from_text(text: &str) -> Self {
        let mut lines: VecDeque<String> = text
            .split('\n')
            .map(|l| decode_line_bytes(l.as_bytes()))
            .collect();
        // A final newline leaves one empty tail element that is not a line
        if text.ends_with('\n') {
            lines.pop_back();
        }
        Self { lines }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let bytes = fs::read(path)?;
        Ok(Self::from_text(&String::from_utf8_lossy(&bytes)))
    }

    /// Lines not yet consumed
    pub fn remaining(&self) -> usize {
        self.lines.len()
    }
}

impl ByteSource for ReplaySource {
    async fn read_line(&mut self, _timeout: Duration) -> Result<String> {
        self.lines.pop_front().ok_or(TransportError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const T: Duration = Duration::from_secs(1);

    #[tokio::test]
    async fn test_replay_from_text() {
        let mut source = ReplaySource::from_text("/KFM5KAIFA-METER\r\n\r\n!ABCD\r\n");
        assert_eq!(source.remaining(), 3);
        assert_eq!(source.read_line(T).await.unwrap(), "/KFM5KAIFA-METER");
        assert_eq!(source.read_line(T).await.unwrap(), "");
        assert_eq!(source.read_line(T).await.unwrap(), "!ABCD");
        assert!(matches!(source.read_line(T).await, Err(TransportError::Closed)));
    }

    #[tokio::test]
    async fn test_replay_without_trailing_newline() {
        let mut source = ReplaySource::from_text("a\nb");
        assert_eq!(source.read_line(T).await.unwrap(), "a");
        assert_eq!(source.read_line(T).await.unwrap(), "b");
        assert_eq!(source.remaining(), 0);
    }

    #[tokio::test]
    async fn test_replay_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"/ISk5\\2MT382-1000\r\n1-0:1.8.1(000123.456*kWh)\r\n")
            .unwrap();
        file.flush().unwrap();

        let mut source = ReplaySource::from_file(file.path()).unwrap();
        assert_eq!(source.read_line(T).await.unwrap(), "/ISk5\\2MT382-1000");
        assert_eq!(
            source.read_line(T).await.unwrap(),
            "1-0:1.8.1(000123.456*kWh)"
        );
    }

    #[test]
    fn test_replay_missing_file() {
        let result = ReplaySource::from_file("/nonexistent/capture.txt");
        assert!(matches!(result, Err(TransportError::Io(_))));
    }
}
