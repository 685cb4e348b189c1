// Mock line source for testing without a meter attached

use super::comm::TransportError;
use super::source::ByteSource;
use std::collections::VecDeque;
use std::time::Duration;

enum Scripted {
    Line(String),
    Error(TransportError),
}

/// Scripted source: lines and injected failures are returned in order
pub struct MockByteSource {
    script: VecDeque<Scripted>,

    /// Number of read_line calls made so far
    reads: usize,

    /// Simulated delay for each read (in ms)
    delay_ms: u64,
}

impl MockByteSource {
    /// Create an empty mock source
    pub fn new() -> Self {
        Self {
            script: VecDeque::new(),
            reads: 0,
            delay_ms: 0,
        }
    }

    /// Set simulated delay for each read
    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    /// Queue a line (simulates the meter sending it)
    pub fn push_line(&mut self, line: impl Into<String>) {
        self.script.push_back(Scripted::Line(line.into()));
    }

    /// Queue several lines
    pub fn push_lines<I, S>(&mut self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for line in lines {
            self.push_line(line);
        }
    }

    /// Queue a read failure
    pub fn push_error(&mut self, err: TransportError) {
        self.script.push_back(Scripted::Error(err));
    }

    /// Number of reads performed
    pub fn reads(&self) -> usize {
        self.reads
    }

    /// Number of scripted items left
    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl Default for MockByteSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ByteSource for MockByteSource {
    async fn read_line(&mut self, _timeout: Duration) -> Result<String, TransportError> {
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
        self.reads += 1;

        match self.script.pop_front() {
            Some(Scripted::Line(line)) => Ok(line),
            Some(Scripted::Error(err)) => Err(err),
            None => Err(TransportError::Closed),
        }
    }
}

/// Helper to create a mock source pre-loaded with lines
pub fn mock_source_with_lines(lines: &[&str]) -> MockByteSource {
    let mut source = MockByteSource::new();
    source.push_lines(lines.iter().copied());
    source
}

#[cfg(test)]
mod tests {
    use super::*;

    const T: Duration = Duration::from_secs(1);

    #[tokio::test]
    async fn test_mock_source_basic() {
        let mut source = mock_source_with_lines(&["/XMX5LGBBFG1009021021", "!"]);

        assert_eq!(source.read_line(T).await.unwrap(), "/XMX5LGBBFG1009021021");
        assert_eq!(source.read_line(T).await.unwrap(), "!");
        assert!(matches!(source.read_line(T).await, Err(TransportError::Closed)));
        assert_eq!(source.reads(), 3);
    }

    #[tokio::test]
    async fn test_mock_injected_error() {
        let mut source = MockByteSource::new();
        source.push_error(TransportError::Timeout(T));
        source.push_line("after");

        assert!(matches!(
            source.read_line(T).await,
            Err(TransportError::Timeout(_))
        ));
        assert_eq!(source.read_line(T).await.unwrap(), "after");
        assert_eq!(source.remaining(), 0);
    }

    #[tokio::test]
    async fn test_mock_with_delay() {
        let mut source = MockByteSource::new().with_delay(10);
        source.push_line("x");

        let start = std::time::Instant::now();
        source.read_line(T).await.unwrap();

        // Should take at least 10ms
        assert!(start.elapsed().as_millis() >= 10);
    }
}
