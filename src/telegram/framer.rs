// Telegram framing: cut complete telegrams out of a continuous line stream
// Reference: smart_meter.py lines 70-89 (get_next_message)

use super::raw::{RawLine, Telegram};
use crate::serial::{ByteSource, TransportError};
use std::time::Duration;
use thiserror::Error;

/// Ceiling used when neither config nor dialect gives one.
/// Full DSMR 5 telegrams with M-Bus devices stay below this.
pub const DEFAULT_MAX_LINES: usize = 64;

#[derive(Error, Debug)]
pub enum FramingError {
    #[error("Malformed telegram: no end marker within {lines} lines")]
    Malformed { lines: usize },

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

pub type Result<T> = std::result::Result<T, FramingError>;

/// Framer settings
#[derive(Debug, Clone)]
pub struct FramerConfig {
    /// Abandon a telegram that grows past this many lines without `!`
    pub max_lines: usize,

    /// Extra start markers for meters whose header may arrive mangled
    /// (matched as substrings, e.g. "KAIFA")
    pub start_markers: Vec<String>,
}

impl Default for FramerConfig {
    fn default() -> Self {
        Self {
            max_lines: DEFAULT_MAX_LINES,
            start_markers: Vec::new(),
        }
    }
}

impl FramerConfig {
    pub fn new(max_lines: usize) -> Self {
        Self {
            max_lines,
            ..Default::default()
        }
    }

    pub fn with_start_marker(mut self, marker: impl Into<String>) -> Self {
        self.start_markers.push(marker.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramerState {
    Idle,
    Accumulating,
}

/// Two-state framer.
///
/// `Idle` drops lines until a start marker; `Accumulating` collects until
/// the `!` end line. A start marker while accumulating restarts the buffer
/// at that line, so an orphaned half telegram is never emitted.
pub struct TelegramFramer {
    config: FramerConfig,
    state: FramerState,
    buffer: Vec<RawLine>,
    next_seq: u64,
}

impl TelegramFramer {
    pub fn new(config: FramerConfig) -> Self {
        Self {
            config,
            state: FramerState::Idle,
            buffer: Vec::new(),
            next_seq: 0,
        }
    }

    pub fn config(&self) -> &FramerConfig {
        &self.config
    }

    pub fn state(&self) -> FramerState {
        self.state
    }

    /// Lines held for the telegram in progress
    pub fn buffered_lines(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any telegram in progress
    pub fn reset(&mut self) {
        if !self.buffer.is_empty() {
            tracing::debug!("Discarding {} buffered lines", self.buffer.len());
        }
        self.buffer.clear();
        self.state = FramerState::Idle;
    }

    fn is_start(&self, line: &str) -> bool {
        line.starts_with('/')
            || self
                .config
                .start_markers
                .iter()
                .any(|m| !m.is_empty() && line.contains(m.as_str()))
    }

    fn is_end(line: &str) -> bool {
        line.starts_with('!')
    }

    /// Feed one line. Returns a finished telegram, a framing error, or
    /// nothing when more lines are needed.
    pub fn push_line(&mut self, line: impl Into<String>) -> Option<Result<Telegram>> {
        let line = RawLine::new(self.next_seq, line);
        self.next_seq += 1;

        match self.state {
            FramerState::Idle => {
                if self.is_start(&line.content) {
                    self.buffer.clear();
                    self.buffer.push(line);
                    self.state = FramerState::Accumulating;
                } else {
                    tracing::trace!("Skipping line {} outside telegram", line.seq);
                }
                None
            }
            FramerState::Accumulating => {
                if self.is_start(&line.content) {
                    tracing::debug!(
                        "Start marker at line {} while accumulating; dropping {} orphaned lines",
                        line.seq,
                        self.buffer.len()
                    );
                    self.buffer.clear();
                    self.buffer.push(line);
                    return None;
                }

                let end = Self::is_end(&line.content);
                self.buffer.push(line);

                if end {
                    self.state = FramerState::Idle;
                    let lines = std::mem::take(&mut self.buffer);
                    return Some(Ok(Telegram::new(lines)));
                }

                if self.buffer.len() >= self.config.max_lines {
                    let lines = self.buffer.len();
                    tracing::warn!(
                        "Malformed telegram starting at line {}: no end marker after {} lines",
                        self.buffer[0].seq,
                        lines
                    );
                    self.buffer.clear();
                    self.state = FramerState::Idle;
                    return Some(Err(FramingError::Malformed { lines }));
                }

                None
            }
        }
    }

    /// Pull lines from `source` until a telegram completes.
    ///
    /// A read failure is returned as `FramingError::Transport` with the
    /// partial telegram left in place; the next call continues it.
    pub async fn next_telegram<S: ByteSource>(
        &mut self,
        source: &mut S,
        timeout: Duration,
    ) -> Result<Telegram> {
        loop {
            let line = source.read_line(timeout).await?;
            if let Some(result) = self.push_line(line) {
                return result;
            }
        }
    }
}

impl Default for TelegramFramer {
    fn default() -> Self {
        Self::new(FramerConfig::default())
    }
}
