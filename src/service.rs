//! The pull loop: source -> framer -> checksum -> assembler -> sink.
//!
//! Nothing here ends the process on a bad telegram. Malformed frames,
//! checksum failures and publish errors are logged, counted and skipped;
//! read errors are retried (optionally up to a limit).

use crate::dialect::DialectSelection;
use crate::reading::{AssemblyError, ReadingAssembler, Sink};
use crate::serial::{ByteSource, TransportError};
use crate::telegram::{FramingError, TelegramFramer};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Giving up after {attempts} consecutive read failures: {last}")]
    TransportExhausted { attempts: u32, last: TransportError },
}

/// First wait after a failed (non-timeout) read
pub const RETRY_DELAY_START: Duration = Duration::from_millis(250);

/// Longest wait between retries
pub const RETRY_DELAY_MAX: Duration = Duration::from_secs(10);

/// Wait before the next read after `failures` consecutive read errors.
/// Doubles from `RETRY_DELAY_START` up to `RETRY_DELAY_MAX`.
pub fn retry_delay(failures: u32) -> Duration {
    let doublings = failures.saturating_sub(1).min(16);
    RETRY_DELAY_START
        .saturating_mul(1 << doublings)
        .min(RETRY_DELAY_MAX)
}

/// Counters kept across the life of the loop
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoopStats {
    pub telegrams: u64,
    pub published: u64,
    pub malformed: u64,
    pub checksum_failures: u64,
    pub rejected: u64,
    pub decode_errors: u64,
    pub transport_errors: u64,
    pub publish_errors: u64,
}

/// What a single `step` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Published,
    /// Telegram framed but not published (malformed, corrupt, or sink failed)
    Discarded,
    /// Read failed; try again
    Retry,
    /// Source has no more lines
    Finished,
}

pub struct MeterService<S: ByteSource, K: Sink> {
    source: S,
    sink: K,
    framer: TelegramFramer,
    assembler: ReadingAssembler,
    selection: DialectSelection,
    read_timeout: Duration,
    max_transport_failures: Option<u32>,
    consecutive_failures: u32,
    stats: LoopStats,
}

impl<S: ByteSource, K: Sink> MeterService<S, K> {
    pub fn new(
        source: S,
        sink: K,
        framer: TelegramFramer,
        assembler: ReadingAssembler,
        selection: DialectSelection,
    ) -> Self {
        Self {
            source,
            sink,
            framer,
            assembler,
            selection,
            read_timeout: Duration::from_secs(20),
            max_transport_failures: None,
            consecutive_failures: 0,
            stats: LoopStats::default(),
        }
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Stop after this many read failures in a row (default: never)
    pub fn with_max_transport_failures(mut self, max: Option<u32>) -> Self {
        self.max_transport_failures = max;
        self
    }

    pub fn stats(&self) -> &LoopStats {
        &self.stats
    }

    pub fn sink(&self) -> &K {
        &self.sink
    }

    pub fn into_parts(self) -> (S, K, LoopStats) {
        (self.source, self.sink, self.stats)
    }

    /// Read, decode and publish one telegram
    pub async fn step(&mut self) -> Result<Step, ServiceError> {
        let telegram = match self
            .framer
            .next_telegram(&mut self.source, self.read_timeout)
            .await
        {
            Ok(telegram) => {
                self.consecutive_failures = 0;
                telegram
            }
            Err(FramingError::Malformed { .. }) => {
                self.stats.malformed += 1;
                return Ok(Step::Discarded);
            }
            Err(FramingError::Transport(e)) => return self.read_failed(e).await,
        };
        self.stats.telegrams += 1;

        let dialect = self.selection.resolve(&telegram);
        let reading = match self.assembler.assemble(&telegram, dialect) {
            Ok(reading) => reading,
            Err(AssemblyError::Checksum(e)) => {
                tracing::warn!("Discarding telegram from {:?}: {}", telegram.header(), e);
                self.stats.checksum_failures += 1;
                return Ok(Step::Discarded);
            }
            Err(e) => {
                tracing::warn!("Discarding telegram from {:?}: {}", telegram.header(), e);
                self.stats.rejected += 1;
                return Ok(Step::Discarded);
            }
        };
        self.stats.decode_errors += reading.skipped_fields() as u64;

        tracing::info!(
            "Reading ({}, {} fields) at {:?}",
            reading.dialect(),
            reading.len(),
            reading.timestamp()
        );

        match self.sink.publish(reading).await {
            Ok(()) => {
                self.stats.published += 1;
                Ok(Step::Published)
            }
            Err(e) => {
                tracing::warn!("Publish failed: {}", e);
                self.stats.publish_errors += 1;
                Ok(Step::Discarded)
            }
        }
    }

    async fn read_failed(&mut self, err: TransportError) -> Result<Step, ServiceError> {
        if err.is_terminal() {
            tracing::info!("Line source finished: {}", err);
            return Ok(Step::Finished);
        }

        self.stats.transport_errors += 1;
        self.consecutive_failures += 1;

        if let Some(max) = self.max_transport_failures {
            if self.consecutive_failures >= max {
                return Err(ServiceError::TransportExhausted {
                    attempts: self.consecutive_failures,
                    last: err,
                });
            }
        }

        // A timeout already waited out the read; anything else fails fast
        if let TransportError::Timeout(waited) = err {
            tracing::warn!("No data from meter for {:?}, retrying", waited);
            return Ok(Step::Retry);
        }

        let delay = retry_delay(self.consecutive_failures);
        tracing::warn!(
            "Read failed ({} in a row), retrying in {:?}: {}",
            self.consecutive_failures,
            delay,
            err
        );
        tokio::time::sleep(delay).await;
        Ok(Step::Retry)
    }

    /// Run until the source ends or `stop` turns true.
    ///
    /// The stop flag is looked at between steps; a telegram half-read at
    /// that point is dropped.
    pub async fn run(&mut self, stop: watch::Receiver<bool>) -> Result<(), ServiceError> {
        loop {
            if *stop.borrow() {
                tracing::info!("Stop requested");
                break;
            }
            if self.step().await? == Step::Finished {
                break;
            }
        }
        self.framer.reset();
        tracing::info!("Loop finished: {:?}", self.stats);
        Ok(())
    }
}
