//! Trait abstraction for the device line source to enable testing

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tracing::{debug, warn};

use crate::error::{Result, UplinkError};

/// Longest accepted line; longer runs without a newline are dropped
pub const MAX_LINE_LEN: usize = 4096;

/// Upper bound on queued lines skipped by one [`LineReader::read_latest`]
const MAX_STALE_LINES: usize = 1024;

/// Line-oriented byte source attached to the sensor board
#[async_trait]
pub trait DeviceTransport: Send {
    /// Read the newest complete line, waiting at most `timeout`
    ///
    /// Lines that were already queued when a newer one is available are
    /// discarded. Returns `Ok(None)` when no complete line arrived in time.
    /// The line terminator (`\n` or `\r\n`) is stripped.
    async fn read_line(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>>;
}

/// Newline framer over any async byte stream
///
/// Bytes of a line that is still incomplete when the timeout fires are kept
/// and completed by the next call. A line longer than [`MAX_LINE_LEN`] is
/// dropped up to its terminating newline.
pub struct LineReader<R> {
    reader: BufReader<R>,
    pending: Vec<u8>,
    /// Inside an oversized line; bytes are dropped until the next newline
    discarding: bool,
}

impl<R: AsyncRead + Unpin + Send> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            reader: BufReader::new(inner),
            pending: Vec::with_capacity(128),
            discarding: false,
        }
    }

    /// Bytes of the current incomplete line
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Read the next line with a bounded wait
    ///
    /// # Errors
    ///
    /// Returns error on an I/O failure, or on end of stream with no partial
    /// line left to hand out.
    pub async fn read_line(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        match tokio::time::timeout(timeout, self.next_line()).await {
            Err(_elapsed) => Ok(None),
            Ok(line) => line.map(Some),
        }
    }

    /// Read the next line, then skip ahead to the newest line already
    /// queued behind it
    ///
    /// The sensor board streams frames continuously; without skipping, a
    /// slow reader would hand out frames from ever further in the past.
    pub async fn read_latest(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        let Some(mut line) = self.read_line(timeout).await? else {
            return Ok(None);
        };

        let mut skipped = 0;
        while skipped < MAX_STALE_LINES {
            match self.read_line(Duration::ZERO).await {
                Ok(Some(newer)) => {
                    line = newer;
                    skipped += 1;
                }
                Ok(None) => break,
                // Surfaces again on the next call; this line is still good
                Err(_) => break,
            }
        }
        if skipped > 0 {
            debug!("Skipped {} stale lines", skipped);
        }
        Ok(Some(line))
    }

    // read_until is cancel safe: on timeout the partial bytes stay in `pending`
    async fn next_line(&mut self) -> Result<Vec<u8>> {
        loop {
            if self.pending.last() == Some(&b'\n') {
                let line = self.take_line();
                if std::mem::take(&mut self.discarding) {
                    continue;
                }
                return Ok(line);
            }

            if self.pending.len() > MAX_LINE_LEN {
                if !self.discarding {
                    warn!("Dropping line longer than {} bytes", MAX_LINE_LEN);
                }
                self.pending.clear();
                self.discarding = true;
            }

            let limit = (MAX_LINE_LEN + 1 - self.pending.len()) as u64;
            let n = (&mut self.reader)
                .take(limit)
                .read_until(b'\n', &mut self.pending)
                .await?;

            if n == 0 {
                if self.pending.is_empty() || self.discarding {
                    self.pending.clear();
                    self.discarding = false;
                    return Err(UplinkError::Serial("device stream closed".to_string()));
                }
                return Ok(self.take_line());
            }
        }
    }

    fn take_line(&mut self) -> Vec<u8> {
        let mut line = std::mem::take(&mut self.pending);
        if line.last() == Some(&b'\n') {
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
        }
        line
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> DeviceTransport for LineReader<R> {
    async fn read_line(&mut self, timeout: Duration) -> Result<Option<Vec<u8>>> {
        self.read_latest(timeout).await
    }
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// One scripted response of [`ScriptedTransport`]
    #[derive(Debug, Clone)]
    pub enum ScriptStep {
        Line(String),
        Bytes(Vec<u8>),
        Silent,
        Fail(String),
    }

    /// Mock device for testing
    ///
    /// Plays back the script, then keeps returning `repeat` (or silence).
    #[derive(Clone)]
    pub struct ScriptedTransport {
        steps: VecDeque<ScriptStep>,
        repeat: Option<String>,
        pub reads: Arc<AtomicUsize>,
    }

    impl ScriptedTransport {
        pub fn new(steps: Vec<ScriptStep>) -> Self {
            Self {
                steps: steps.into(),
                repeat: None,
                reads: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub fn repeating(line: &str) -> Self {
            Self {
                steps: VecDeque::new(),
                repeat: Some(line.to_string()),
                reads: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub fn read_count(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DeviceTransport for ScriptedTransport {
        async fn read_line(&mut self, _timeout: Duration) -> Result<Option<Vec<u8>>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            let step = match self.steps.pop_front() {
                Some(step) => step,
                None => match &self.repeat {
                    Some(line) => ScriptStep::Line(line.clone()),
                    None => ScriptStep::Silent,
                },
            };

            match step {
                ScriptStep::Line(line) => Ok(Some(line.into_bytes())),
                ScriptStep::Bytes(bytes) => Ok(Some(bytes)),
                ScriptStep::Silent => Ok(None),
                ScriptStep::Fail(msg) => Err(UplinkError::Serial(msg)),
            }
        }
    }
}
