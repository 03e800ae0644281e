//! Size-bounded receive buffer
//!
//! Every received chunk passes through a [`BoundedSink`]. It keeps at most
//! (roughly) `max_save` bytes, counts everything it sees, and asks the
//! transfer to stop once more than `stop_count` bytes arrived.

use crate::{MonitorError, Result};

/// What the transfer loop should do after handing over a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkControl {
    Continue,
    Abort,
}

/// Bytes received for one part of a response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceivedBytes {
    /// Retained prefix of what was received
    pub bytes: Vec<u8>,
    /// Number of bytes observed, retained or not
    pub size: u64,
    /// The transfer was cut off, `size` is a lower bound
    pub truncated: bool,
}

#[derive(Debug)]
pub struct BoundedSink {
    received: ReceivedBytes,
    max_save: usize,
    stop_count: u64,
    failure: Option<String>,
}

impl BoundedSink {
    pub fn new(max_save: usize, stop_count: u64) -> Self {
        Self {
            received: ReceivedBytes::default(),
            max_save,
            stop_count,
            failure: None,
        }
    }

    /// Accepts one chunk
    ///
    /// The last retained chunk may overshoot `max_save`; it is not cut.
    /// Failures are never returned from here: they are parked and must be
    /// collected with [`BoundedSink::check`] once the transfer is gone.
    pub fn receive(&mut self, chunk: &[u8]) -> SinkControl {
        if self.failure.is_some() {
            return SinkControl::Abort;
        }

        self.received.size += chunk.len() as u64;
        if self.received.bytes.len() < self.max_save {
            if let Err(e) = self.received.bytes.try_reserve(chunk.len()) {
                self.failure = Some(format!(
                    "could not buffer {} more bytes: {}",
                    chunk.len(),
                    e
                ));
                return SinkControl::Abort;
            }
            self.received.bytes.extend_from_slice(chunk);
        }

        if self.received.size > self.stop_count {
            // Possibly an abusive response; stop even counting
            self.received.truncated = true;
            return SinkControl::Abort;
        }

        SinkControl::Continue
    }

    pub fn size(&self) -> u64 {
        self.received.size
    }

    pub fn is_truncated(&self) -> bool {
        self.received.truncated
    }

    /// Re-raises a parked failure
    pub fn check(&mut self) -> Result<()> {
        match self.failure.take() {
            Some(message) => Err(MonitorError::Sink(message)),
            None => Ok(()),
        }
    }

    pub fn into_received(self) -> ReceivedBytes {
        self.received
    }
}
