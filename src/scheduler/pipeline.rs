//! # Upload Pipeline
//!
//! One cycle: read a frame, parse it, buffer it, probe, upload.
//!
//! Nothing in a cycle is fatal. Every failure is logged and reported in the
//! returned [`CycleOutcome`]; the next cycle starts from scratch.

use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::buffer::LocalBuffer;
use crate::config::Config;
use crate::probe::ConnectivityProbe;
use crate::sensor::{parse_frame, OwnerRef, ReadingDocument};
use crate::serial::{decode_line, DeviceTransport};
use crate::store::{forward, DocumentStore};

/// Result of one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// No usable line from the device (timeout, transport error, bad bytes)
    NoData,
    /// A line arrived but held no readings
    Empty,
    /// Network unreachable; readings stay in the buffer
    Offline { buffered: usize },
    /// Documents accepted by the store this cycle
    Uploaded { documents: usize },
    /// Store failed after accepting `uploaded` documents this cycle
    UploadFailed { uploaded: usize },
}

/// Components driven by the scheduler, owned for the whole run
pub struct UploadPipeline {
    transport: Box<dyn DeviceTransport>,
    buffer: LocalBuffer,
    probe: Box<dyn ConnectivityProbe>,
    store: Box<dyn DocumentStore>,
    owner_ref: Option<OwnerRef>,
    read_timeout: Duration,
    replay: bool,
    max_replay_batches: usize,
}

impl UploadPipeline {
    /// Pipeline with replay on, a 1 s read timeout and no owner reference
    pub fn new(
        transport: Box<dyn DeviceTransport>,
        buffer: LocalBuffer,
        probe: Box<dyn ConnectivityProbe>,
        store: Box<dyn DocumentStore>,
    ) -> Self {
        Self {
            transport,
            buffer,
            probe,
            store,
            owner_ref: None,
            read_timeout: Duration::from_secs(1),
            replay: true,
            max_replay_batches: 16,
        }
    }

    /// Pipeline configured from the `device`, `buffer` and `installation` sections
    pub fn from_config(
        config: &Config,
        transport: Box<dyn DeviceTransport>,
        probe: Box<dyn ConnectivityProbe>,
        store: Box<dyn DocumentStore>,
    ) -> Self {
        let buffer = LocalBuffer::new(config.buffer.path.clone(), config.buffer.mode);
        Self::new(transport, buffer, probe, store)
            .with_owner_ref(config.owner_ref())
            .with_read_timeout(config.device.read_timeout())
            .with_replay(config.buffer.replay, config.buffer.max_replay_batches)
    }

    pub fn with_owner_ref(mut self, owner_ref: Option<OwnerRef>) -> Self {
        self.owner_ref = owner_ref;
        self
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    pub fn with_replay(mut self, replay: bool, max_batches: usize) -> Self {
        self.replay = replay;
        self.max_replay_batches = max_batches.max(1);
        self
    }

    pub fn buffer(&self) -> &LocalBuffer {
        &self.buffer
    }

    /// Run one read → parse → buffer → probe → upload sequence
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        let Some(line) = self.read_frame().await else {
            return CycleOutcome::NoData;
        };
        info!("Received line: {}", line);

        let collection = parse_frame(&line);
        if collection.is_empty() {
            debug!("Frame held no readings");
            return CycleOutcome::Empty;
        }
        let documents = collection.to_transport_form(self.owner_ref.as_ref());

        let buffered = match self.buffer.append(&documents) {
            Ok(end_offset) => Some(end_offset),
            Err(e) => {
                error!(
                    "Failed to buffer {} readings to {}: {}",
                    documents.len(),
                    self.buffer.path().display(),
                    e
                );
                None
            }
        };

        if !self.probe.is_reachable().await {
            info!("Network unreachable, skipping upload");
            return CycleOutcome::Offline {
                buffered: if buffered.is_some() { documents.len() } else { 0 },
            };
        }

        match buffered {
            Some(end_offset) if self.replay => self.upload_pending(&documents, end_offset).await,
            _ => self.upload_fresh(&documents).await,
        }
    }

    async fn read_frame(&mut self) -> Option<String> {
        match self.transport.read_line(self.read_timeout).await {
            Ok(Some(bytes)) => match decode_line(bytes) {
                Ok(line) => Some(line),
                Err(e) => {
                    warn!("Dropping frame: {}", e);
                    None
                }
            },
            Ok(None) => {
                debug!("No frame within {:?}", self.read_timeout);
                None
            }
            Err(e) => {
                warn!("Device read failed: {}", e);
                None
            }
        }
    }

    /// Send only this cycle's documents
    async fn upload_fresh(&mut self, documents: &[ReadingDocument]) -> CycleOutcome {
        match forward(self.store.as_ref(), documents).await {
            Ok(()) => {
                info!("Uploaded {} readings", documents.len());
                CycleOutcome::Uploaded {
                    documents: documents.len(),
                }
            }
            Err(e) => {
                warn!("Upload of {} readings failed: {}", documents.len(), e);
                CycleOutcome::UploadFailed { uploaded: 0 }
            }
        }
    }

    /// Drain unacknowledged buffer batches, oldest first
    ///
    /// Stops at the first store failure; that batch and the ones after it
    /// are retried on a later cycle. If the buffer could not be read up to
    /// this cycle's batch (ending at `fresh_end`) for any reason other than
    /// the per-cycle limit, the fresh documents are sent directly and the
    /// marker moves past them.
    async fn upload_pending(&mut self, fresh: &[ReadingDocument], fresh_end: u64) -> CycleOutcome {
        let batches = match self.buffer.pending(self.max_replay_batches) {
            Ok(batches) => batches,
            Err(e) => {
                error!("Failed to read pending batches, sending this frame only: {}", e);
                return self.upload_fresh(fresh).await;
            }
        };

        let mut uploaded = 0;
        for batch in &batches {
            if let Err(e) = forward(self.store.as_ref(), &batch.documents).await {
                warn!(
                    "Upload failed after {} readings, retrying next cycle: {}",
                    uploaded, e
                );
                return CycleOutcome::UploadFailed { uploaded };
            }
            uploaded += batch.documents.len();

            if let Err(e) = self.buffer.acknowledge(batch.end_offset) {
                error!("Failed to record upload progress: {}", e);
                return CycleOutcome::Uploaded { documents: uploaded };
            }
        }

        let reached = batches.last().map(|batch| batch.end_offset);
        let limited = batches.len() >= self.max_replay_batches;
        if !limited && reached.map_or(true, |end| end < fresh_end) {
            warn!("Buffer unreadable up to this cycle's batch, sending it directly");
            return match self.upload_fresh(fresh).await {
                CycleOutcome::Uploaded { documents } => {
                    if let Err(e) = self.buffer.acknowledge(fresh_end) {
                        error!("Failed to record upload progress: {}", e);
                    }
                    CycleOutcome::Uploaded {
                        documents: uploaded + documents,
                    }
                }
                _ => CycleOutcome::UploadFailed { uploaded },
            };
        }

        if batches.len() > 1 {
            info!("Uploaded {} readings from {} buffered batches", uploaded, batches.len());
        } else {
            info!("Uploaded {} readings", uploaded);
        }
        CycleOutcome::Uploaded { documents: uploaded }
    }
}
