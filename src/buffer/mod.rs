//! # Local Durable Buffer
//!
//! On-disk staging of every parsed frame before any upload attempt.
//!
//! This module handles:
//! - Writing each cycle's documents as one pretty-printed JSON array
//! - Appending to (or rewriting) the buffer file
//! - Tracking the acknowledged byte offset in a sidecar marker file
//! - Reading back the batches the store has not acknowledged yet
//!
//! The buffer file is the system of record for what the board reported.
//! Complete batches are never edited after they are written.

use serde::Deserialize;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, warn};

use crate::error::Result;
use crate::sensor::ReadingDocument;

/// Suffix of the acknowledged-offset marker file
const ACK_SUFFIX: &str = "ack";

/// How each cycle's batch is written
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BufferMode {
    /// Keep every batch; unsent batches can be replayed
    #[default]
    Append,
    /// Keep only the latest batch
    Overwrite,
}

/// Buffered batch the store has not acknowledged
#[derive(Debug, Clone, PartialEq)]
pub struct PendingBatch {
    pub documents: Vec<ReadingDocument>,
    /// Byte offset just past this batch; acknowledge it once stored
    pub end_offset: u64,
}

/// A batch on disk: an array, or a bare object from single-record writers
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredBatch {
    Many(Vec<ReadingDocument>),
    One(ReadingDocument),
}

impl From<StoredBatch> for Vec<ReadingDocument> {
    fn from(batch: StoredBatch) -> Self {
        match batch {
            StoredBatch::Many(documents) => documents,
            StoredBatch::One(document) => vec![document],
        }
    }
}

/// Append-only JSON staging file with an acknowledged-offset marker
#[derive(Debug, Clone)]
pub struct LocalBuffer {
    path: PathBuf,
    ack_path: PathBuf,
    mode: BufferMode,
}

impl LocalBuffer {
    /// Create a buffer at `path`
    ///
    /// Nothing is touched on disk until the first write.
    pub fn new(path: impl Into<PathBuf>, mode: BufferMode) -> Self {
        let path = path.into();
        let mut ack_path = path.clone().into_os_string();
        ack_path.push(".");
        ack_path.push(ACK_SUFFIX);

        Self {
            path,
            ack_path: PathBuf::from(ack_path),
            mode,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist one cycle's documents
    ///
    /// Returns the byte offset just past the written batch. In overwrite
    /// mode the acknowledged marker is reset, since the file now holds only
    /// this batch. In append mode an incomplete batch left at the end of the
    /// file by an interrupted write is cut off first.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be written or synced
    pub fn append(&self, documents: &[ReadingDocument]) -> Result<u64> {
        let mut file = match self.mode {
            BufferMode::Append => OpenOptions::new()
                .create(true)
                .read(true)
                .append(true)
                .open(&self.path)?,
            BufferMode::Overwrite => File::create(&self.path)?,
        };

        let mut text = String::new();
        if self.mode == BufferMode::Append && self.discard_torn_tail(&mut file)? {
            text.push('\n');
        }
        text.push_str(&serde_json::to_string_pretty(documents)?);
        text.push('\n');

        file.write_all(text.as_bytes())?;
        file.sync_data()?;
        let end_offset = file.metadata()?.len() - 1;

        if self.mode == BufferMode::Overwrite {
            self.acknowledge(0)?;
        }

        debug!(
            "Buffered {} documents to {} (offset {})",
            documents.len(),
            self.path.display(),
            end_offset
        );
        Ok(end_offset)
    }

    /// Truncate the file after its last complete batch if it does not end
    /// with a newline
    ///
    /// Returns `true` if the file was cut and is non-empty, so the next
    /// batch needs a separator.
    fn discard_torn_tail(&self, file: &mut File) -> Result<bool> {
        let len = file.metadata()?.len();
        if len == 0 {
            return Ok(false);
        }

        let mut last = [0u8; 1];
        file.seek(SeekFrom::End(-1))?;
        file.read_exact(&mut last)?;
        if last[0] == b'\n' {
            return Ok(false);
        }

        let keep = match self.pending(usize::MAX)?.last() {
            Some(batch) => batch.end_offset,
            None => self.acknowledged_offset()?,
        };
        warn!(
            "Discarding {} bytes of an incomplete batch at the end of {}",
            len - keep,
            self.path.display()
        );
        file.set_len(keep)?;
        Ok(keep > 0)
    }

    /// Byte offset up to which every batch has been stored remotely
    ///
    /// A missing or unreadable marker counts as 0. A marker past the end of
    /// the buffer file (file replaced by hand) is ignored.
    pub fn acknowledged_offset(&self) -> Result<u64> {
        let offset = match fs::read_to_string(&self.ack_path) {
            Ok(text) => match text.trim().parse::<u64>() {
                Ok(offset) => offset,
                Err(e) => {
                    warn!("Ignoring corrupt marker {}: {}", self.ack_path.display(), e);
                    0
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };

        let len = self.file_len()?;
        if offset > len {
            warn!(
                "Marker offset {} is past the end of {} ({} bytes), starting over",
                offset,
                self.path.display(),
                len
            );
            return Ok(0);
        }
        Ok(offset)
    }

    /// Record that everything before `offset` is stored remotely
    ///
    /// The marker is replaced atomically.
    pub fn acknowledge(&self, offset: u64) -> Result<()> {
        let mut tmp_path = self.ack_path.clone().into_os_string();
        tmp_path.push(".tmp");
        let tmp_path = PathBuf::from(tmp_path);

        let mut file = File::create(&tmp_path)?;
        file.write_all(offset.to_string().as_bytes())?;
        file.sync_data()?;
        fs::rename(&tmp_path, &self.ack_path)?;
        Ok(())
    }

    /// Read up to `limit` unacknowledged batches, oldest first
    ///
    /// A truncated document at the end of the file (crash during a write)
    /// ends the scan; the batches before it are still returned. A corrupt
    /// region in the middle of the file is reported as an empty batch whose
    /// `end_offset` is the start of the next batch, so acknowledging it
    /// steps over the damage.
    pub fn pending(&self, limit: usize) -> Result<Vec<PendingBatch>> {
        let mut offset = self.acknowledged_offset()?;
        let mut batches = Vec::new();

        while batches.len() < limit {
            let file = match File::open(&self.path) {
                Ok(file) => file,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => break,
                Err(e) => return Err(e.into()),
            };
            let mut reader = BufReader::new(file);
            reader.seek(SeekFrom::Start(offset))?;
            let mut stream = serde_json::Deserializer::from_reader(reader).into_iter::<StoredBatch>();

            let corrupt_at = loop {
                if batches.len() >= limit {
                    break None;
                }
                let consumed = offset + stream.byte_offset() as u64;
                match stream.next() {
                    None => break None,
                    Some(Ok(batch)) => batches.push(PendingBatch {
                        documents: batch.into(),
                        end_offset: offset + stream.byte_offset() as u64,
                    }),
                    Some(Err(e)) if e.is_eof() => {
                        warn!(
                            "Truncated batch at the end of {}, skipping it: {}",
                            self.path.display(),
                            e
                        );
                        break None;
                    }
                    Some(Err(e)) => {
                        error!(
                            "Corrupt batch in {} after offset {}: {}",
                            self.path.display(),
                            consumed,
                            e
                        );
                        break Some(consumed);
                    }
                }
            };

            let Some(corrupt_at) = corrupt_at else {
                break;
            };
            match self.next_batch_start(corrupt_at + 1)? {
                Some(resume) => {
                    warn!(
                        "Skipping {} corrupt bytes in {}",
                        resume - corrupt_at,
                        self.path.display()
                    );
                    batches.push(PendingBatch {
                        documents: Vec::new(),
                        end_offset: resume,
                    });
                    offset = resume;
                }
                None => break,
            }
        }

        Ok(batches)
    }

    /// Offset of the next `[` or `{` at the start of a line, from `from` on
    ///
    /// Batches are pretty-printed, so only a batch opens a line with a
    /// bracket.
    fn next_batch_start(&self, from: u64) -> Result<Option<u64>> {
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(from))?;

        let mut previous = 0u8;
        for (i, byte) in BufReader::new(file).bytes().enumerate() {
            let byte = byte?;
            if previous == b'\n' && matches!(byte, b'[' | b'{') {
                return Ok(Some(from + i as u64));
            }
            previous = byte;
        }
        Ok(None)
    }

    fn file_len(&self) -> Result<u64> {
        match fs::metadata(&self.path) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensor::parse_frame_at;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn docs(line: &str) -> Vec<ReadingDocument> {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        parse_frame_at(line, at).to_transport_form(None)
    }

    fn buffer_in(dir: &TempDir, mode: BufferMode) -> LocalBuffer {
        LocalBuffer::new(dir.path().join("senso.json"), mode)
    }

    #[test]
    fn test_ack_path_is_sidecar() {
        let buffer = LocalBuffer::new("/tmp/senso.json", BufferMode::Append);
        assert_eq!(buffer.ack_path, PathBuf::from("/tmp/senso.json.ack"));
    }

    #[test]
    fn test_pending_on_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let buffer = buffer_in(&dir, BufferMode::Append);

        assert!(buffer.pending(10).unwrap().is_empty());
        assert_eq!(buffer.acknowledged_offset().unwrap(), 0);
    }

    #[test]
    fn test_file_is_pretty_printed_json() {
        let dir = TempDir::new().unwrap();
        let buffer = buffer_in(&dir, BufferMode::Overwrite);
        buffer.append(&docs("GAS01:346HUM01:47")).unwrap();

        let text = fs::read_to_string(buffer.path()).unwrap();
        assert!(text.lines().count() > 2, "expected multi-line output");
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value.as_array().map(|a| a.len()), Some(2));
        assert_eq!(value[0]["kind"], "GAS");
        assert_eq!(value[0]["index"], "01");
    }

    #[test]
    fn test_append_keeps_every_batch() {
        let dir = TempDir::new().unwrap();
        let buffer = buffer_in(&dir, BufferMode::Append);

        let first_end = buffer.append(&docs("GAS01:1")).unwrap();
        let second_end = buffer.append(&docs("GAS01:2HUM01:3")).unwrap();
        assert!(second_end > first_end);

        let pending = buffer.pending(10).unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].documents.len(), 1);
        assert_eq!(pending[0].end_offset, first_end);
        assert_eq!(pending[1].documents.len(), 2);
        assert_eq!(pending[1].end_offset, second_end);
    }

    #[test]
    fn test_overwrite_keeps_only_latest_batch() {
        let dir = TempDir::new().unwrap();
        let buffer = buffer_in(&dir, BufferMode::Overwrite);

        buffer.append(&docs("GAS01:1")).unwrap();
        buffer.append(&docs("TEMP01:2")).unwrap();

        let pending = buffer.pending(10).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].documents[0].kind, "TEMP");
    }

    #[test]
    fn test_overwrite_resets_acknowledgement() {
        let dir = TempDir::new().unwrap();
        let buffer = buffer_in(&dir, BufferMode::Overwrite);

        let end = buffer.append(&docs("GAS01:1")).unwrap();
        buffer.acknowledge(end).unwrap();
        assert!(buffer.pending(10).unwrap().is_empty());

        buffer.append(&docs("GAS01:2")).unwrap();
        assert_eq!(buffer.acknowledged_offset().unwrap(), 0);
        assert_eq!(buffer.pending(10).unwrap().len(), 1);
    }

    #[test]
    fn test_acknowledge_hides_stored_batches() {
        let dir = TempDir::new().unwrap();
        let buffer = buffer_in(&dir, BufferMode::Append);

        let first_end = buffer.append(&docs("GAS01:1")).unwrap();
        buffer.append(&docs("GAS01:2")).unwrap();
        buffer.acknowledge(first_end).unwrap();

        let pending = buffer.pending(10).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].documents[0].value, 2);
        assert_eq!(buffer.acknowledged_offset().unwrap(), first_end);
    }

    #[test]
    fn test_pending_respects_limit() {
        let dir = TempDir::new().unwrap();
        let buffer = buffer_in(&dir, BufferMode::Append);
        for i in 0..5 {
            buffer.append(&docs(&format!("GAS01:{}", i))).unwrap();
        }

        let pending = buffer.pending(3).unwrap();
        let values: Vec<_> = pending.iter().map(|b| b.documents[0].value).collect();
        assert_eq!(values, vec![0, 1, 2]);
    }

    #[test]
    fn test_truncated_tail_does_not_hide_earlier_batches() {
        let dir = TempDir::new().unwrap();
        let buffer = buffer_in(&dir, BufferMode::Append);
        buffer.append(&docs("GAS01:1")).unwrap();

        let mut file = OpenOptions::new().append(true).open(buffer.path()).unwrap();
        file.write_all(b"[\n  {\n    \"kind\": \"GAS\",\n    \"ind").unwrap();

        let pending = buffer.pending(10).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].documents[0].value, 1);
    }

    #[test]
    fn test_torn_batch_is_cut_before_next_append() {
        let dir = TempDir::new().unwrap();
        let buffer = buffer_in(&dir, BufferMode::Append);
        buffer.append(&docs("GAS01:1")).unwrap();

        let mut file = OpenOptions::new().append(true).open(buffer.path()).unwrap();
        file.write_all(b"[\n  {\n    \"kind\": \"GAS\",\n    \"ind").unwrap();

        buffer.append(&docs("GAS01:2")).unwrap();
        let end = buffer.append(&docs("GAS01:3")).unwrap();

        let pending = buffer.pending(10).unwrap();
        let values: Vec<_> = pending.iter().map(|b| b.documents[0].value).collect();
        assert_eq!(values, vec![1, 2, 3]);
        assert_eq!(pending[2].end_offset, end);

        let text = fs::read_to_string(buffer.path()).unwrap();
        assert!(!text.contains("\"ind["));
    }

    #[test]
    fn test_torn_batch_alone_is_discarded() {
        let dir = TempDir::new().unwrap();
        let buffer = buffer_in(&dir, BufferMode::Append);
        fs::write(buffer.path(), b"[\n  {\n    \"kind\": \"GAS\",\n    \"ind").unwrap();

        buffer.append(&docs("HUM01:47")).unwrap();

        let pending = buffer.pending(10).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].documents[0].kind, "HUM");
        assert!(fs::read_to_string(buffer.path()).unwrap().starts_with('['));
    }

    #[test]
    fn test_corrupt_region_is_stepped_over() {
        let dir = TempDir::new().unwrap();
        let buffer = buffer_in(&dir, BufferMode::Append);
        buffer.append(&docs("GAS01:1")).unwrap();

        let mut file = OpenOptions::new().append(true).open(buffer.path()).unwrap();
        file.write_all(b"{ \"broken\": nope }\n").unwrap();
        buffer.append(&docs("GAS01:2")).unwrap();

        let pending = buffer.pending(10).unwrap();
        assert_eq!(pending.len(), 3);
        assert_eq!(pending[0].documents[0].value, 1);
        assert!(pending[1].documents.is_empty());
        assert_eq!(pending[2].documents[0].value, 2);

        buffer.acknowledge(pending[1].end_offset).unwrap();
        let pending = buffer.pending(10).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].documents[0].value, 2);
    }

    #[test]
    fn test_corrupt_tail_without_later_batch_ends_scan() {
        let dir = TempDir::new().unwrap();
        let buffer = buffer_in(&dir, BufferMode::Append);
        buffer.append(&docs("GAS01:1")).unwrap();

        let mut file = OpenOptions::new().append(true).open(buffer.path()).unwrap();
        file.write_all(b"garbage\n").unwrap();

        let pending = buffer.pending(10).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].documents[0].value, 1);
    }

    #[test]
    fn test_single_object_batches_are_read() {
        let dir = TempDir::new().unwrap();
        let buffer = buffer_in(&dir, BufferMode::Append);
        let doc = docs("HUM01:47").remove(0);
        fs::write(buffer.path(), serde_json::to_string_pretty(&doc).unwrap()).unwrap();

        let pending = buffer.pending(10).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].documents, vec![doc]);
    }

    #[test]
    fn test_marker_past_end_of_file_is_ignored() {
        let dir = TempDir::new().unwrap();
        let buffer = buffer_in(&dir, BufferMode::Append);
        buffer.append(&docs("GAS01:1")).unwrap();
        buffer.acknowledge(1_000_000).unwrap();

        assert_eq!(buffer.acknowledged_offset().unwrap(), 0);
        assert_eq!(buffer.pending(10).unwrap().len(), 1);
    }

    #[test]
    fn test_corrupt_marker_counts_as_zero() {
        let dir = TempDir::new().unwrap();
        let buffer = buffer_in(&dir, BufferMode::Append);
        buffer.append(&docs("GAS01:1")).unwrap();
        fs::write(&buffer.ack_path, "not a number").unwrap();

        assert_eq!(buffer.acknowledged_offset().unwrap(), 0);
    }

    #[test]
    fn test_existing_file_does_not_fail_append() {
        let dir = TempDir::new().unwrap();
        for mode in [BufferMode::Append, BufferMode::Overwrite] {
            let buffer = buffer_in(&dir, mode);
            assert!(buffer.append(&docs("GAS01:1")).is_ok());
            assert!(buffer.append(&docs("GAS01:2")).is_ok());
        }
    }
}
