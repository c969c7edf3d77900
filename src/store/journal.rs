//! Append-only record journal (magic + length + crc32c framing).
//!
//! Every committed mutation appends the full post-state of the record, so
//! replay is a fold that keeps the last entry per record id. A crash mid
//! append leaves a torn tail that replay truncates; the previously
//! committed state of every record is always recoverable intact.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use crc32c::crc32c;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::FieldRecord;
use crate::error::{Effect, Transience};

const FRAME_MAGIC: u32 = 0x4653_5231; // "FSR1"
const FRAME_HEADER_LEN: usize = 12;

pub type JournalResult<T> = Result<T, JournalError>;

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("journal io error at {path:?}: {source}")]
    Io {
        path: Option<PathBuf>,
        #[source]
        source: io::Error,
    },

    #[error("journal frame magic mismatch at offset {offset}: got {got:#010x}")]
    FrameMagicMismatch { offset: u64, got: u32 },

    #[error("journal frame length invalid at offset {offset}: {reason}")]
    FrameLengthInvalid { offset: u64, reason: String },

    #[error("journal entry too large: {got_bytes} bytes (max {max_bytes})")]
    EntryTooLarge { max_bytes: usize, got_bytes: usize },

    #[error("journal frame crc mismatch at offset {offset}: expected {expected:#010x}, got {got:#010x}")]
    FrameCrcMismatch {
        offset: u64,
        expected: u32,
        got: u32,
    },

    #[error("journal entry at offset {offset} does not decode: {source}")]
    EntryDecode {
        offset: u64,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode journal entry: {source}")]
    EntryEncode {
        #[source]
        source: serde_json::Error,
    },
}

impl JournalError {
    pub fn transience(&self) -> Transience {
        match self {
            JournalError::Io { .. } => Transience::Unknown,
            _ => Transience::Permanent,
        }
    }

    pub fn effect(&self) -> Effect {
        match self {
            JournalError::Io { .. } => Effect::Unknown,
            _ => Effect::None,
        }
    }
}

/// One committed mutation: the full record state after the write.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub at_ms: u64,
    pub record: FieldRecord,
}

/// Outcome of replaying a journal file.
#[derive(Debug)]
pub struct Replay {
    pub entries: Vec<JournalEntry>,
    /// Offset a torn tail was truncated from, if any.
    pub truncated_from: Option<u64>,
    /// Journal length after truncation.
    pub bytes: u64,
}

/// Open (creating if absent) and replay a journal, repairing a torn tail.
///
/// Corruption that is not at the tail is a hard error: entries behind it
/// would be silently lost if we truncated there.
pub fn open(path: &Path, max_entry_bytes: usize) -> JournalResult<(Journal, Replay)> {
    let io_err = |source: io::Error| JournalError::Io {
        path: Some(path.to_path_buf()),
        source,
    };

    let mut file = fs::OpenOptions::new()
        .read(true)
        .append(true)
        .create(true)
        .open(path)
        .map_err(io_err)?;

    let mut buf = Vec::new();
    file.read_to_end(&mut buf).map_err(io_err)?;

    let replayed = replay_bytes(&buf, max_entry_bytes)?;
    if let Some(offset) = replayed.truncated_from {
        file.set_len(offset).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        tracing::warn!(offset, path = %path.display(), "truncated torn journal tail");
    }

    let journal = Journal {
        path: path.to_path_buf(),
        file,
        max_entry_bytes,
        bytes: replayed.bytes,
    };
    Ok((journal, replayed))
}

fn replay_bytes(buf: &[u8], max_entry_bytes: usize) -> JournalResult<Replay> {
    let mut entries = Vec::new();
    let mut offset = 0usize;

    loop {
        let remaining = buf.len() - offset;
        if remaining == 0 {
            return Ok(Replay {
                entries,
                truncated_from: None,
                bytes: offset as u64,
            });
        }
        if remaining < FRAME_HEADER_LEN {
            // Torn header write.
            return Ok(Replay {
                entries,
                truncated_from: Some(offset as u64),
                bytes: offset as u64,
            });
        }

        let header = &buf[offset..offset + FRAME_HEADER_LEN];
        let magic = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        if magic != FRAME_MAGIC {
            return Err(JournalError::FrameMagicMismatch {
                offset: offset as u64,
                got: magic,
            });
        }

        let length = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
        if length == 0 {
            return Err(JournalError::FrameLengthInvalid {
                offset: offset as u64,
                reason: "frame length cannot be zero".to_string(),
            });
        }
        if length > max_entry_bytes {
            return Err(JournalError::FrameLengthInvalid {
                offset: offset as u64,
                reason: format!("frame length {length} exceeds max {max_entry_bytes}"),
            });
        }

        let body_start = offset + FRAME_HEADER_LEN;
        if buf.len() - body_start < length {
            // Torn body write.
            return Ok(Replay {
                entries,
                truncated_from: Some(offset as u64),
                bytes: offset as u64,
            });
        }

        let expected_crc = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);
        let body = &buf[body_start..body_start + length];
        let actual_crc = crc32c(body);
        if actual_crc != expected_crc {
            let is_final_frame = body_start + length == buf.len();
            if is_final_frame {
                // A tear can leave a full-length frame of garbage when the
                // filesystem extended the file before the data hit disk.
                return Ok(Replay {
                    entries,
                    truncated_from: Some(offset as u64),
                    bytes: offset as u64,
                });
            }
            return Err(JournalError::FrameCrcMismatch {
                offset: offset as u64,
                expected: expected_crc,
                got: actual_crc,
            });
        }

        let entry: JournalEntry =
            serde_json::from_slice(body).map_err(|source| JournalError::EntryDecode {
                offset: offset as u64,
                source,
            })?;
        entries.push(entry);
        offset = body_start + length;
    }
}

#[derive(Debug)]
pub struct Journal {
    path: PathBuf,
    file: fs::File,
    max_entry_bytes: usize,
    bytes: u64,
}

impl Journal {
    /// Append an entry and fsync. Durable once this returns.
    pub fn append(&mut self, entry: &JournalEntry) -> JournalResult<()> {
        let frame = encode_frame(entry, self.max_entry_bytes)?;
        let io_err = |source: io::Error| JournalError::Io {
            path: Some(self.path.clone()),
            source,
        };
        self.file.write_all(&frame).map_err(io_err)?;
        self.file.sync_all().map_err(io_err)?;
        self.bytes += frame.len() as u64;
        Ok(())
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

pub fn encode_frame(entry: &JournalEntry, max_entry_bytes: usize) -> JournalResult<Vec<u8>> {
    let body = serde_json::to_vec(entry).map_err(|source| JournalError::EntryEncode { source })?;
    if body.len() > max_entry_bytes {
        return Err(JournalError::EntryTooLarge {
            max_bytes: max_entry_bytes,
            got_bytes: body.len(),
        });
    }

    let length = u32::try_from(body.len()).map_err(|_| JournalError::FrameLengthInvalid {
        offset: 0,
        reason: "frame length exceeds u32".to_string(),
    })?;
    let crc = crc32c(&body);

    let mut buf = Vec::with_capacity(FRAME_HEADER_LEN + body.len());
    buf.extend_from_slice(&FRAME_MAGIC.to_le_bytes());
    buf.extend_from_slice(&length.to_le_bytes());
    buf.extend_from_slice(&crc.to_le_bytes());
    buf.extend_from_slice(&body);
    Ok(buf)
}
