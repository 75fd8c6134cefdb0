//! File-backed message store.
//!
//! Records are appended to a single data file as length-prefixed frames and
//! mirrored in an in-memory index for reads. Sequence counters live in a
//! small side file rewritten on every counter update. On open the data file
//! is scanned to rebuild the index; a torn frame at the tail (from a crash
//! mid-append) is truncated away.
//!
//! Frame layout, little-endian:
//!
//! ```text
//! [u32 frame_len][u64 seq_num][u64 sending_time_nanos]
//! [u16 msg_type_len][msg_type bytes][payload bytes]
//! ```
//!
//! `frame_len` counts everything after itself.

use crate::traits::{MessageStore, StoreVisitor, StoredRecord};
use async_trait::async_trait;
use bytes::Bytes;
use ferrofix_core::error::StoreError;
use ferrofix_core::message::MsgType;
use ferrofix_core::types::Timestamp;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

const DATA_FILE: &str = "messages.dat";
const SEQNUMS_FILE: &str = "seqnums.dat";

/// Fixed part of a frame after the length prefix: seq (8) + nanos (8) +
/// msg_type_len (2).
const FRAME_HEADER_LEN: usize = 18;

struct Inner {
    data: File,
    seqnums: File,
    index: BTreeMap<u64, StoredRecord>,
}

/// Message store persisted to a directory on disk.
///
/// One directory per session identity. Reads are served from the in-memory
/// index rebuilt at open, so the data file is only ever appended to.
pub struct FileStore {
    dir: PathBuf,
    inner: Mutex<Option<Inner>>,
    next_sender_seq: AtomicU64,
    next_target_seq: AtomicU64,
}

impl FileStore {
    /// Creates a store rooted at `dir`. No I/O happens until
    /// [`MessageStore::open`].
    #[must_use]
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            inner: Mutex::new(None),
            next_sender_seq: AtomicU64::new(1),
            next_target_seq: AtomicU64::new(1),
        }
    }

    /// Returns the directory this store persists into.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn persist_seqnums(&self, seqnums: &mut File) -> Result<(), StoreError> {
        let mut buf = [0u8; 16];
        buf[..8].copy_from_slice(&self.next_sender_seq.load(Ordering::SeqCst).to_le_bytes());
        buf[8..].copy_from_slice(&self.next_target_seq.load(Ordering::SeqCst).to_le_bytes());
        seqnums.seek(SeekFrom::Start(0))?;
        seqnums.write_all(&buf)?;
        seqnums.sync_data()?;
        Ok(())
    }

    /// Rebuilds the record index from the data file, truncating a torn
    /// frame at the tail if one is found.
    fn scan_data(data: &mut File) -> Result<BTreeMap<u64, StoredRecord>, StoreError> {
        let mut raw = Vec::new();
        data.seek(SeekFrom::Start(0))?;
        data.read_to_end(&mut raw)?;

        let mut index = BTreeMap::new();
        let mut offset = 0usize;
        loop {
            if offset + 4 > raw.len() {
                break;
            }
            let frame_len = u32::from_le_bytes(
                raw[offset..offset + 4]
                    .try_into()
                    .map_err(|_| StoreError::Corrupted {
                        reason: "unreadable frame length".to_string(),
                    })?,
            ) as usize;
            if frame_len < FRAME_HEADER_LEN || offset + 4 + frame_len > raw.len() {
                break;
            }
            let frame = &raw[offset + 4..offset + 4 + frame_len];
            let seq_num = u64::from_le_bytes(frame[0..8].try_into().map_err(|_| {
                StoreError::Corrupted {
                    reason: "unreadable sequence number".to_string(),
                }
            })?);
            let nanos = u64::from_le_bytes(frame[8..16].try_into().map_err(|_| {
                StoreError::Corrupted {
                    reason: "unreadable sending time".to_string(),
                }
            })?);
            let type_len = u16::from_le_bytes(frame[16..18].try_into().map_err(|_| {
                StoreError::Corrupted {
                    reason: "unreadable msg type length".to_string(),
                }
            })?) as usize;
            if FRAME_HEADER_LEN + type_len > frame_len {
                break;
            }
            let msg_type_str = std::str::from_utf8(&frame[18..18 + type_len]).map_err(|_| {
                StoreError::Corrupted {
                    reason: format!("invalid msg type encoding for seq {seq_num}"),
                }
            })?;
            let msg_type = match MsgType::from_str(msg_type_str) {
                Ok(t) => t,
                Err(never) => match never {},
            };
            let payload = Bytes::copy_from_slice(&frame[18 + type_len..]);

            index.insert(
                seq_num,
                StoredRecord::new(seq_num, Timestamp::from_nanos(nanos), msg_type, payload),
            );
            offset += 4 + frame_len;
        }

        if offset < raw.len() {
            warn!(
                valid_bytes = offset,
                torn_bytes = raw.len() - offset,
                "truncating torn frame at data file tail"
            );
            data.set_len(offset as u64)?;
            data.sync_data()?;
        }
        data.seek(SeekFrom::End(0))?;

        Ok(index)
    }

    fn with_inner<T>(
        &self,
        f: impl FnOnce(&mut Inner) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut guard = self.inner.lock();
        match guard.as_mut() {
            Some(inner) => f(inner),
            None => Err(StoreError::Io("store is not open".to_string())),
        }
    }
}

#[async_trait]
impl MessageStore for FileStore {
    async fn open(&self) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.dir)?;

        let mut data = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(self.dir.join(DATA_FILE))?;
        let mut seqnums = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(self.dir.join(SEQNUMS_FILE))?;

        let mut counter_buf = [0u8; 16];
        seqnums.seek(SeekFrom::Start(0))?;
        match seqnums.read_exact(&mut counter_buf) {
            Ok(()) => {
                let sender = u64::from_le_bytes(
                    counter_buf[..8]
                        .try_into()
                        .map_err(|_| StoreError::Corrupted {
                            reason: "unreadable sender counter".to_string(),
                        })?,
                );
                let target = u64::from_le_bytes(
                    counter_buf[8..]
                        .try_into()
                        .map_err(|_| StoreError::Corrupted {
                            reason: "unreadable target counter".to_string(),
                        })?,
                );
                self.next_sender_seq.store(sender.max(1), Ordering::SeqCst);
                self.next_target_seq.store(target.max(1), Ordering::SeqCst);
            }
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                // Fresh store: counters start at 1.
                self.next_sender_seq.store(1, Ordering::SeqCst);
                self.next_target_seq.store(1, Ordering::SeqCst);
                self.persist_seqnums(&mut seqnums)?;
            }
            Err(e) => return Err(e.into()),
        }

        let index = Self::scan_data(&mut data)?;
        debug!(
            dir = %self.dir.display(),
            records = index.len(),
            next_sender = self.next_sender_seq.load(Ordering::SeqCst),
            next_target = self.next_target_seq.load(Ordering::SeqCst),
            "opened file store"
        );

        *self.inner.lock() = Some(Inner {
            data,
            seqnums,
            index,
        });
        Ok(())
    }

    async fn write(
        &self,
        seq_num: u64,
        sending_time: Timestamp,
        msg_type: &MsgType,
        payload: &[u8],
    ) -> Result<(), StoreError> {
        self.with_inner(|inner| {
            let type_bytes = msg_type.as_str().as_bytes();
            let frame_len = FRAME_HEADER_LEN + type_bytes.len() + payload.len();

            let mut frame = Vec::with_capacity(4 + frame_len);
            frame.extend_from_slice(&(frame_len as u32).to_le_bytes());
            frame.extend_from_slice(&seq_num.to_le_bytes());
            frame.extend_from_slice(&sending_time.as_nanos().to_le_bytes());
            frame.extend_from_slice(&(type_bytes.len() as u16).to_le_bytes());
            frame.extend_from_slice(type_bytes);
            frame.extend_from_slice(payload);

            inner
                .data
                .write_all(&frame)
                .map_err(|e| StoreError::WriteFailed {
                    seq_num,
                    reason: e.to_string(),
                })?;
            inner
                .data
                .sync_data()
                .map_err(|e| StoreError::WriteFailed {
                    seq_num,
                    reason: e.to_string(),
                })?;

            inner.index.insert(
                seq_num,
                StoredRecord::new(
                    seq_num,
                    sending_time,
                    msg_type.clone(),
                    Bytes::copy_from_slice(payload),
                ),
            );
            Ok(())
        })
    }

    async fn read(
        &self,
        seq_num: u64,
        visitor: &mut dyn StoreVisitor,
    ) -> Result<usize, StoreError> {
        self.with_inner(|inner| match inner.index.get(&seq_num) {
            Some(record) => {
                visitor.on_record(record);
                Ok(1)
            }
            None => Ok(0),
        })
    }

    async fn read_range(
        &self,
        from_seq: u64,
        to_seq: u64,
        visitor: &mut dyn StoreVisitor,
    ) -> Result<usize, StoreError> {
        self.with_inner(|inner| {
            let upper = if to_seq == 0 {
                match inner.index.keys().next_back() {
                    Some(&hi) if hi >= from_seq => hi,
                    _ => return Ok(0),
                }
            } else {
                to_seq
            };

            let mut expected = from_seq;
            let mut visited = 0;
            for (&seq, record) in inner.index.range(from_seq..=upper) {
                if seq > expected {
                    visitor.on_gap(expected, seq - 1);
                }
                visitor.on_record(record);
                visited += 1;
                expected = seq + 1;
            }
            if expected <= upper {
                visitor.on_gap(expected, upper);
            }
            Ok(visited)
        })
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.next_sender_seq.store(1, Ordering::SeqCst);
        self.next_target_seq.store(1, Ordering::SeqCst);
        self.with_inner(|inner| {
            inner.data.set_len(0)?;
            inner.data.seek(SeekFrom::Start(0))?;
            inner.data.sync_data()?;
            inner.index.clear();
            Ok(())
        })?;
        self.with_inner(|inner| {
            let mut buf = [0u8; 16];
            buf[..8].copy_from_slice(&1u64.to_le_bytes());
            buf[8..].copy_from_slice(&1u64.to_le_bytes());
            inner.seqnums.seek(SeekFrom::Start(0))?;
            inner.seqnums.write_all(&buf)?;
            inner.seqnums.sync_data()?;
            Ok(())
        })
    }

    async fn flush(&self) -> Result<(), StoreError> {
        self.with_inner(|inner| {
            inner.data.sync_data()?;
            inner.seqnums.sync_data()?;
            Ok(())
        })
    }

    async fn close(&self) -> Result<(), StoreError> {
        let inner = self.inner.lock().take();
        if let Some(inner) = inner {
            inner.data.sync_data()?;
            inner.seqnums.sync_data()?;
        }
        Ok(())
    }

    fn next_sender_seq(&self) -> u64 {
        self.next_sender_seq.load(Ordering::SeqCst)
    }

    fn next_target_seq(&self) -> u64 {
        self.next_target_seq.load(Ordering::SeqCst)
    }

    async fn set_next_sender_seq(&self, seq: u64) -> Result<(), StoreError> {
        self.next_sender_seq.store(seq, Ordering::SeqCst);
        self.with_inner(|inner| {
            let mut buf = [0u8; 16];
            buf[..8].copy_from_slice(&seq.to_le_bytes());
            buf[8..].copy_from_slice(
                &self
                    .next_target_seq
                    .load(Ordering::SeqCst)
                    .to_le_bytes(),
            );
            inner.seqnums.seek(SeekFrom::Start(0))?;
            inner.seqnums.write_all(&buf)?;
            inner.seqnums.sync_data()?;
            Ok(())
        })
    }

    async fn set_next_target_seq(&self, seq: u64) -> Result<(), StoreError> {
        self.next_target_seq.store(seq, Ordering::SeqCst);
        self.with_inner(|inner| {
            let mut buf = [0u8; 16];
            buf[..8].copy_from_slice(
                &self
                    .next_sender_seq
                    .load(Ordering::SeqCst)
                    .to_le_bytes(),
            );
            buf[8..].copy_from_slice(&seq.to_le_bytes());
            inner.seqnums.seek(SeekFrom::Start(0))?;
            inner.seqnums.write_all(&buf)?;
            inner.seqnums.sync_data()?;
            Ok(())
        })
    }
}
