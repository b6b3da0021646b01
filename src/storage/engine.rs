//! Record engine: every byte that reaches a collection file goes through
//! here, under one stream lock.
//!
//! Each record commits in two phases: the slot is written with state
//! `Pending`, then the state byte is patched to `Allocated`. A crash between
//! the two writes leaves a `Pending` slot that the next load scan reclaims
//! as free, so no half-committed record is ever indexed.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::codec::crypto::Encryptor;
use crate::codec::Codec;
use crate::config::Options;
use crate::constants::*;
use crate::error::{CombError, FailureBehavior, Result};
use crate::stats::Statistics;
use crate::storage::header::Header;
use crate::storage::slots::{SlotIndex, SlotRef};

pub struct RecordEngine<K> {
    // The stream lock: serializes all file and index mutations.
    inner: Mutex<EngineInner<K>>,
    stats: Arc<Statistics>,
    buffered_writes: bool,
}

struct EngineInner<K> {
    file: BufWriter<File>,
    slots: SlotIndex<K>,
    /// Tail offset: one past the last slot byte.
    file_len: u64,
}

impl<K> RecordEngine<K> {
    /// Current tail offset; equals the file size while the engine is open.
    pub fn size_bytes(&self) -> u64 {
        self.inner.lock().file_len
    }

    /// Push any writer-buffered bytes to the OS. No fsync: the engine
    /// targets process-crash safety, not power-loss safety.
    pub fn flush_file(&self) -> Result<()> {
        self.inner.lock().file.flush()?;
        Ok(())
    }
}

impl<K: Ord + Clone> RecordEngine<K> {
    /// Open or create the collection file at `path`, returning the engine
    /// together with the reconciled header and the derived encryptor.
    pub fn open(
        path: &Path,
        options: &Options,
        stats: Arc<Statistics>,
    ) -> Result<(Self, Header, Option<Encryptor>)> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(!options.read_only)
            .create(!options.read_only)
            .open(path)?;

        let existing_len = file.metadata()?.len();

        let (header, encryptor, file_len) = if existing_len == 0 {
            let (header, encryptor) = Header::synthesize(options)?;
            file.write_all(&header.to_bytes())?;
            file.flush()?;
            (header, encryptor, HEADER_SIZE as u64)
        } else {
            let mut buf = [0u8; HEADER_SIZE];
            file.seek(SeekFrom::Start(0))?;
            file.read_exact(&mut buf)?;
            let header = Header::from_bytes(&buf)?;
            let encryptor = header.reconcile(options)?;
            (header, encryptor, existing_len)
        };

        let engine = Self {
            inner: Mutex::new(EngineInner {
                file: BufWriter::new(file),
                slots: SlotIndex::new(),
                file_len,
            }),
            stats,
            buffered_writes: options.buffered_writes,
        };

        Ok((engine, header, encryptor))
    }

    pub fn allocated_count(&self) -> usize {
        self.inner.lock().slots.allocated_count()
    }

    pub fn free_count(&self) -> usize {
        self.inner.lock().slots.free_count()
    }

    pub fn free_bytes(&self) -> u64 {
        self.inner.lock().slots.free_bytes()
    }

    /// Write a new record. The payload must already be fully encoded.
    pub fn add(&self, key: K, payload: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock();
        self.add_locked(&mut inner, key, payload)
    }

    /// Replace the record for `key`: the old slot is freed and the new
    /// payload placed, in one lock acquisition. Falls back to a plain add
    /// when the key has no slot yet.
    pub fn update(&self, key: K, payload: &[u8]) -> Result<()> {
        let mut inner = self.inner.lock();
        self.remove_locked(&mut inner, &key)?;
        self.add_locked(&mut inner, key, payload)
    }

    /// Mark the record's slot `Deleted` and zero its payload. Returns false
    /// when the key has no slot.
    pub fn remove(&self, key: &K) -> Result<bool> {
        let mut inner = self.inner.lock();
        Ok(self.remove_locked(&mut inner, key)?.is_some())
    }

    /// Ordered append of pre-encoded records. Assumes the caller has ruled
    /// out duplicate keys. No free-slot reuse on this path: each record is
    /// written at the tail with a zero length, then the state and measured
    /// length are patched in one rewind.
    pub fn bulk_append(&self, items: Vec<(K, Vec<u8>)>) -> Result<()> {
        let mut inner = self.inner.lock();
        for (key, payload) in items {
            if payload.len() > MAX_PAYLOAD_SIZE {
                return Err(CombError::PayloadTooLarge(payload.len()));
            }
            let offset = self.checked_offset(inner.file_len, payload.len())?;

            inner.file.seek(SeekFrom::Start(offset as u64))?;
            let mut frame = [0u8; SLOT_STATE_SIZE + SLOT_LENGTH_SIZE];
            frame[0] = SlotState::Pending as u8;
            inner.file.write_all(&frame)?;
            inner.file.write_all(&payload)?;
            if !self.buffered_writes {
                inner.file.flush()?;
            }

            frame[0] = SlotState::Allocated as u8;
            frame[1..].copy_from_slice(&(payload.len() as u32).to_le_bytes());
            inner.file.seek(SeekFrom::Start(offset as u64))?;
            inner.file.write_all(&frame)?;
            if !self.buffered_writes {
                inner.file.flush()?;
            }

            let total_len = SLOT_FRAME_SIZE + payload.len() as u32;
            inner.file_len = offset as u64 + total_len as u64;
            inner.slots.insert_allocated(key, SlotRef { offset, total_len });
            self.stats.record_bytes_written(total_len as u64);
        }
        Ok(())
    }

    /// Scan the slot stream and rebuild both indices. Allocated payloads are
    /// decoded and handed to `sink`; Deleted and Pending slots become free
    /// entries. Decode errors are routed per `decode_failure`.
    pub fn load<V, F>(
        &self,
        codec: &Codec,
        decode_failure: FailureBehavior,
        mut sink: F,
    ) -> Result<()>
    where
        K: DeserializeOwned,
        V: DeserializeOwned,
        F: FnMut(K, V),
    {
        let mut inner = self.inner.lock();
        let EngineInner {
            file, slots, file_len,
        } = &mut *inner;

        file.flush()?;
        let raw = file.get_mut();
        let end = raw.metadata()?.len();
        raw.seek(SeekFrom::Start(HEADER_SIZE as u64))?;
        let mut reader = BufReader::with_capacity(SCAN_BUFFER_SIZE, raw);

        let mut pos = HEADER_SIZE as u64;
        let mut payload = Vec::new();
        let mut loaded = 0usize;
        let mut reclaimed = 0usize;
        let mut truncate_to = None;

        while pos < end {
            let mut state_byte = [0u8; 1];
            reader.read_exact(&mut state_byte)?;
            let state = SlotState::from_byte(state_byte[0]).ok_or_else(|| {
                CombError::CorruptedFile(format!(
                    "invalid slot state {} at offset {}",
                    state_byte[0], pos
                ))
            })?;

            if state == SlotState::Unallocated {
                pos += 1;
                continue;
            }

            if end - pos < SLOT_FRAME_SIZE as u64 {
                warn!(offset = pos, "slot frame truncated at end of file");
                truncate_to = Some(pos);
                break;
            }

            let mut len_bytes = [0u8; SLOT_LENGTH_SIZE];
            reader.read_exact(&mut len_bytes)?;
            let payload_len = u32::from_le_bytes(len_bytes);
            let total = SLOT_FRAME_SIZE as u64 + payload_len as u64;

            if pos + total > end {
                // An append interrupted before its payload was fully
                // written; chop it so the tail stays scannable.
                warn!(offset = pos, payload_len, "slot payload truncated at end of file");
                truncate_to = Some(pos);
                break;
            }

            let offset = self.checked_offset(pos, payload_len as usize)?;
            let total_len = total as u32;
            match state {
                SlotState::Allocated => {
                    payload.resize(payload_len as usize, 0);
                    reader.read_exact(&mut payload)?;
                    self.stats.record_bytes_read(total_len as u64);

                    match codec.decode::<K, V>(&payload) {
                        Ok((key, value)) => {
                            slots.insert_allocated(key.clone(), SlotRef { offset, total_len });
                            sink(key, value);
                            loaded += 1;
                        }
                        Err(e) if decode_failure == FailureBehavior::ReturnFalse => {
                            warn!(offset = pos, error = %e, "skipping undecodable record");
                        }
                        Err(e) => return Err(e),
                    }
                }
                SlotState::Deleted | SlotState::Pending => {
                    reader.seek_relative(payload_len as i64)?;
                    slots.insert_free(SlotRef { offset, total_len });
                    reclaimed += 1;
                }
                SlotState::Unallocated => unreachable!(),
            }

            pos += total_len as u64;
        }

        drop(reader);
        let end = match truncate_to {
            Some(tail) => {
                file.get_mut().set_len(tail)?;
                tail
            }
            None => end,
        };

        *file_len = end;
        debug!(loaded, reclaimed, file_len = end, "load scan complete");
        Ok(())
    }

    /// Truncate to an empty slot stream and re-emit the header.
    pub fn clear(&self, header: &Header) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.file.flush()?;
        inner.file.get_mut().set_len(0)?;
        inner.file.seek(SeekFrom::Start(0))?;
        inner.file.write_all(&header.to_bytes())?;
        inner.file.flush()?;
        inner.slots.clear();
        inner.file_len = HEADER_SIZE as u64;
        Ok(())
    }

    fn add_locked(&self, inner: &mut EngineInner<K>, key: K, payload: &[u8]) -> Result<()> {
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(CombError::PayloadTooLarge(payload.len()));
        }
        let needed = SLOT_FRAME_SIZE + payload.len() as u32;

        let slot = match inner.slots.take_free_fit(needed) {
            Some(slot) => {
                self.stats.record_slot_reused();
                slot
            }
            None => SlotRef {
                offset: self.checked_offset(inner.file_len, payload.len())?,
                total_len: needed,
            },
        };

        // Phase one: the full record under a Pending state byte. A failure
        // from here on leaves the slot Pending; the index is not touched and
        // the next load scan reclaims the bytes.
        inner.file.seek(SeekFrom::Start(slot.offset as u64))?;
        let mut frame = [0u8; SLOT_STATE_SIZE + SLOT_LENGTH_SIZE];
        frame[0] = SlotState::Pending as u8;
        frame[1..].copy_from_slice(&(payload.len() as u32).to_le_bytes());
        inner.file.write_all(&frame)?;
        inner.file.write_all(payload)?;
        if slot.total_len > needed {
            // In-place shrink: the reused slot may hold stale bytes past the
            // new payload (a reclaimed Pending slot is never zeroed), and
            // the scanner walks this gap byte by byte.
            let mut gap = (slot.total_len - needed) as usize;
            let zeros = [0u8; ZERO_CHUNK_SIZE];
            while gap > 0 {
                let chunk = gap.min(ZERO_CHUNK_SIZE);
                inner.file.write_all(&zeros[..chunk])?;
                gap -= chunk;
            }
        }
        if !self.buffered_writes {
            inner.file.flush()?;
        }

        // Phase two: commit.
        inner.file.seek(SeekFrom::Start(slot.offset as u64))?;
        inner.file.write_all(&[SlotState::Allocated as u8])?;
        inner.file.flush()?;

        let record_end = slot.offset as u64 + needed as u64;
        if record_end > inner.file_len {
            inner.file_len = record_end;
        }
        inner.slots.insert_allocated(key, slot);
        self.stats.record_bytes_written(needed as u64);
        Ok(())
    }

    fn remove_locked(&self, inner: &mut EngineInner<K>, key: &K) -> Result<Option<SlotRef>> {
        let Some(slot) = inner.slots.get(key) else {
            return Ok(None);
        };

        inner.file.seek(SeekFrom::Start(slot.offset as u64))?;
        inner.file.write_all(&[SlotState::Deleted as u8])?;
        if !self.buffered_writes {
            inner.file.flush()?;
        }

        // Zero the payload region so the load scanner can walk reclaimed
        // space byte by byte. The length field stays intact for skipping.
        inner.file.seek(SeekFrom::Start(
            slot.offset as u64 + SLOT_FRAME_SIZE as u64,
        ))?;
        let mut remaining = (slot.total_len - SLOT_FRAME_SIZE) as usize;
        let zeros = [0u8; ZERO_CHUNK_SIZE];
        while remaining > 0 {
            let chunk = remaining.min(ZERO_CHUNK_SIZE);
            inner.file.write_all(&zeros[..chunk])?;
            remaining -= chunk;
        }
        if !self.buffered_writes {
            inner.file.flush()?;
        }

        // Index moves only after both writes succeeded.
        inner.slots.remove_allocated(key);
        inner.slots.insert_free(slot);
        self.stats.record_slot_freed();
        Ok(Some(slot))
    }

    fn checked_offset(&self, base: u64, payload_len: usize) -> Result<u32> {
        let end = base + SLOT_FRAME_SIZE as u64 + payload_len as u64;
        if end > u32::MAX as u64 {
            return Err(CombError::StorageFailure(std::io::Error::other(
                "collection file exceeds the 4 GiB slot address space",
            )));
        }
        Ok(base as u32)
    }
}
