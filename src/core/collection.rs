//! The per-collection facade.
//!
//! A `Collection<K, V>` pairs a concurrent in-memory map (the authoritative
//! source for reads) with one slot file driven by the record engine. Reads
//! never take a lock beyond the map shard; writes update the map first and
//! then persist synchronously or through the write pipeline, depending on
//! the buffer mode.
//!
//! Lock order is fixed: the pipeline RwLock is outermost (writers hold it
//! shared for the whole operation, maintenance holds it exclusively), then
//! the persistence handle, then map shards, then the engine stream lock.

use std::fs;
use std::hash::Hash;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::codec::Codec;
use crate::config::{BufferMode, Options};
use crate::error::{
    CombError, DuplicateKeyBehavior, FailureBehavior, KeyNotFoundBehavior, Result,
};
use crate::pipeline::{Pipeline, WriteOp};
use crate::stats::{Statistics, StatsSnapshot};
use crate::storage::engine::RecordEngine;
use crate::storage::header::Header;

const STATE_NEW: u8 = 0;
const STATE_OPEN: u8 = 1;
const STATE_CLOSED: u8 = 2;

struct Persistence<K> {
    engine: Arc<RecordEngine<K>>,
    codec: Arc<Codec>,
    header: Header,
}

/// A named persistent mapping from `K` to `V`, backed by exactly one file.
pub struct Collection<K, V> {
    name: String,
    options: Options,
    state: AtomicU8,
    map: DashMap<K, V, ahash::RandomState>,
    persist: RwLock<Option<Persistence<K>>>,
    pipeline: RwLock<Option<Pipeline<K, V>>>,
    stats: Arc<Statistics>,
}

impl<K, V> Collection<K, V>
where
    K: Serialize + DeserializeOwned + Ord + Hash + Eq + Clone + Send + Sync + 'static,
    V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Create an unloaded collection. Call [`Collection::load`] before use.
    pub fn new(name: impl Into<String>, options: Options) -> Self {
        Self {
            name: name.into(),
            options,
            state: AtomicU8::new(STATE_NEW),
            map: DashMap::with_hasher(ahash::RandomState::new()),
            persist: RwLock::new(None),
            pipeline: RwLock::new(None),
            stats: Arc::new(Statistics::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the backing file, derived from the options. Meaningless in
    /// memory-only mode.
    pub fn file_path(&self) -> PathBuf {
        self.options
            .base_directory
            .join(&self.options.database_name)
            .join(format!("{}.{}", self.name, self.options.file_extension))
    }

    /// Open the backing file, reconcile the header, scan the slot stream
    /// into memory and start the write pipeline.
    pub fn load(&self) -> Result<()> {
        match self.state.load(Ordering::Acquire) {
            STATE_NEW => {}
            STATE_OPEN => return Err(CombError::CollectionAlreadyOpen),
            _ => return Err(CombError::CollectionClosed),
        }

        let mut persist_guard = self.persist.write();
        if self.state.load(Ordering::Acquire) != STATE_NEW {
            return Err(CombError::CollectionAlreadyOpen);
        }

        if self.options.memory_only {
            self.state.store(STATE_OPEN, Ordering::Release);
            return Ok(());
        }

        let dir = self
            .options
            .base_directory
            .join(&self.options.database_name);
        if !self.options.read_only {
            fs::create_dir_all(&dir)?;
        }

        let (engine, header, encryptor) =
            RecordEngine::open(&self.file_path(), &self.options, self.stats.clone())?;
        let engine = Arc::new(engine);
        let codec = Arc::new(Codec::new(header.serializer, header.compressed, encryptor));

        engine.load::<V, _>(
            &codec,
            self.options.deserialization_failure_behavior,
            |key, value| {
                self.map.insert(key, value);
            },
        )?;

        if self.options.buffer_mode != BufferMode::Disabled && !self.options.read_only {
            *self.pipeline.write() = Some(Pipeline::start(
                self.options.buffer_mode,
                engine.clone(),
                codec.clone(),
                self.stats.clone(),
                self.options.max_parallelism,
            ));
        }

        *persist_guard = Some(Persistence {
            engine,
            codec,
            header,
        });
        self.state.store(STATE_OPEN, Ordering::Release);
        Ok(())
    }

    // ---------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------

    /// Add a new record. The duplicate-key behavior decides what happens
    /// when the key is already present.
    pub fn add(&self, key: K, value: V) -> Result<bool> {
        self.ensure_writable()?;
        let pl = self.pipeline.read();
        self.ensure_writable()?;
        self.stats.record_add();

        match self.map.entry(key) {
            Entry::Occupied(mut entry) => match self.options.add_duplicate_key_behavior {
                DuplicateKeyBehavior::FailWithError => Err(CombError::DuplicateKey),
                DuplicateKeyBehavior::ReturnFalse => Ok(false),
                DuplicateKeyBehavior::Upsert => {
                    entry.insert(value);
                    self.persist_update(&pl, entry.key(), entry.get())
                }
            },
            Entry::Vacant(entry) => {
                let inserted = entry.insert(value);
                self.persist_add(&pl, inserted.key(), inserted.value())
            }
        }
    }

    /// Replace the value of an existing key. The missing-key behavior
    /// decides what happens when it is absent.
    pub fn update(&self, key: K, value: V) -> Result<bool> {
        self.ensure_writable()?;
        let pl = self.pipeline.read();
        self.ensure_writable()?;
        self.stats.record_update();

        match self.map.entry(key) {
            Entry::Occupied(mut entry) => {
                entry.insert(value);
                self.persist_update(&pl, entry.key(), entry.get())
            }
            Entry::Vacant(_) => match self.options.update_key_not_found_behavior {
                KeyNotFoundBehavior::FailWithError => Err(CombError::KeyNotFound),
                KeyNotFoundBehavior::ReturnFalse => Ok(false),
            },
        }
    }

    /// Insert or replace, regardless of whether the key exists.
    pub fn upsert(&self, key: K, value: V) -> Result<bool> {
        self.ensure_writable()?;
        let pl = self.pipeline.read();
        self.ensure_writable()?;

        match self.map.entry(key) {
            Entry::Occupied(mut entry) => {
                self.stats.record_update();
                entry.insert(value);
                self.persist_update(&pl, entry.key(), entry.get())
            }
            Entry::Vacant(entry) => {
                self.stats.record_add();
                let inserted = entry.insert(value);
                self.persist_add(&pl, inserted.key(), inserted.value())
            }
        }
    }

    /// Remove a record, returning its value. The missing-key behavior
    /// decides what happens when the key is absent.
    pub fn remove(&self, key: K) -> Result<Option<V>> {
        self.ensure_writable()?;
        let pl = self.pipeline.read();
        self.ensure_writable()?;
        self.stats.record_remove();

        match self.map.entry(key) {
            Entry::Occupied(entry) => {
                // Persist while the entry guard is held so queue order and
                // map order agree for this key.
                let persisted = self.persist_remove(&pl, entry.key());
                let (_, value) = entry.remove_entry();
                persisted?;
                Ok(Some(value))
            }
            Entry::Vacant(_) => match self.options.remove_key_not_found_behavior {
                KeyNotFoundBehavior::FailWithError => Err(CombError::KeyNotFound),
                KeyNotFoundBehavior::ReturnFalse => Ok(None),
            },
        }
    }

    /// Add many records at once. The bulk duplicate-key behavior is applied
    /// to the input as a whole: `FailWithError` and `ReturnFalse` abort
    /// before any state change; `Upsert` updates the duplicates one by one
    /// and bulk-appends the new keys (a best-effort merge, not a
    /// transaction).
    pub fn bulk_add(&self, pairs: impl IntoIterator<Item = (K, V)>) -> Result<bool> {
        self.ensure_writable()?;
        let pl = self.pipeline.read();
        self.ensure_writable()?;

        let pairs: Vec<(K, V)> = pairs.into_iter().collect();
        if pairs.is_empty() {
            return Ok(true);
        }

        // Dedupe repeats within the input (later occurrence wins), then
        // split against the live map. The engine's append path assumes no
        // duplicate keys.
        let mut had_input_repeat = false;
        let mut deduped: Vec<(K, V)> = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            match deduped.iter_mut().find(|(k, _)| *k == key) {
                Some(slot) => {
                    had_input_repeat = true;
                    slot.1 = value;
                }
                None => deduped.push((key, value)),
            }
        }
        let (duplicates, fresh): (Vec<(K, V)>, Vec<(K, V)>) = deduped
            .into_iter()
            .partition(|(key, _)| self.map.contains_key(key));

        if had_input_repeat || !duplicates.is_empty() {
            match self.options.bulk_add_duplicate_key_behavior {
                DuplicateKeyBehavior::FailWithError => return Err(CombError::DuplicateKey),
                DuplicateKeyBehavior::ReturnFalse => return Ok(false),
                DuplicateKeyBehavior::Upsert => {}
            }
        }

        for (key, value) in duplicates {
            self.stats.record_update();
            match self.map.entry(key) {
                Entry::Occupied(mut entry) => {
                    entry.insert(value);
                    self.persist_update(&pl, entry.key(), entry.get())?;
                }
                Entry::Vacant(entry) => {
                    // Removed concurrently since the partition; treat as new.
                    let inserted = entry.insert(value);
                    self.persist_add(&pl, inserted.key(), inserted.value())?;
                }
            }
        }

        self.bulk_append(&pl, fresh)?;
        Ok(true)
    }

    /// Remove many records, continuing across missing keys.
    pub fn bulk_remove(&self, keys: impl IntoIterator<Item = K>) -> Result<bool> {
        self.ensure_writable()?;
        let pl = self.pipeline.read();
        self.ensure_writable()?;

        for key in keys {
            if let Entry::Occupied(entry) = self.map.entry(key) {
                self.stats.record_remove();
                let persisted = self.persist_remove(&pl, entry.key());
                entry.remove_entry();
                persisted?;
            }
        }
        Ok(true)
    }

    // ---------------------------------------------------------------
    // Reads: served from the in-memory map, no stream lock.
    // ---------------------------------------------------------------

    pub fn try_get(&self, key: &K) -> Result<Option<V>> {
        self.ensure_open()?;
        self.stats.record_get();
        Ok(self.map.get(key).map(|entry| entry.value().clone()))
    }

    pub fn contains(&self, key: &K) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.map.contains_key(key))
    }

    /// Snapshot of all values.
    pub fn values(&self) -> Result<Vec<V>> {
        self.ensure_open()?;
        Ok(self.map.iter().map(|entry| entry.value().clone()).collect())
    }

    /// Snapshot of all pairs.
    pub fn pairs(&self) -> Result<Vec<(K, V)>> {
        self.ensure_open()?;
        Ok(self
            .map
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect())
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Size of the backing file in bytes; zero in memory-only mode.
    pub fn size_bytes(&self) -> u64 {
        self.persist
            .read()
            .as_ref()
            .map(|p| p.engine.size_bytes())
            .unwrap_or(0)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    // ---------------------------------------------------------------
    // Maintenance
    // ---------------------------------------------------------------

    /// Drain the pipeline stage by stage, flush the file stream and drop
    /// pooled buffers.
    pub fn flush(&self) -> Result<()> {
        self.ensure_open()?;
        let pl = self.pipeline.read();

        if let Some(pipeline) = pl.as_ref() {
            pipeline.flush()?;
        } else if let Some(p) = self.persist.read().as_ref() {
            p.engine.flush_file()?;
        }

        if let Some(p) = self.persist.read().as_ref() {
            p.codec.shrink();
        }
        self.stats.record_flush();
        Ok(())
    }

    /// Discard every record. Pending pipeline entries are cancelled, both
    /// indices are emptied and the file is truncated back to its header.
    pub fn clear(&self) -> Result<()> {
        self.ensure_writable()?;
        let mut pl = self.pipeline.write();
        self.ensure_writable()?;

        if let Some(mut pipeline) = pl.take() {
            pipeline.shutdown(true);
        }
        self.map.clear();

        let persist = self.persist.read();
        if let Some(p) = persist.as_ref() {
            p.engine.clear(&p.header)?;
            if self.options.buffer_mode != BufferMode::Disabled {
                *pl = Some(Pipeline::start(
                    self.options.buffer_mode,
                    p.engine.clone(),
                    p.codec.clone(),
                    self.stats.clone(),
                    self.options.max_parallelism,
                ));
            }
        }
        Ok(())
    }

    /// Drain everything, release the file handle and clear the map. Every
    /// operation afterwards fails with `CollectionClosed`.
    pub fn close(&self) -> Result<()> {
        match self
            .state
            .compare_exchange(STATE_OPEN, STATE_CLOSED, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {}
            Err(STATE_NEW) => return Err(CombError::CollectionNotLoaded),
            Err(_) => return Err(CombError::CollectionClosed),
        }

        let mut pl = self.pipeline.write();
        let mut result = Ok(());

        if let Some(mut pipeline) = pl.take() {
            if let Err(e) = pipeline.flush() {
                warn!(collection = %self.name, error = %e, "flush during close failed");
                result = Err(e);
            }
            pipeline.shutdown(false);
        }

        if let Some(p) = self.persist.write().take() {
            p.codec.shrink();
            if let Err(e) = p.engine.flush_file() {
                warn!(collection = %self.name, error = %e, "file flush during close failed");
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }

        self.map.clear();
        result
    }

    /// Close the collection and delete its backing file. Callable on an
    /// already-closed collection.
    pub fn destroy(&self) -> Result<()> {
        match self.close() {
            Ok(()) | Err(CombError::CollectionClosed) => {}
            Err(e) => return Err(e),
        }
        if !self.options.memory_only {
            let path = self.file_path();
            if path.exists() {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }

    /// Reserved; currently a no-op.
    pub fn defragment(&self) -> Result<()> {
        self.ensure_writable()?;
        Ok(())
    }

    // ---------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------

    fn ensure_open(&self) -> Result<()> {
        match self.state.load(Ordering::Acquire) {
            STATE_OPEN => Ok(()),
            STATE_NEW => Err(CombError::CollectionNotLoaded),
            _ => Err(CombError::CollectionClosed),
        }
    }

    fn ensure_writable(&self) -> Result<()> {
        self.ensure_open()?;
        if self.options.read_only {
            return Err(CombError::CollectionReadOnly);
        }
        Ok(())
    }

    fn persist_add(&self, pl: &Option<Pipeline<K, V>>, key: &K, value: &V) -> Result<bool> {
        if self.options.memory_only {
            return Ok(true);
        }
        match self.options.buffer_mode {
            BufferMode::Disabled => {
                let guard = self.persist.read();
                let p = guard.as_ref().ok_or(CombError::CollectionNotLoaded)?;
                let payload = match p.codec.encode(key, value) {
                    Ok(payload) => payload,
                    Err(e) => return self.route_encode(e),
                };
                match p.engine.add(key.clone(), &payload) {
                    Ok(()) => {
                        self.stats.record_applied();
                        Ok(true)
                    }
                    Err(e) => self.route_storage(e),
                }
            }
            _ => self.enqueue(
                pl,
                WriteOp::Add {
                    key: key.clone(),
                    value: value.clone(),
                },
            ),
        }
    }

    fn persist_update(&self, pl: &Option<Pipeline<K, V>>, key: &K, value: &V) -> Result<bool> {
        if self.options.memory_only {
            return Ok(true);
        }
        match self.options.buffer_mode {
            BufferMode::Disabled => {
                let guard = self.persist.read();
                let p = guard.as_ref().ok_or(CombError::CollectionNotLoaded)?;
                let payload = match p.codec.encode(key, value) {
                    Ok(payload) => payload,
                    Err(e) => return self.route_encode(e),
                };
                match p.engine.update(key.clone(), &payload) {
                    Ok(()) => {
                        self.stats.record_applied();
                        Ok(true)
                    }
                    Err(e) => self.route_storage(e),
                }
            }
            _ => self.enqueue(
                pl,
                WriteOp::Update {
                    key: key.clone(),
                    value: value.clone(),
                },
            ),
        }
    }

    fn persist_remove(&self, pl: &Option<Pipeline<K, V>>, key: &K) -> Result<bool> {
        if self.options.memory_only {
            return Ok(true);
        }
        match self.options.buffer_mode {
            BufferMode::Disabled => {
                let guard = self.persist.read();
                let p = guard.as_ref().ok_or(CombError::CollectionNotLoaded)?;
                match p.engine.remove(key) {
                    Ok(_) => {
                        self.stats.record_applied();
                        Ok(true)
                    }
                    Err(e) => self.route_storage(e),
                }
            }
            _ => self.enqueue(pl, WriteOp::Remove { key: key.clone() }),
        }
    }

    fn bulk_append(&self, pl: &Option<Pipeline<K, V>>, fresh: Vec<(K, V)>) -> Result<bool> {
        if fresh.is_empty() {
            return Ok(true);
        }

        if self.options.memory_only || self.options.buffer_mode != BufferMode::Disabled {
            for (key, value) in fresh {
                match self.map.entry(key) {
                    // A concurrent writer won the key since the partition;
                    // its own persistence is already in flight.
                    Entry::Occupied(_) => continue,
                    Entry::Vacant(entry) => {
                        self.stats.record_add();
                        let inserted = entry.insert(value);
                        // Enqueue while the entry guard is held so queue
                        // order and map order agree for this key.
                        if !self.options.memory_only {
                            self.enqueue(
                                pl,
                                WriteOp::Add {
                                    key: inserted.key().clone(),
                                    value: inserted.value().clone(),
                                },
                            )?;
                        }
                    }
                }
            }
            return Ok(true);
        }

        // Disabled mode: encode everything up front so a serialization
        // failure aborts before any state change.
        let guard = self.persist.read();
        let p = guard.as_ref().ok_or(CombError::CollectionNotLoaded)?;

        let mut encoded = Vec::with_capacity(fresh.len());
        for (key, value) in fresh {
            match p.codec.encode(&key, &value) {
                Ok(payload) => encoded.push((key, value, payload)),
                Err(e) => return self.route_encode(e),
            }
        }

        for (key, value, payload) in encoded {
            match self.map.entry(key) {
                Entry::Occupied(_) => continue,
                Entry::Vacant(entry) => {
                    self.stats.record_add();
                    let inserted = entry.insert(value);
                    // The append runs under the same entry guard, so a
                    // concurrent remove or update of this key cannot slip
                    // between the map insert and the slot becoming live.
                    if let Err(e) =
                        p.engine.bulk_append(vec![(inserted.key().clone(), payload)])
                    {
                        return self.route_storage(e);
                    }
                    self.stats.record_applied();
                }
            }
        }
        Ok(true)
    }

    fn enqueue(&self, pl: &Option<Pipeline<K, V>>, op: WriteOp<K, V>) -> Result<bool> {
        let pipeline = pl.as_ref().ok_or(CombError::PipelineShutDown)?;
        pipeline.submit(op)?;
        self.stats.record_enqueued();
        Ok(true)
    }

    fn route_encode(&self, e: CombError) -> Result<bool> {
        match (
            &e,
            self.options.serialization_failure_behavior,
        ) {
            (CombError::SerializationFailure(_), FailureBehavior::ReturnFalse) => {
                self.stats.record_encode_failure();
                Ok(false)
            }
            (CombError::SerializationFailure(_), FailureBehavior::FailWithError) => {
                self.stats.record_encode_failure();
                Err(e)
            }
            _ => Err(e),
        }
    }

    fn route_storage(&self, e: CombError) -> Result<bool> {
        match (&e, self.options.storage_failure_behavior) {
            (CombError::StorageFailure(_), FailureBehavior::ReturnFalse) => {
                self.stats.record_write_failure();
                Ok(false)
            }
            (CombError::StorageFailure(_), FailureBehavior::FailWithError) => {
                self.stats.record_write_failure();
                Err(e)
            }
            _ => Err(e),
        }
    }
}

impl<K, V> Drop for Collection<K, V> {
    fn drop(&mut self) {
        // Graceful shutdown: drain the pipeline and flush, best effort.
        if self.state.load(Ordering::Acquire) == STATE_OPEN {
            if let Some(mut pipeline) = self.pipeline.write().take() {
                let _ = pipeline.flush();
                pipeline.shutdown(false);
            }
            if let Some(p) = self.persist.write().take() {
                let _ = p.engine.flush_file();
            }
        }
    }
}
