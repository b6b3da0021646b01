//! Buffered write paths.
//!
//! `Buffered` funnels operations through one FIFO queue into a single
//! file-system worker. `ParallelBuffered` splits the work in three stages:
//!
//! ```text
//! submit ─▶ serialization queue ─▶ dispatcher (assigns seq ids)
//!                                      │
//!                          bounded transform pool (encode, N workers)
//!                                      │  out-of-order completion
//!                              sparse reorder buffer
//!                                      │
//!                         sequencer (releases seq 1, 2, 3, …)
//!                                      │
//!                          file-system queue ─▶ fs worker ─▶ engine
//! ```
//!
//! Whatever the pool interleaving, entries reach the file in the exact
//! order they were dequeued from the serialization queue, which is the
//! FIFO order producers enqueued them in.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use bytes::Bytes;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use serde::Serialize;
use tracing::{debug, warn};

use crate::codec::Codec;
use crate::config::BufferMode;
use crate::error::{CombError, Result};
use crate::stats::Statistics;
use crate::storage::engine::RecordEngine;

/// An operation as submitted by the facade. The in-memory map has already
/// been updated; only the file is behind.
pub(crate) enum WriteOp<K, V> {
    Add { key: K, value: V },
    Update { key: K, value: V },
    Remove { key: K },
}

/// A transformed operation carrying its encoded payload, ready for the
/// engine.
enum ApplyOp<K> {
    Add { key: K, payload: Bytes },
    Update { key: K, payload: Bytes },
    Remove { key: K },
}

/// Manual-reset drain event for one stage: set while the stage is empty.
struct DrainGate {
    count: Mutex<usize>,
    cv: Condvar,
}

impl DrainGate {
    fn new() -> Self {
        Self {
            count: Mutex::new(0),
            cv: Condvar::new(),
        }
    }

    fn enter(&self) {
        *self.count.lock() += 1;
    }

    fn leave(&self) {
        let mut count = self.count.lock();
        *count -= 1;
        if *count == 0 {
            self.cv.notify_all();
        }
    }

    fn wait_empty(&self) {
        let mut count = self.count.lock();
        while *count != 0 {
            self.cv.wait(&mut count);
        }
    }
}

/// One gate per stage. An entry enters the next stage's gate before it
/// leaves the previous one, so a flush can never slip between stages.
struct StageGates {
    serialization: DrainGate,
    sequencer: DrainGate,
    filesystem: DrainGate,
}

impl StageGates {
    fn new() -> Self {
        Self {
            serialization: DrainGate::new(),
            sequencer: DrainGate::new(),
            filesystem: DrainGate::new(),
        }
    }
}

struct TransformTask<K, V> {
    seq: u64,
    op: WriteOp<K, V>,
}

/// Shared reorder buffer between the transform pool and the sequencer.
/// `None` marks an entry whose encode failed; the sequencer advances past
/// it without touching the file.
type ReorderBuffer<K> = Mutex<BTreeMap<u64, Option<ApplyOp<K>>>>;

pub(crate) struct Pipeline<K, V> {
    submit_tx: Option<Sender<WriteOp<K, V>>>,
    cancel: Arc<AtomicBool>,
    gates: Arc<StageGates>,
    engine: Arc<RecordEngine<K>>,
    threads: Vec<JoinHandle<()>>,
}

impl<K, V> Pipeline<K, V> {
    /// Enqueue an operation. Never blocks on the stream lock; the queues
    /// are unbounded.
    pub fn submit(&self, op: WriteOp<K, V>) -> Result<()> {
        if self.cancel.load(Ordering::Acquire) {
            return Err(CombError::PipelineShutDown);
        }
        let tx = self.submit_tx.as_ref().ok_or(CombError::PipelineShutDown)?;
        self.gates.serialization.enter();
        if tx.send(op).is_err() {
            self.gates.serialization.leave();
            return Err(CombError::PipelineShutDown);
        }
        Ok(())
    }

    /// Wait until every stage has drained, in stage order, then flush the
    /// underlying file stream.
    pub fn flush(&self) -> Result<()> {
        self.gates.serialization.wait_empty();
        self.gates.sequencer.wait_empty();
        self.gates.filesystem.wait_empty();
        self.engine.flush_file()
    }

    /// Stop the pipeline. With `discard` set, in-flight entries are dropped
    /// without reaching the file; otherwise the stages run dry first.
    pub fn shutdown(&mut self, discard: bool) {
        if discard {
            self.cancel.store(true, Ordering::Release);
        }
        self.submit_tx.take();
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }
}

impl<K, V> Pipeline<K, V>
where
    K: Ord + Clone + Serialize + Send + Sync + 'static,
    V: Serialize + Send + 'static,
{
    pub fn start(
        mode: BufferMode,
        engine: Arc<RecordEngine<K>>,
        codec: Arc<Codec>,
        stats: Arc<Statistics>,
        max_parallelism: usize,
    ) -> Self {
        let cancel = Arc::new(AtomicBool::new(false));
        let gates = Arc::new(StageGates::new());
        let (submit_tx, submit_rx) = unbounded();

        let threads = match mode {
            BufferMode::Buffered => Self::start_buffered(
                submit_rx,
                engine.clone(),
                codec,
                stats,
                cancel.clone(),
                gates.clone(),
            ),
            BufferMode::ParallelBuffered => Self::start_parallel(
                submit_rx,
                engine.clone(),
                codec,
                stats,
                cancel.clone(),
                gates.clone(),
                max_parallelism,
            ),
            BufferMode::Disabled => Vec::new(),
        };

        Self {
            submit_tx: Some(submit_tx),
            cancel,
            gates,
            engine,
            threads,
        }
    }

    // ---------------------------------------------------------------
    // Buffered: one worker drains the queue and drives the engine.
    // ---------------------------------------------------------------
    fn start_buffered(
        submit_rx: Receiver<WriteOp<K, V>>,
        engine: Arc<RecordEngine<K>>,
        codec: Arc<Codec>,
        stats: Arc<Statistics>,
        cancel: Arc<AtomicBool>,
        gates: Arc<StageGates>,
    ) -> Vec<JoinHandle<()>> {
        let worker = thread::Builder::new()
            .name("comb-fs".into())
            .spawn(move || {
                while let Ok(op) = submit_rx.recv() {
                    if cancel.load(Ordering::Acquire) {
                        gates.serialization.leave();
                        continue;
                    }
                    apply_write(&engine, &codec, &stats, op);
                    gates.serialization.leave();
                }
                debug!("buffered writer exiting");
            })
            .expect("spawn comb-fs worker");
        vec![worker]
    }

    // ---------------------------------------------------------------
    // ParallelBuffered: dispatcher → transform pool → sequencer → fs.
    // ---------------------------------------------------------------
    fn start_parallel(
        submit_rx: Receiver<WriteOp<K, V>>,
        engine: Arc<RecordEngine<K>>,
        codec: Arc<Codec>,
        stats: Arc<Statistics>,
        cancel: Arc<AtomicBool>,
        gates: Arc<StageGates>,
        max_parallelism: usize,
    ) -> Vec<JoinHandle<()>> {
        let workers = max_parallelism.clamp(1, crate::constants::MAX_TRANSFORM_WORKERS);
        let mut threads = Vec::with_capacity(workers + 3);

        let (pool_tx, pool_rx) = unbounded::<TransformTask<K, V>>();
        let (notify_tx, notify_rx) = unbounded::<()>();
        let (fs_tx, fs_rx) = unbounded::<ApplyOp<K>>();
        let reorder: Arc<ReorderBuffer<K>> = Arc::new(Mutex::new(BTreeMap::new()));

        // Dispatcher: assigns sequence ids in dequeue order, which is the
        // producers' FIFO enqueue order.
        {
            let cancel = cancel.clone();
            let gates = gates.clone();
            let handle = thread::Builder::new()
                .name("comb-dispatch".into())
                .spawn(move || {
                    let mut next_seq = 1u64;
                    while let Ok(op) = submit_rx.recv() {
                        if cancel.load(Ordering::Acquire) {
                            // Discarded before it ever left the first stage.
                            drop(op);
                            gates.serialization.leave();
                            continue;
                        }
                        let task = TransformTask { seq: next_seq, op };
                        next_seq += 1;
                        if pool_tx.send(task).is_err() {
                            gates.serialization.leave();
                            break;
                        }
                    }
                    debug!("dispatcher exiting");
                })
                .expect("spawn comb-dispatch");
            threads.push(handle);
        }

        // Transform pool: encode in parallel, deposit out of order.
        for worker_id in 0..workers {
            let pool_rx = pool_rx.clone();
            let notify_tx = notify_tx.clone();
            let reorder = reorder.clone();
            let codec = codec.clone();
            let stats = stats.clone();
            let cancel = cancel.clone();
            let gates = gates.clone();
            let handle = thread::Builder::new()
                .name(format!("comb-xform-{worker_id}"))
                .spawn(move || {
                    while let Ok(task) = pool_rx.recv() {
                        if cancel.load(Ordering::Acquire) {
                            gates.serialization.leave();
                            continue;
                        }
                        let entry = transform(&codec, &stats, task.op);
                        reorder.lock().insert(task.seq, entry);
                        gates.sequencer.enter();
                        gates.serialization.leave();
                        let _ = notify_tx.send(());
                    }
                })
                .expect("spawn comb-xform");
            threads.push(handle);
        }
        drop(pool_rx);
        drop(notify_tx);

        // Sequencer: single thread restoring submission order.
        {
            let reorder = reorder.clone();
            let gates = gates.clone();
            let cancel = cancel.clone();
            let handle = thread::Builder::new()
                .name("comb-sequence".into())
                .spawn(move || {
                    let mut next_expected = 1u64;
                    while notify_rx.recv().is_ok() {
                        loop {
                            let entry = {
                                let mut buffer = reorder.lock();
                                match buffer.remove(&next_expected) {
                                    Some(entry) => entry,
                                    None => break,
                                }
                            };
                            next_expected += 1;
                            match entry {
                                Some(op) if !cancel.load(Ordering::Acquire) => {
                                    gates.filesystem.enter();
                                    gates.sequencer.leave();
                                    if fs_tx.send(op).is_err() {
                                        gates.filesystem.leave();
                                        return;
                                    }
                                }
                                _ => gates.sequencer.leave(),
                            }
                        }
                    }
                    debug!("sequencer exiting");
                })
                .expect("spawn comb-sequence");
            threads.push(handle);
        }

        // File-system worker: the only thread that touches the engine.
        {
            let handle = thread::Builder::new()
                .name("comb-fs".into())
                .spawn(move || {
                    while let Ok(op) = fs_rx.recv() {
                        if !cancel.load(Ordering::Acquire) {
                            apply_encoded(&engine, &stats, op);
                        }
                        gates.filesystem.leave();
                    }
                    debug!("fs worker exiting");
                })
                .expect("spawn comb-fs");
            threads.push(handle);
        }

        threads
    }
}

impl<K, V> Drop for Pipeline<K, V> {
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::Release);
        self.submit_tx.take();
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }
}

/// Run the codec stage for one operation. `None` means the entry is a
/// placeholder the sequencer must skip (encode failed).
fn transform<K, V>(codec: &Codec, stats: &Statistics, op: WriteOp<K, V>) -> Option<ApplyOp<K>>
where
    K: Serialize,
    V: Serialize,
{
    match op {
        WriteOp::Add { key, value } => match codec.encode(&key, &value) {
            Ok(payload) => Some(ApplyOp::Add {
                key,
                payload: Bytes::from(payload),
            }),
            Err(e) => {
                stats.record_encode_failure();
                warn!(error = %e, "dropping add: encode failed");
                None
            }
        },
        WriteOp::Update { key, value } => match codec.encode(&key, &value) {
            Ok(payload) => Some(ApplyOp::Update {
                key,
                payload: Bytes::from(payload),
            }),
            Err(e) => {
                stats.record_encode_failure();
                warn!(error = %e, "dropping update: encode failed");
                None
            }
        },
        WriteOp::Remove { key } => Some(ApplyOp::Remove { key }),
    }
}

/// Buffered-mode application: encode inline, then drive the engine.
fn apply_write<K, V>(
    engine: &RecordEngine<K>,
    codec: &Codec,
    stats: &Statistics,
    op: WriteOp<K, V>,
) where
    K: Ord + Clone + Serialize,
    V: Serialize,
{
    if let Some(encoded) = transform(codec, stats, op) {
        apply_encoded(engine, stats, encoded);
    }
}

/// Apply a pre-encoded operation to the engine; the engine does not
/// re-encode.
fn apply_encoded<K>(engine: &RecordEngine<K>, stats: &Statistics, op: ApplyOp<K>)
where
    K: Ord + Clone,
{
    let result = match op {
        ApplyOp::Add { key, payload } => engine.add(key, &payload),
        ApplyOp::Update { key, payload } => engine.update(key, &payload),
        ApplyOp::Remove { key } => engine.remove(&key).map(|_| ()),
    };
    match result {
        Ok(()) => stats.record_applied(),
        Err(e) => {
            stats.record_write_failure();
            warn!(error = %e, "write failed at the file");
        }
    }
}
