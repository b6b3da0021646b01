//! # CombDB - Embedded Key-Value Document Store
//!
//! CombDB is an embedded, single-process, thread-safe document store for
//! mixed read/write workloads: game servers, desktop applications, anything
//! that wants many concurrent readers and writers with no external
//! coordination and a small on-disk footprint.
//!
//! ## Features
//!
//! - **One file per collection**: an append-style slot stream with a
//!   fixed 36-byte header; reclaimed slots are reused in place
//! - **Lock-Free Reads**: the in-memory map (DashMap) is authoritative for
//!   `get`/`contains`/iteration; reads never touch the file lock
//! - **Two-Phase Commit**: records are written `Pending` and patched to
//!   `Allocated`, so a crash never leaves a half-committed record visible
//! - **Pipelined Writes**: an optional three-stage write path runs
//!   serialize → compress → encrypt on a bounded worker pool while a
//!   sequencer preserves submission order at the file
//! - **Encryption & Compression**: AES-256-CBC with PBKDF2-derived keys,
//!   and LZ4 block compression inside the binary framings
//! - **Statistics**: per-collection operation and pipeline counters
//!
//! ## Durability
//!
//! CombDB targets process-crash safety, not power-loss safety. The state
//! byte protocol guarantees that on re-open every record is either fully
//! committed or reclaimed as free space; there is no fsync on the write
//! path. Buffered modes trade read-your-writes at the file for latency:
//! the in-memory map is always updated synchronously, so reads are
//! immediately consistent while file visibility is eventual until `flush`.
//!
//! ## Quick Start
//!
//! ```no_run
//! use combdb::{Database, Options};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
//! struct Player {
//!     name: String,
//!     score: u32,
//! }
//!
//! # fn main() -> combdb::Result<()> {
//! let db = Database::open(
//!     Options::builder()
//!         .base_directory("/tmp/comb-demo")
//!         .database_name("demo")
//!         .build(),
//! )?;
//!
//! let players = db.collection::<u64, Player>("players")?;
//! players.add(1, Player { name: "Ada".into(), score: 310 })?;
//! players.add(2, Player { name: "Brin".into(), score: 120 })?;
//!
//! assert_eq!(players.try_get(&1)?.unwrap().name, "Ada");
//! assert_eq!(players.len(), 2);
//!
//! players.flush()?;
//! db.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Buffer Modes
//!
//! | Mode | Write path |
//! |------|-----------|
//! | `Disabled` | every operation hits the file before returning |
//! | `Buffered` | FIFO queue drained by one background worker |
//! | `ParallelBuffered` | bounded transform pool + order-restoring sequencer |
//!
//! In every mode, operations reach the file in submission order; the
//! parallel mode only parallelizes the transformation work.
//!
//! ## Thread Safety
//!
//! All collection operations are thread-safe:
//!
//! ```no_run
//! # use combdb::{Database, Options};
//! # use std::sync::Arc;
//! # use std::thread;
//! # fn main() -> combdb::Result<()> {
//! let db = Database::open(Options::builder().base_directory("/tmp/comb-mt").build())?;
//! let scores = db.collection::<u64, u64>("scores")?;
//!
//! let mut handles = vec![];
//! for worker in 0..8u64 {
//!     let scores = Arc::clone(&scores);
//!     handles.push(thread::spawn(move || {
//!         for i in 0..1000 {
//!             scores.upsert(worker * 1000 + i, i).unwrap();
//!         }
//!     }));
//! }
//! for handle in handles {
//!     handle.join().unwrap();
//! }
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod constants;
pub mod core;
pub mod error;
pub mod pipeline;
pub mod stats;
pub mod storage;
pub mod utils;

pub use config::{BufferMode, KeyDerivation, Options, OptionsBuilder, Serializer};
pub use error::{
    CombError, DuplicateKeyBehavior, FailureBehavior, KeyNotFoundBehavior, Result,
};
pub use stats::{Statistics, StatsSnapshot};

pub use crate::core::collection::Collection;
pub use crate::core::database::Database;

#[cfg(test)]
mod tests;
