use std::sync::Arc;
use std::thread;

use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use crate::config::{BufferMode, Options};
use crate::constants::HEADER_SIZE;
use crate::core::collection::Collection;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Doc {
    name: String,
}

fn doc(name: &str) -> Doc {
    Doc {
        name: name.to_string(),
    }
}

fn options_with_mode(dir: &TempDir, mode: BufferMode) -> Options {
    Options::builder()
        .base_directory(dir.path())
        .database_name("testdb")
        .buffer_mode(mode)
        .max_parallelism(8)
        .build()
}

fn open_collection(dir: &TempDir, options: Options) -> Collection<u64, Doc> {
    let collection = Collection::new("docs", options);
    collection.load().unwrap();
    collection
}

fn reopen_disabled(dir: &TempDir) -> Collection<u64, Doc> {
    open_collection(dir, options_with_mode(dir, BufferMode::Disabled))
}

#[test]
fn test_buffered_reads_immediately_consistent() {
    let dir = TempDir::new().unwrap();
    let collection = open_collection(&dir, options_with_mode(&dir, BufferMode::Buffered));

    for i in 0..100u64 {
        collection.add(i, doc(&format!("buf-{i}"))).unwrap();
        // Read-after-write on the map is immediate, before any flush.
        assert_eq!(
            collection.try_get(&i).unwrap().unwrap(),
            doc(&format!("buf-{i}"))
        );
    }
    collection.flush().unwrap();
    collection.close().unwrap();

    let reopened = reopen_disabled(&dir);
    assert_eq!(reopened.len(), 100);
}

#[test]
fn test_buffered_matches_synchronous_result() {
    let buffered_dir = TempDir::new().unwrap();
    let disabled_dir = TempDir::new().unwrap();

    let script = |collection: &Collection<u64, Doc>| {
        for i in 0..200u64 {
            collection.add(i, doc(&format!("v{i}"))).unwrap();
        }
        for i in (0..200u64).step_by(2) {
            collection.remove(i).unwrap();
        }
        for i in (1..200u64).step_by(4) {
            collection.update(i, doc(&format!("u{i}"))).unwrap();
        }
    };

    let buffered = open_collection(
        &buffered_dir,
        options_with_mode(&buffered_dir, BufferMode::Buffered),
    );
    script(&buffered);
    buffered.close().unwrap();

    let disabled = open_collection(
        &disabled_dir,
        options_with_mode(&disabled_dir, BufferMode::Disabled),
    );
    script(&disabled);
    disabled.close().unwrap();

    let mut a = reopen_disabled(&buffered_dir).pairs().unwrap();
    let mut b = reopen_disabled(&disabled_dir).pairs().unwrap();
    a.sort_by_key(|(k, _)| *k);
    b.sort_by_key(|(k, _)| *k);
    assert_eq!(a, b);
}

#[test]
fn test_parallel_single_writer_order_preserved() {
    let dir = TempDir::new().unwrap();
    let collection = open_collection(&dir, options_with_mode(&dir, BufferMode::ParallelBuffered));

    // Same key written many times: the last submission must win at the
    // file whatever the transform interleaving was.
    for i in 0..500u64 {
        collection.upsert(1, doc(&format!("version-{i}"))).unwrap();
    }
    collection.add(2, doc("other")).unwrap();
    collection.remove(2).unwrap();
    collection.close().unwrap();

    let reopened = reopen_disabled(&dir);
    assert_eq!(reopened.len(), 1);
    assert_eq!(
        reopened.try_get(&1).unwrap().unwrap(),
        doc("version-499")
    );
    assert!(!reopened.contains(&2).unwrap());
}

#[test]
fn test_parallel_multi_writer_all_records_present() {
    let dir = TempDir::new().unwrap();
    let collection = Arc::new(open_collection(
        &dir,
        options_with_mode(&dir, BufferMode::ParallelBuffered),
    ));

    let threads = 4u64;
    let per_thread = 10_000u64;

    let mut handles = vec![];
    for t in 0..threads {
        let collection = Arc::clone(&collection);
        handles.push(thread::spawn(move || {
            for i in 0..per_thread {
                let key = t * per_thread + i;
                collection.add(key, doc(&format!("t{t}-{i}"))).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    collection.flush().unwrap();
    assert_eq!(collection.len(), (threads * per_thread) as usize);
    collection.close().unwrap();

    let reopened = reopen_disabled(&dir);
    assert_eq!(reopened.len(), (threads * per_thread) as usize);
    for t in 0..threads {
        let key = t * per_thread + 4242;
        assert_eq!(
            reopened.try_get(&key).unwrap().unwrap(),
            doc(&format!("t{t}-4242"))
        );
    }
}

#[test]
fn test_parallel_matches_synchronous_result() {
    let parallel_dir = TempDir::new().unwrap();
    let disabled_dir = TempDir::new().unwrap();

    let script = |collection: &Collection<u64, Doc>| {
        for i in 0..300u64 {
            collection.add(i, doc(&format!("v{i}"))).unwrap();
        }
        for i in (0..300u64).step_by(3) {
            collection.remove(i).unwrap();
        }
        for i in (2..300u64).step_by(3) {
            collection.update(i, doc(&format!("u{i}"))).unwrap();
        }
    };

    let parallel = open_collection(
        &parallel_dir,
        options_with_mode(&parallel_dir, BufferMode::ParallelBuffered),
    );
    script(&parallel);
    parallel.close().unwrap();

    let disabled = open_collection(
        &disabled_dir,
        options_with_mode(&disabled_dir, BufferMode::Disabled),
    );
    script(&disabled);
    disabled.close().unwrap();

    let mut a = reopen_disabled(&parallel_dir).pairs().unwrap();
    let mut b = reopen_disabled(&disabled_dir).pairs().unwrap();
    a.sort_by_key(|(k, _)| *k);
    b.sort_by_key(|(k, _)| *k);
    assert_eq!(a, b);
}

#[test]
fn test_flush_makes_file_visible() {
    let dir = TempDir::new().unwrap();
    let collection = open_collection(&dir, options_with_mode(&dir, BufferMode::ParallelBuffered));

    for i in 0..50u64 {
        collection.add(i, doc(&format!("{i}"))).unwrap();
    }
    collection.flush().unwrap();

    // After a flush every submitted record has hit the file.
    assert!(collection.size_bytes() > HEADER_SIZE as u64);
    let on_disk = std::fs::metadata(collection.file_path()).unwrap().len();
    assert_eq!(on_disk, collection.size_bytes());
}

#[test]
fn test_clear_cancels_pending_writes() {
    let dir = TempDir::new().unwrap();
    let collection = open_collection(&dir, options_with_mode(&dir, BufferMode::ParallelBuffered));

    for i in 0..2000u64 {
        collection.add(i, doc(&format!("pending-{i}"))).unwrap();
    }
    collection.clear().unwrap();

    assert!(collection.is_empty());
    assert_eq!(collection.size_bytes(), HEADER_SIZE as u64);

    // The pipeline restarts cleanly.
    collection.add(9000, doc("after-clear")).unwrap();
    collection.flush().unwrap();
    collection.close().unwrap();

    let reopened = reopen_disabled(&dir);
    assert_eq!(reopened.len(), 1);
    assert_eq!(reopened.try_get(&9000).unwrap().unwrap(), doc("after-clear"));
}

#[test]
fn test_close_drains_pipeline() {
    let dir = TempDir::new().unwrap();
    let collection = open_collection(&dir, options_with_mode(&dir, BufferMode::Buffered));

    for i in 0..500u64 {
        collection.add(i, doc(&format!("drain-{i}"))).unwrap();
    }
    // No explicit flush: close must drain everything.
    collection.close().unwrap();

    let reopened = reopen_disabled(&dir);
    assert_eq!(reopened.len(), 500);
}
