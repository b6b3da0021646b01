use crate::utils::pool::BufferPool;

#[test]
fn test_acquire_has_capacity() {
    let pool = BufferPool::new();
    let buf = pool.acquire(1000);
    assert!(buf.capacity() >= 1000);
    assert!(buf.is_empty());
}

#[test]
fn test_release_then_reuse() {
    let pool = BufferPool::new();

    let mut buf = pool.acquire(512);
    buf.extend_from_slice(&[1, 2, 3]);
    pool.release(buf);

    assert_eq!(pool.retained(), 1);

    // Comes back cleared.
    let buf = pool.acquire(512);
    assert!(buf.is_empty());
    assert_eq!(pool.retained(), 0);
}

#[test]
fn test_oversized_buffers_not_retained() {
    let pool = BufferPool::new();
    // Just past the largest size class.
    pool.release(Vec::with_capacity(1024 * 1024));
    assert_eq!(pool.retained(), 0);
}

#[test]
fn test_clear() {
    let pool = BufferPool::new();
    for _ in 0..8 {
        pool.release(Vec::with_capacity(256));
    }
    assert_eq!(pool.retained(), 8);

    pool.clear();
    assert_eq!(pool.retained(), 0);
}

#[test]
fn test_concurrent_acquire_release() {
    use std::sync::Arc;
    use std::thread;

    let pool = Arc::new(BufferPool::new());
    let mut handles = vec![];

    for _ in 0..4 {
        let pool = Arc::clone(&pool);
        handles.push(thread::spawn(move || {
            for i in 0..1000usize {
                let mut buf = pool.acquire(i % 4096 + 1);
                buf.push(1);
                pool.release(buf);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
}
