//! Process-wide buffer pools for hot-path allocations.
//!
//! Three pools exist: byte buffers used by the I/O layer, u64 arrays used
//! for string offsets and lengths, and decompression outputs. A pool hands
//! out [`PooledBuffer`] guards; dropping a guard clears the buffer and
//! shelves its storage for reuse. Pools initialise lazily and need no
//! teardown.

use std::sync::Mutex;

/// A shelf of reusable `Vec<T>` storage.
pub struct BufferPool<T> {
    shelves: Mutex<Vec<Vec<T>>>,
    max_retained: usize,
}

impl<T> BufferPool<T> {
    /// Create an empty pool that retains at most `max_retained` buffers.
    pub const fn new(max_retained: usize) -> Self {
        Self { shelves: Mutex::new(Vec::new()), max_retained }
    }

    /// Take a buffer with at least `min_capacity` capacity, reusing shelved
    /// storage when available.
    pub fn acquire(&'static self, min_capacity: usize) -> PooledBuffer<T> {
        let mut shelves = self.shelves.lock().expect("buffer pool poisoned");
        let mut buf = shelves.pop().unwrap_or_default();
        drop(shelves);

        if buf.capacity() < min_capacity {
            buf.reserve(min_capacity - buf.len());
        }

        PooledBuffer { buf: Some(buf), pool: self }
    }

    fn release(&self, mut buf: Vec<T>) {
        buf.clear();
        let mut shelves = self.shelves.lock().expect("buffer pool poisoned");
        if shelves.len() < self.max_retained {
            shelves.push(buf);
        }
    }

    /// Number of currently shelved buffers.
    pub fn shelved(&self) -> usize {
        self.shelves.lock().expect("buffer pool poisoned").len()
    }
}

/// Scoped ownership of a pooled `Vec<T>`. Dereferences to the vector;
/// returns the storage to its pool on drop, on every exit path.
pub struct PooledBuffer<T: 'static> {
    buf: Option<Vec<T>>,
    pool: &'static BufferPool<T>,
}

impl<T> std::ops::Deref for PooledBuffer<T> {
    type Target = Vec<T>;

    fn deref(&self) -> &Vec<T> {
        self.buf.as_ref().expect("pooled buffer already released")
    }
}

impl<T> std::ops::DerefMut for PooledBuffer<T> {
    fn deref_mut(&mut self) -> &mut Vec<T> {
        self.buf.as_mut().expect("pooled buffer already released")
    }
}

impl<T> Drop for PooledBuffer<T> {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.release(buf);
        }
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for PooledBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.buf.fmt(f)
    }
}

static BYTE_POOL: BufferPool<u8> = BufferPool::new(64);
static OFFSET_POOL: BufferPool<u64> = BufferPool::new(64);
static DECOMPRESS_POOL: BufferPool<u8> = BufferPool::new(16);

/// Acquire a byte buffer from the shared I/O pool.
pub fn byte_buffer(min_capacity: usize) -> PooledBuffer<u8> {
    BYTE_POOL.acquire(min_capacity)
}

/// Acquire a u64 array from the shared offset/length pool.
pub fn offset_buffer(min_capacity: usize) -> PooledBuffer<u64> {
    OFFSET_POOL.acquire(min_capacity)
}

/// Acquire a byte buffer from the shared decompression-output pool.
pub fn decompress_buffer(min_capacity: usize) -> PooledBuffer<u8> {
    DECOMPRESS_POOL.acquire(min_capacity)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Tests use their own pool instance rather than the process-wide ones,
    // so assertions on shelf counts are not racy across the test binary.
    static TEST_POOL: BufferPool<u8> = BufferPool::new(2);

    #[test]
    fn acquire_release_cycle() {
        let mut a = TEST_POOL.acquire(16);
        a.extend_from_slice(b"hello");
        assert_eq!(&a[..], b"hello");
        drop(a);

        let b = TEST_POOL.acquire(1);
        assert!(b.is_empty(), "reused buffer must come back cleared");
        assert!(b.capacity() >= 1);
    }

    #[test]
    fn retention_is_bounded() {
        static SMALL_POOL: BufferPool<u64> = BufferPool::new(1);

        let a = SMALL_POOL.acquire(8);
        let b = SMALL_POOL.acquire(8);
        drop(a);
        drop(b);

        assert_eq!(SMALL_POOL.shelved(), 1);
    }

    #[test]
    fn shared_pools_hand_out_capacity() {
        let bytes = byte_buffer(1024);
        assert!(bytes.capacity() >= 1024);

        let offsets = offset_buffer(128);
        assert!(offsets.capacity() >= 128);

        let out = decompress_buffer(4096);
        assert!(out.capacity() >= 4096);
    }
}
