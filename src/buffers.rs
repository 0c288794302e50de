use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::Mutex;

use num_traits::Zero;
use once_cell::sync::Lazy;

use crate::Vector3D;

/// Free lists of reusable buffers for one element type, keyed by the
/// requested buffer length.
struct FreeLists<T> {
    slots: Mutex<HashMap<usize, Vec<Vec<T>>>>,
}

impl<T: Clone + Zero + Send> FreeLists<T> {
    fn new() -> FreeLists<T> {
        FreeLists {
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn acquire(&self, len: usize) -> Vec<T> {
        let mut slots = self.slots.lock().expect("poisoned buffer pool lock");
        if let Some(buffer) = slots.get_mut(&len).and_then(Vec::pop) {
            return buffer;
        }
        drop(slots);

        log::debug!("buffer pool is allocating a new buffer with {} elements", len);
        return vec![T::zero(); len];
    }

    fn release(&self, len: usize, buffer: Vec<T>) {
        let mut slots = self.slots.lock().expect("poisoned buffer pool lock");
        slots.entry(len).or_default().push(buffer);
    }
}

/// A process-wide provider of reusable backing storage, avoiding repeated
/// allocations inside evaluation loops.
///
/// Buffers are keyed by element type and length, and handed out as
/// [`PoolGuard`] values which return their storage to the pool when dropped.
/// This makes the acquire/release pairing hold on every exit path, including
/// error propagation; use-after-release is not representable.
///
/// The pool is internally synchronized, so a single instance (usually
/// [`BufferPool::global`]) can be shared between threads. Callers wanting to
/// avoid lock contention can create one pool per thread with
/// [`BufferPool::new`] instead.
pub struct BufferPool {
    scalars: FreeLists<f64>,
    vectors: FreeLists<Vector3D>,
}

static GLOBAL_POOL: Lazy<BufferPool> = Lazy::new(BufferPool::new);

impl BufferPool {
    /// Create a new, empty buffer pool
    pub fn new() -> BufferPool {
        BufferPool {
            scalars: FreeLists::new(),
            vectors: FreeLists::new(),
        }
    }

    /// Get the process-wide shared buffer pool
    pub fn global() -> &'static BufferPool {
        &GLOBAL_POOL
    }

    /// Acquire a buffer of exactly `len` scalars from this pool.
    ///
    /// The content of a reused buffer is unspecified, callers must overwrite
    /// it before reading.
    pub fn acquire_scalars(&self, len: usize) -> PoolGuard<'_, f64> {
        PoolGuard {
            lists: &self.scalars,
            len: len,
            data: Some(self.scalars.acquire(len)),
        }
    }

    /// Acquire a buffer of exactly `len` 3D vectors from this pool, with the
    /// same reuse semantics as [`BufferPool::acquire_scalars`]
    pub fn acquire_vectors(&self, len: usize) -> PoolGuard<'_, Vector3D> {
        PoolGuard {
            lists: &self.vectors,
            len: len,
            data: Some(self.vectors.acquire(len)),
        }
    }
}

impl Default for BufferPool {
    fn default() -> BufferPool {
        BufferPool::new()
    }
}

/// Scoped borrow of a buffer owned by a [`BufferPool`], dereferencing to a
/// `[T]` slice. Dropping the guard releases the buffer back to the pool.
pub struct PoolGuard<'a, T: Clone + Zero + Send> {
    lists: &'a FreeLists<T>,
    len: usize,
    data: Option<Vec<T>>,
}

impl<T: Clone + Zero + Send> PoolGuard<'_, T> {
    /// Set every element of this buffer to zero
    pub fn fill_zero(&mut self) {
        for value in self.iter_mut() {
            *value = T::zero();
        }
    }
}

impl<T: Clone + Zero + Send> Deref for PoolGuard<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.data.as_ref().expect("buffer was already released")
    }
}

impl<T: Clone + Zero + Send> DerefMut for PoolGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        self.data.as_mut().expect("buffer was already released")
    }
}

impl<T: Clone + Zero + Send> Drop for PoolGuard<'_, T> {
    fn drop(&mut self) {
        if let Some(buffer) = self.data.take() {
            self.lists.release(self.len, buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_and_release() {
        let pool = BufferPool::new();

        let mut buffer = pool.acquire_scalars(16);
        assert_eq!(buffer.len(), 16);
        assert!(buffer.iter().all(|&v| v == 0.0));

        buffer[3] = 42.0;
        drop(buffer);

        // the released buffer is reused, stale content included
        let reused = pool.acquire_scalars(16);
        assert_eq!(reused[3], 42.0);
    }

    #[test]
    fn separate_size_classes() {
        let pool = BufferPool::new();

        let mut small = pool.acquire_scalars(4);
        small[0] = 1.0;
        drop(small);

        let large = pool.acquire_scalars(8);
        assert_eq!(large.len(), 8);
        assert!(large.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn no_aliasing_between_live_guards() {
        let pool = BufferPool::new();

        let mut first = pool.acquire_scalars(4);
        let mut second = pool.acquire_scalars(4);

        first[0] = 1.0;
        second[0] = 2.0;
        assert_eq!(first[0], 1.0);
        assert_eq!(second[0], 2.0);
    }

    #[test]
    fn vector_buffers() {
        let pool = BufferPool::new();

        let mut buffer = pool.acquire_vectors(3);
        assert_eq!(buffer.len(), 3);
        buffer[1] = Vector3D::new(1.0, 2.0, 3.0);
        assert_eq!(buffer[1].y, 2.0);
    }

    #[test]
    fn fill_zero() {
        let pool = BufferPool::new();

        let mut buffer = pool.acquire_scalars(4);
        buffer[2] = 7.0;
        drop(buffer);

        let mut reused = pool.acquire_scalars(4);
        reused.fill_zero();
        assert!(reused.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn global_pool() {
        let buffer = BufferPool::global().acquire_scalars(12);
        assert_eq!(buffer.len(), 12);
    }
}
