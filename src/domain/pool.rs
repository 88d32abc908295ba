//! Fixed-size byte buffers shared by relay copy loops.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};

pub const DEFAULT_BUFFER_SIZE: usize = 1024;
pub const DEFAULT_POOL_CAPACITY: usize = 64;

struct PoolInner {
    buffer_size: usize,
    capacity: usize,
    free: Mutex<Vec<Box<[u8]>>>,
}

impl PoolInner {
    fn put(&self, buf: Box<[u8]>) {
        let mut free = self.free.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if free.len() < self.capacity {
            free.push(buf);
        }
    }
}

/// A bounded free list of equally sized buffers.
///
/// Checked-out buffers go back to the pool when their guard is dropped. When
/// the pool already holds `capacity` idle buffers the returned one is freed.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

impl BufferPool {
    pub fn new(buffer_size: usize, capacity: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                buffer_size: buffer_size.max(1),
                capacity,
                free: Mutex::new(Vec::with_capacity(capacity)),
            }),
        }
    }

    pub fn get(&self) -> PooledBuffer {
        let recycled = {
            let mut free = self.inner.free.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            free.pop()
        };
        let buf = recycled.unwrap_or_else(|| vec![0u8; self.inner.buffer_size].into_boxed_slice());
        PooledBuffer {
            buf: Some(buf),
            pool: self.inner.clone(),
        }
    }

    pub fn buffer_size(&self) -> usize {
        self.inner.buffer_size
    }

    /// Number of buffers currently waiting in the pool.
    pub fn idle(&self) -> usize {
        self.inner.free.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE, DEFAULT_POOL_CAPACITY)
    }
}

/// RAII guard over a buffer checked out of a [`BufferPool`].
pub struct PooledBuffer {
    buf: Option<Box<[u8]>>,
    pool: Arc<PoolInner>,
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.buf.as_deref().unwrap_or(&[])
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.buf.as_deref_mut().unwrap_or(&mut [])
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.put(buf);
        }
    }
}
