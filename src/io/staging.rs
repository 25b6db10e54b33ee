//! Engine-owned staging buffers.
//!
//! A bounded pool of pre-allocated buffers that back the zero-copy
//! handshake. Every live [`crate::IoHandle`] holds exactly one staged
//! buffer; the buffer returns to the pool when the handle ends (or is
//! dropped), so pool occupancy mirrors outstanding handles. The pool is
//! deliberately bounded: exhaustion means handles are being leaked or
//! held across too many concurrent handshakes, and `acquire` fails
//! instead of allocating.

use std::mem::ManuallyDrop;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use eyre::Result;
use parking_lot::Mutex;

use crate::error::{invalid_arg, io_failure};

#[derive(Clone)]
pub(crate) struct StagingPool {
    inner: Arc<StagingPoolInner>,
}

#[derive(Debug)]
struct StagingPoolInner {
    bufs: Mutex<Vec<Box<[u8]>>>,
    buf_size: usize,
}

impl StagingPool {
    pub(crate) fn new(count: usize, buf_size: usize) -> Self {
        let bufs = (0..count)
            .map(|_| vec![0u8; buf_size].into_boxed_slice())
            .collect();
        Self {
            inner: Arc::new(StagingPoolInner {
                bufs: Mutex::new(bufs),
                buf_size,
            }),
        }
    }

    /// Take one buffer for a transfer of `len` bytes. The buffer comes
    /// back zeroed up to `len`.
    pub(crate) fn acquire(&self, len: usize) -> Result<StagedBuf> {
        if len > self.inner.buf_size {
            return Err(invalid_arg(format!(
                "record of {len} bytes exceeds staging buffer size {}",
                self.inner.buf_size
            )));
        }

        let Some(mut buf) = self.inner.bufs.lock().pop() else {
            return Err(io_failure("staging buffer pool exhausted"));
        };
        buf[..len].fill(0);

        Ok(StagedBuf {
            buf: ManuallyDrop::new(buf),
            pool: Arc::clone(&self.inner),
        })
    }

    /// Buffers currently free.
    pub(crate) fn available(&self) -> usize {
        self.inner.bufs.lock().len()
    }
}

/// A staging buffer on loan from the pool; returns itself on drop.
#[derive(Debug)]
pub(crate) struct StagedBuf {
    buf: ManuallyDrop<Box<[u8]>>,
    pool: Arc<StagingPoolInner>,
}

impl Deref for StagedBuf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf
    }
}

impl DerefMut for StagedBuf {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.buf
    }
}

impl Drop for StagedBuf {
    fn drop(&mut self) {
        // SAFETY: take() runs once, here; the buffer is valid until
        // drop and is not touched afterwards.
        let buf = unsafe { ManuallyDrop::take(&mut self.buf) };
        self.pool.bufs.lock().push(buf);
    }
}
