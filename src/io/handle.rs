//! The zero-copy handshake.
//!
//! Four phases per operation, symmetric for update and fetch except for
//! data direction:
//!
//! ```text
//! begin ──> prepare_buffers ──> caller reads/writes region ──> commit ──> end
//!   │                                                                     │
//!   └──────────────── any phase may fail; end still runs ─────────────────┘
//! ```
//!
//! `begin` stages the operation and pins one engine staging buffer to
//! the returned [`IoHandle`]. `prepare_buffers` exposes the staged
//! region (exactly one scatter-gather entry) for direct access.
//! `commit` finalizes the transfer, and `end` must follow exactly once
//! on every exit path, carrying the caller's accumulated status: an
//! update publishes only when that status is `Ok`, and the staged buffer
//! is released either way. Ending is enforced structurally: consuming
//! `end` can't run twice, and a handle dropped without `end` still
//! releases its buffer (with a warning, since that is a protocol
//! violation by the caller).

use std::sync::Arc;

use eyre::Result;
use tracing::warn;

use super::staging::{StagedBuf, StagingPool};
use super::IoDescriptor;
use crate::error::invalid_arg;
use crate::store::container::ContainerShared;
use crate::store::{Epoch, KeyCodec, ObjectAddr};

/// Direction of a staged operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoDir {
    Update,
    Fetch,
}

/// A staged zero-copy operation. Must be passed to exactly one of
/// [`crate::Engine::update_end`] / [`crate::Engine::fetch_end`].
pub struct IoHandle {
    dir: IoDir,
    container: Arc<ContainerShared>,
    codec: KeyCodec,
    addr: ObjectAddr,
    epoch: Epoch,
    desc: IoDescriptor,
    staged: StagedBuf,
    staged_len: usize,
    prepared: bool,
    committed: bool,
    ended: bool,
}

pub(crate) fn begin(
    dir: IoDir,
    container: Arc<ContainerShared>,
    staging: &StagingPool,
    codec: KeyCodec,
    addr: ObjectAddr,
    epoch: Epoch,
    desc: &IoDescriptor,
) -> Result<IoHandle> {
    codec.validate("dataset-key", &desc.dkey)?;
    codec.validate("attribute-key", &desc.akey)?;

    let len = desc.spec.transfer_len() as usize;
    if len == 0 {
        return Err(invalid_arg("record spec has zero transfer length"));
    }
    let staged = staging.acquire(len)?;

    Ok(IoHandle {
        dir,
        container,
        codec,
        addr,
        epoch,
        desc: desc.clone(),
        staged,
        staged_len: 0,
        prepared: false,
        committed: false,
        ended: false,
    })
}

impl IoHandle {
    pub fn dir(&self) -> IoDir {
        self.dir
    }

    /// Map the staged region for direct access: the caller writes it for
    /// an update, reads it for a fetch. One scatter-gather entry only,
    /// and only once per handle.
    ///
    /// For a fetch the region holds the visible version's bytes; an
    /// empty region means no version is visible, which is a normal
    /// outcome.
    pub fn prepare_buffers(&mut self) -> Result<&mut [u8]> {
        if self.prepared {
            return Err(invalid_arg("buffers already prepared for this handle"));
        }

        match self.dir {
            IoDir::Update => {
                self.staged_len = self.desc.spec.transfer_len() as usize;
            }
            IoDir::Fetch => {
                let len = self.desc.spec.transfer_len() as usize;
                self.staged_len = self.container.read_into(
                    self.codec,
                    self.addr,
                    &self.desc,
                    self.epoch,
                    &mut self.staged[..len],
                )?;
            }
        }

        self.prepared = true;
        Ok(&mut self.staged[..self.staged_len])
    }

    /// Finalize the staged transfer. Must follow `prepare_buffers`.
    pub fn commit(&mut self) -> Result<()> {
        if !self.prepared {
            return Err(invalid_arg("commit before prepare_buffers"));
        }
        if self.committed {
            return Err(invalid_arg("handle already committed"));
        }
        self.committed = true;
        Ok(())
    }
}

/// Close out the handshake, threading the caller's accumulated status
/// through. A successful update publishes the staged bytes at the
/// handle's epoch; everything else only releases resources. Returns the
/// status that was passed in (or the publish failure).
pub(crate) fn end(mut handle: IoHandle, status: Result<()>) -> Result<()> {
    handle.ended = true;

    if status.is_ok() && handle.dir == IoDir::Update {
        if !handle.committed {
            return Err(invalid_arg("update ended as successful without commit"));
        }
        handle.container.publish(
            handle.codec,
            handle.addr,
            &handle.desc,
            handle.epoch,
            &handle.staged[..handle.staged_len],
        )?;
    }

    status
}

impl Drop for IoHandle {
    fn drop(&mut self) {
        if !self.ended {
            warn!(
                dir = ?self.dir,
                "i/o handle dropped without its end call; staged buffer released"
            );
        }
    }
}
