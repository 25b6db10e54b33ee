//! # Update/Fetch I/O Paths
//!
//! Two shapes for moving record bytes between a caller and the engine,
//! selected by [`crate::config::IoPath`]:
//!
//! - **Copying**: one call; the engine copies between the caller's
//!   scatter-gather regions and its storage synchronously. The
//!   correctness baseline.
//! - **Zero-copy**: the begin/prepare/commit/end handshake in
//!   [`handle`], exposing engine staging buffers directly.
//!
//! Both paths address a record by key path (dataset-key, attribute-key),
//! epoch, and a [`RecordSpec`] describing a scalar or a byte-range
//! extent. [`run_update`] / [`run_fetch`] drive a whole operation over
//! either path; they are self-contained so the dispatcher can run them
//! on the cooperative worker unchanged.

pub(crate) mod handle;
pub(crate) mod staging;

use std::sync::Arc;

use eyre::Result;
use smallvec::SmallVec;

pub use handle::{IoDir, IoHandle};

use crate::config::IoPath;
use crate::store::container::ContainerShared;
use crate::store::{Epoch, KeyBuf, KeyCodec, ObjectAddr};
use staging::StagingPool;

/// Shape of a record transfer: a scalar value or an extent within an
/// attribute's byte-range value space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordSpec {
    Single { size: u32 },
    Extent { offset: u64, len: u32 },
}

impl RecordSpec {
    /// Bytes moved by an operation with this spec.
    pub fn transfer_len(&self) -> u32 {
        match *self {
            RecordSpec::Single { size } => size,
            RecordSpec::Extent { len, .. } => len,
        }
    }
}

/// Key path and record shape of one update or fetch.
#[derive(Debug, Clone)]
pub struct IoDescriptor {
    pub dkey: KeyBuf,
    pub akey: KeyBuf,
    pub spec: RecordSpec,
}

/// Caller-owned source regions for an update.
#[derive(Default)]
pub struct SgList<'a> {
    regions: SmallVec<[&'a [u8]; 2]>,
}

impl<'a> SgList<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(region: &'a [u8]) -> Self {
        let mut sgl = Self::new();
        sgl.push(region);
        sgl
    }

    pub fn push(&mut self, region: &'a [u8]) {
        self.regions.push(region);
    }

    pub fn regions(&self) -> &[&'a [u8]] {
        &self.regions
    }

    pub fn total_len(&self) -> usize {
        self.regions.iter().map(|r| r.len()).sum()
    }

    pub(crate) fn gather(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.total_len());
        for region in &self.regions {
            out.extend_from_slice(region);
        }
        out
    }
}

/// Caller-owned destination regions for a fetch.
#[derive(Default)]
pub struct SgListMut<'a> {
    regions: SmallVec<[&'a mut [u8]; 2]>,
}

impl<'a> SgListMut<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(region: &'a mut [u8]) -> Self {
        let mut sgl = Self::new();
        sgl.push(region);
        sgl
    }

    pub fn push(&mut self, region: &'a mut [u8]) {
        self.regions.push(region);
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    pub fn total_len(&self) -> usize {
        self.regions.iter().map(|r| r.len()).sum()
    }

    /// Spread `data` across the regions in order; returns bytes placed.
    pub(crate) fn scatter(&mut self, data: &[u8]) -> usize {
        let mut placed = 0;
        for region in self.regions.iter_mut() {
            if placed == data.len() {
                break;
            }
            let n = region.len().min(data.len() - placed);
            region[..n].copy_from_slice(&data[placed..placed + n]);
            placed += n;
        }
        placed
    }
}

/// One whole update over the configured path.
pub(crate) fn run_update(
    container: Arc<ContainerShared>,
    staging: StagingPool,
    codec: KeyCodec,
    io_path: IoPath,
    addr: ObjectAddr,
    epoch: Epoch,
    desc: IoDescriptor,
    data: Vec<u8>,
) -> Result<()> {
    match io_path {
        IoPath::Copying => {
            codec.validate("dataset-key", &desc.dkey)?;
            codec.validate("attribute-key", &desc.akey)?;
            container.publish(codec, addr, &desc, epoch, &data)
        }
        IoPath::ZeroCopy => {
            let mut h = handle::begin(
                IoDir::Update,
                container,
                &staging,
                codec,
                addr,
                epoch,
                &desc,
            )?;
            let staged = (|| -> Result<()> {
                let region = h.prepare_buffers()?;
                region.copy_from_slice(&data);
                h.commit()
            })();
            handle::end(h, staged)
        }
    }
}

/// One whole fetch over the configured path. Returns the visible bytes,
/// empty when no version is visible.
pub(crate) fn run_fetch(
    container: Arc<ContainerShared>,
    staging: StagingPool,
    codec: KeyCodec,
    io_path: IoPath,
    addr: ObjectAddr,
    epoch: Epoch,
    desc: IoDescriptor,
) -> Result<Vec<u8>> {
    match io_path {
        IoPath::Copying => {
            codec.validate("dataset-key", &desc.dkey)?;
            codec.validate("attribute-key", &desc.akey)?;
            let mut out = vec![0u8; desc.spec.transfer_len() as usize];
            let n = container.read_into(codec, addr, &desc, epoch, &mut out)?;
            out.truncate(n);
            Ok(out)
        }
        IoPath::ZeroCopy => {
            let mut h = handle::begin(
                IoDir::Fetch,
                container,
                &staging,
                codec,
                addr,
                epoch,
                &desc,
            )?;
            let mut out = Vec::new();
            let staged = (|| -> Result<()> {
                let region = h.prepare_buffers()?;
                out.extend_from_slice(region);
                h.commit()
            })();
            handle::end(h, staged)?;
            Ok(out)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sglist_gathers_regions_in_order() {
        let mut sgl = SgList::new();
        sgl.push(b"hel");
        sgl.push(b"lo");
        assert_eq!(sgl.total_len(), 5);
        assert_eq!(sgl.gather(), b"hello");
    }

    #[test]
    fn sglist_mut_scatters_across_regions() {
        let mut a = [0u8; 3];
        let mut b = [0u8; 4];
        let mut sgl = SgListMut::new();
        sgl.push(&mut a);
        sgl.push(&mut b);

        let placed = sgl.scatter(b"abcdef");
        drop(sgl);
        assert_eq!(placed, 6);
        assert_eq!(&a, b"abc");
        assert_eq!(&b, b"def\0");
    }

    #[test]
    fn record_spec_transfer_lengths() {
        assert_eq!(RecordSpec::Single { size: 16 }.transfer_len(), 16);
        assert_eq!(RecordSpec::Extent { offset: 64, len: 32 }.transfer_len(), 32);
    }
}
