//! Containers: an object map plus one value arena.
//!
//! Internals sit behind `parking_lot` locks only so whole operations can
//! be packaged as `'static` tasks for the cooperative worker; the engine
//! still serializes operations, so the locks are uncontended in every
//! supported mode. Lock order is arena before objects, never nested.

use std::cmp::Ordering;

use eyre::Result;
use hashbrown::HashMap;
use parking_lot::RwLock;

use super::arena::ValueArena;
use super::key::KeyCodec;
use super::object::{find_key_row, key_index_or_insert, AkeyNode, DkeyNode, ObjectAddr, ObjectTree};
use super::value::{extent_at, latest_single_in, ExtentVersion, SingleVersion};
use super::{Epoch, EpochRange};
use crate::error::invalid_arg;
use crate::io::{IoDescriptor, RecordSpec};
use crate::sort::{array_sort, ArrayOps};

/// Opaque handle to a container owned by an [`crate::Engine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContainerHandle(pub(crate) u32);

pub(crate) struct ContainerShared {
    pub(crate) objects: RwLock<HashMap<ObjectAddr, ObjectTree>>,
    pub(crate) arena: RwLock<ValueArena>,
}

impl ContainerShared {
    pub(crate) fn create(arena_path: &std::path::Path, initial_pages: u32) -> Result<Self> {
        Ok(Self {
            objects: RwLock::new(HashMap::new()),
            arena: RwLock::new(ValueArena::create(arena_path, initial_pages)?),
        })
    }

    /// Arena remap counter, observed by cursors to detect structural
    /// movement between prepare and probe.
    pub(crate) fn generation(&self) -> u64 {
        self.arena.read().generation()
    }

    pub(crate) fn sync(&self) -> Result<()> {
        self.arena.read().sync()
    }

    /// Make `data` the version of the described record at `epoch`.
    pub(crate) fn publish(
        &self,
        codec: KeyCodec,
        addr: ObjectAddr,
        desc: &IoDescriptor,
        epoch: Epoch,
        data: &[u8],
    ) -> Result<()> {
        if data.len() != desc.spec.transfer_len() as usize {
            return Err(invalid_arg(format!(
                "record data length {} does not match record spec length {}",
                data.len(),
                desc.spec.transfer_len()
            )));
        }

        let slice = self.arena.write().append(data)?;

        let mut objects = self.objects.write();
        let tree = objects.entry(addr).or_default();
        let di = key_index_or_insert(&mut tree.dkeys, codec, &desc.dkey, || {
            DkeyNode::new(desc.dkey.clone())
        });
        let ai = key_index_or_insert(&mut tree.dkeys[di].akeys, codec, &desc.akey, || {
            AkeyNode::new(desc.akey.clone())
        });
        let akey = &mut tree.dkeys[di].akeys[ai];

        match desc.spec {
            RecordSpec::Single { .. } => {
                // One version per epoch; a rewrite at the same epoch
                // replaces the bytes.
                if let Some(v) = akey.singles.iter_mut().find(|v| v.epoch == epoch) {
                    v.slice = slice;
                } else {
                    akey.singles.push(SingleVersion { epoch, slice });
                    let mut ops = SingleRowsMut {
                        rows: akey.singles.as_mut_slice(),
                    };
                    array_sort(&mut ops, false).expect("sort without uniqueness cannot fail");
                }
            }
            RecordSpec::Extent { offset, len } => {
                if let Some(v) = akey
                    .extents
                    .iter_mut()
                    .find(|v| v.offset == offset && v.epoch == epoch)
                {
                    v.len = len;
                    v.slice = slice;
                } else {
                    akey.extents.push(ExtentVersion {
                        offset,
                        len,
                        epoch,
                        slice,
                    });
                    let mut ops = ExtentRowsMut {
                        rows: akey.extents.as_mut_slice(),
                    };
                    array_sort(&mut ops, false).expect("sort without uniqueness cannot fail");
                }
            }
        }
        Ok(())
    }

    /// Copy the version of the described record visible at or before
    /// `epoch` into `out`. Returns the byte count, with 0 meaning no
    /// visible version, a normal outcome rather than an error.
    pub(crate) fn read_into(
        &self,
        codec: KeyCodec,
        addr: ObjectAddr,
        desc: &IoDescriptor,
        epoch: Epoch,
        out: &mut [u8],
    ) -> Result<usize> {
        let objects = self.objects.read();
        let Some(tree) = objects.get(&addr) else {
            return Ok(0);
        };
        let Some(dkey) = find_key_row(&tree.dkeys, codec, &desc.dkey) else {
            return Ok(0);
        };
        let Some(akey) = find_key_row(&dkey.akeys, codec, &desc.akey) else {
            return Ok(0);
        };

        let slice = match desc.spec {
            RecordSpec::Single { .. } => {
                latest_single_in(&akey.singles, EpochRange::up_to(epoch)).map(|v| v.slice)
            }
            RecordSpec::Extent { offset, .. } => {
                extent_at(&akey.extents, offset, epoch).map(|v| v.slice)
            }
        };
        let Some(slice) = slice else {
            return Ok(0);
        };

        let arena = self.arena.read();
        let data = arena.read(slice)?;
        let n = data.len().min(out.len());
        out[..n].copy_from_slice(&data[..n]);
        Ok(n)
    }
}

struct SingleRowsMut<'a> {
    rows: &'a mut [SingleVersion],
}

impl ArrayOps for SingleRowsMut<'_> {
    fn len(&self) -> usize {
        self.rows.len()
    }

    fn compare(&self, i: usize, j: usize) -> Ordering {
        self.rows[i].epoch.cmp(&self.rows[j].epoch)
    }

    fn swap(&mut self, i: usize, j: usize) {
        self.rows.swap(i, j);
    }
}

struct ExtentRowsMut<'a> {
    rows: &'a mut [ExtentVersion],
}

impl ArrayOps for ExtentRowsMut<'_> {
    fn len(&self) -> usize {
        self.rows.len()
    }

    fn compare(&self, i: usize, j: usize) -> Ordering {
        let a = &self.rows[i];
        let b = &self.rows[j];
        (a.offset, a.epoch).cmp(&(b.offset, b.epoch))
    }

    fn swap(&mut self, i: usize, j: usize) {
        self.rows.swap(i, j);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{KeyBuf, KeyKind};
    use tempfile::tempdir;

    fn test_container() -> (tempfile::TempDir, ContainerShared) {
        let dir = tempdir().unwrap();
        let cont = ContainerShared::create(&dir.path().join("c.arena"), 1).unwrap();
        (dir, cont)
    }

    fn single_desc(dkey: &[u8], akey: &[u8], size: u32) -> IoDescriptor {
        IoDescriptor {
            dkey: KeyBuf::from_slice(dkey),
            akey: KeyBuf::from_slice(akey),
            spec: RecordSpec::Single { size },
        }
    }

    #[test]
    fn publish_then_read_back() {
        let (_dir, cont) = test_container();
        let codec = KeyCodec::new(KeyKind::Bytes);
        let addr = ObjectAddr::new(1, 0);
        let desc = single_desc(b"dk", b"ak", 5);

        cont.publish(codec, addr, &desc, 10, b"hello").unwrap();

        let mut out = [0u8; 5];
        let n = cont.read_into(codec, addr, &desc, 10, &mut out).unwrap();
        assert_eq!(n, 5);
        assert_eq!(&out, b"hello");
    }

    #[test]
    fn read_sees_most_recent_epoch_at_or_below() {
        let (_dir, cont) = test_container();
        let codec = KeyCodec::new(KeyKind::Bytes);
        let addr = ObjectAddr::new(1, 0);
        let desc = single_desc(b"dk", b"ak", 2);

        cont.publish(codec, addr, &desc, 5, b"v5").unwrap();
        cont.publish(codec, addr, &desc, 9, b"v9").unwrap();

        let mut out = [0u8; 2];
        assert_eq!(cont.read_into(codec, addr, &desc, 7, &mut out).unwrap(), 2);
        assert_eq!(&out, b"v5");
        assert_eq!(cont.read_into(codec, addr, &desc, 9, &mut out).unwrap(), 2);
        assert_eq!(&out, b"v9");
        // Nothing visible before the first write.
        assert_eq!(cont.read_into(codec, addr, &desc, 4, &mut out).unwrap(), 0);
    }

    #[test]
    fn missing_paths_read_as_empty() {
        let (_dir, cont) = test_container();
        let codec = KeyCodec::new(KeyKind::Bytes);
        let addr = ObjectAddr::new(1, 0);
        let desc = single_desc(b"dk", b"ak", 4);
        cont.publish(codec, addr, &desc, 1, b"data").unwrap();

        let mut out = [0u8; 4];
        let other_addr = ObjectAddr::new(2, 0);
        assert_eq!(cont.read_into(codec, other_addr, &desc, 1, &mut out).unwrap(), 0);

        let other_akey = single_desc(b"dk", b"zz", 4);
        assert_eq!(cont.read_into(codec, addr, &other_akey, 1, &mut out).unwrap(), 0);
    }

    #[test]
    fn extent_versions_are_independent_per_offset() {
        let (_dir, cont) = test_container();
        let codec = KeyCodec::new(KeyKind::Bytes);
        let addr = ObjectAddr::new(3, 0);

        let at = |offset, len| IoDescriptor {
            dkey: KeyBuf::from_slice(b"dk"),
            akey: KeyBuf::from_slice(b"arr"),
            spec: RecordSpec::Extent { offset, len },
        };

        cont.publish(codec, addr, &at(0, 4), 2, b"aaaa").unwrap();
        cont.publish(codec, addr, &at(4, 4), 3, b"bbbb").unwrap();
        cont.publish(codec, addr, &at(0, 4), 6, b"cccc").unwrap();

        let mut out = [0u8; 4];
        assert_eq!(cont.read_into(codec, addr, &at(0, 4), 9, &mut out).unwrap(), 4);
        assert_eq!(&out, b"cccc");
        assert_eq!(cont.read_into(codec, addr, &at(0, 4), 4, &mut out).unwrap(), 4);
        assert_eq!(&out, b"aaaa");
        assert_eq!(cont.read_into(codec, addr, &at(4, 4), 9, &mut out).unwrap(), 4);
        assert_eq!(&out, b"bbbb");
    }

    #[test]
    fn publish_rejects_length_mismatch() {
        let (_dir, cont) = test_container();
        let codec = KeyCodec::new(KeyKind::Bytes);
        let desc = single_desc(b"dk", b"ak", 8);
        let err = cont
            .publish(codec, ObjectAddr::new(1, 0), &desc, 1, b"short")
            .unwrap_err();
        assert!(err.downcast_ref::<crate::EpodbError>().is_some());
    }
}
