//! Resumption anchors.
//!
//! An anchor marks a traversal position so a cursor can be reopened and
//! continue where a prior one left off. It is a fixed 104-byte layout,
//! opaque to callers and stable as bytes, so it can be carried across the
//! process boundary by whatever shuttles it. Little-endian field types
//! keep the byte form unambiguous regardless of host order.

use zerocopy::little_endian::{U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use super::IterLevel;
use crate::config::ANCHOR_KEY_MAX;
use crate::error::invalid_arg;
use crate::store::{Epoch, KeyBuf};

/// Opaque traversal position for [`crate::Cursor::probe`].
#[repr(C)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable, Unaligned)]
pub struct Anchor {
    level: U32,
    key_len: U32,
    key: [u8; ANCHOR_KEY_MAX],
    offset: U64,
    epoch: U64,
}

impl Anchor {
    pub(crate) fn for_key(level: IterLevel, key: &KeyBuf) -> eyre::Result<Self> {
        if key.len() > ANCHOR_KEY_MAX {
            return Err(invalid_arg(format!(
                "key length {} exceeds anchor capacity {}",
                key.len(),
                ANCHOR_KEY_MAX
            )));
        }
        let mut buf = [0u8; ANCHOR_KEY_MAX];
        buf[..key.len()].copy_from_slice(key.as_bytes());
        Ok(Self {
            level: U32::new(level.as_u32()),
            key_len: U32::new(key.len() as u32),
            key: buf,
            offset: U64::new(0),
            epoch: U64::new(0),
        })
    }

    pub(crate) fn for_single(epoch: Epoch) -> Self {
        Self {
            level: U32::new(IterLevel::SingleValue.as_u32()),
            key_len: U32::new(0),
            key: [0u8; ANCHOR_KEY_MAX],
            offset: U64::new(0),
            epoch: U64::new(epoch),
        }
    }

    pub(crate) fn for_extent(offset: u64, epoch: Epoch) -> Self {
        Self {
            level: U32::new(IterLevel::Extent.as_u32()),
            key_len: U32::new(0),
            key: [0u8; ANCHOR_KEY_MAX],
            offset: U64::new(offset),
            epoch: U64::new(epoch),
        }
    }

    pub(crate) fn level_tag(&self) -> u32 {
        self.level.get()
    }

    pub(crate) fn key_bytes(&self) -> &[u8] {
        &self.key[..self.key_len.get() as usize]
    }

    pub(crate) fn offset(&self) -> u64 {
        self.offset.get()
    }

    pub(crate) fn epoch(&self) -> Epoch {
        self.epoch.get()
    }

    /// Stable byte form of the anchor.
    pub fn to_bytes(&self) -> &[u8] {
        self.as_bytes()
    }

    /// Rebuild an anchor from its byte form, if well-sized.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        Self::read_from_bytes(bytes).ok()
    }
}

impl std::fmt::Debug for Anchor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Anchor")
            .field("level", &self.level_tag())
            .field("key_len", &self.key_len.get())
            .field("offset", &self.offset())
            .field("epoch", &self.epoch())
            .finish()
    }
}
