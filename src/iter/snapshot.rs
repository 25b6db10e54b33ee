//! Per-object snapshots used by cursors.
//!
//! A cursor materializes its level's rows once at prepare time from the
//! live store, filtered to keys that have at least one version inside
//! the epoch range. Subtrees hang off each row behind `Arc`s so a
//! nested child cursor can adopt its parent's current subtree without
//! re-resolving the key path; the nested mode is purely a shortcut,
//! both modes see the same rows.

use std::sync::Arc;

use hashbrown::HashMap;

use crate::store::object::{KeyRow, ObjectAddr, ObjectTree};
use crate::store::value::{latest_single_in, visible_extents, ExtentVersion, SingleVersion};
use crate::store::{Epoch, EpochRange, KeyBuf};

#[derive(Debug, Clone)]
pub(crate) struct ObjectSnap {
    pub dkeys: Arc<Vec<DkeySnap>>,
}

#[derive(Debug, Clone)]
pub(crate) struct DkeySnap {
    pub key: KeyBuf,
    /// Most recent in-range epoch anywhere under this key.
    pub max_epoch: Epoch,
    pub akeys: Arc<Vec<AkeySnap>>,
}

#[derive(Debug, Clone)]
pub(crate) struct AkeySnap {
    pub key: KeyBuf,
    pub max_epoch: Epoch,
    pub singles: Arc<Vec<SingleVersion>>,
    pub extents: Arc<Vec<ExtentVersion>>,
}

impl KeyRow for DkeySnap {
    fn sort_key(&self) -> &KeyBuf {
        &self.key
    }
}

impl KeyRow for AkeySnap {
    fn sort_key(&self) -> &KeyBuf {
        &self.key
    }
}

impl ObjectSnap {
    /// Capture the in-range view of one object. Missing objects and
    /// keys with nothing visible in range simply contribute no rows.
    pub(crate) fn capture(
        objects: &HashMap<ObjectAddr, ObjectTree>,
        addr: ObjectAddr,
        range: EpochRange,
    ) -> Self {
        let mut dkeys = Vec::new();

        if let Some(tree) = objects.get(&addr) {
            for dnode in &tree.dkeys {
                let mut akeys = Vec::new();
                for anode in &dnode.akeys {
                    let singles: Vec<SingleVersion> = anode
                        .singles
                        .iter()
                        .filter(|v| range.contains(v.epoch))
                        .cloned()
                        .collect();
                    let extents: Vec<ExtentVersion> = anode
                        .extents
                        .iter()
                        .filter(|v| range.contains(v.epoch))
                        .cloned()
                        .collect();
                    if singles.is_empty() && extents.is_empty() {
                        continue;
                    }
                    let max_epoch = singles
                        .iter()
                        .map(|v| v.epoch)
                        .chain(extents.iter().map(|v| v.epoch))
                        .max()
                        .unwrap_or(0);
                    akeys.push(AkeySnap {
                        key: anode.key.clone(),
                        max_epoch,
                        singles: Arc::new(singles),
                        extents: Arc::new(extents),
                    });
                }
                if akeys.is_empty() {
                    continue;
                }
                let max_epoch = akeys.iter().map(|a| a.max_epoch).max().unwrap_or(0);
                dkeys.push(DkeySnap {
                    key: dnode.key.clone(),
                    max_epoch,
                    akeys: Arc::new(akeys),
                });
            }
        }

        Self {
            dkeys: Arc::new(dkeys),
        }
    }
}

/// Value rows of an attribute under the range's per-key recency rule:
/// at most one single entry, and one extent entry per offset.
pub(crate) fn single_entries(akey: &AkeySnap, range: EpochRange) -> Vec<super::IterEntry> {
    latest_single_in(&akey.singles, range)
        .map(|v| super::IterEntry {
            key: akey.key.clone(),
            epoch: v.epoch,
            kind: super::EntryKind::Single,
            size: v.slice.len as u64,
            extent: None,
        })
        .into_iter()
        .collect()
}

/// Highest visible extent anywhere under a dataset-key, by offset.
pub(crate) fn max_extent_span(dkey: &DkeySnap, range: EpochRange) -> Option<super::ExtentSpan> {
    let mut best: Option<super::ExtentSpan> = None;
    for akey in dkey.akeys.iter() {
        for v in visible_extents(&akey.extents, range) {
            let span = super::ExtentSpan {
                offset: v.offset,
                len: v.len,
            };
            if best.map_or(true, |b| span.offset > b.offset) {
                best = Some(span);
            }
        }
    }
    best
}

pub(crate) fn extent_entries(akey: &AkeySnap, range: EpochRange) -> Vec<super::IterEntry> {
    visible_extents(&akey.extents, range)
        .into_iter()
        .map(|v| super::IterEntry {
            key: akey.key.clone(),
            epoch: v.epoch,
            kind: super::EntryKind::Extent,
            size: v.len as u64,
            extent: Some(super::ExtentSpan {
                offset: v.offset,
                len: v.len,
            }),
        })
        .collect()
}
