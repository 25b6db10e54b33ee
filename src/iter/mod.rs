//! # Nested Hierarchy Traversal
//!
//! Cursors over the three-level key hierarchy (dataset-key to
//! attribute-key to value) scoped to an epoch range. The full protocol
//! lives in [`cursor`]; this module holds the level/entry/outcome types
//! and the whole-hierarchy walk used by
//! [`crate::Engine::iterate`]:
//!
//! ```text
//! dataset-key cursor
//!   └─ per entry: attribute-key cursor (scoped to the dataset-key)
//!        └─ per entry: extent cursor, then single-value cursor
//!                      (scoped to both keys and the epoch range)
//! ```
//!
//! In nested mode each child cursor is handed its parent, reusing the
//! parent's materialized position instead of re-resolving the key path.
//! That is a shortcut, not a semantic mode: both traversals yield the
//! same entries in the same order.

pub(crate) mod anchor;
pub(crate) mod cursor;
pub(crate) mod snapshot;

use std::sync::Arc;

use eyre::Result;

pub use anchor::Anchor;
pub use cursor::Cursor;

use crate::store::container::ContainerShared;
use crate::store::{Epoch, EpochRange, KeyBuf, KeyCodec, ObjectAddr};

/// Hierarchy level a cursor iterates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterLevel {
    DatasetKey,
    AttrKey,
    SingleValue,
    Extent,
}

impl IterLevel {
    pub(crate) fn as_u32(self) -> u32 {
        match self {
            IterLevel::DatasetKey => 0,
            IterLevel::AttrKey => 1,
            IterLevel::SingleValue => 2,
            IterLevel::Extent => 3,
        }
    }
}

/// Scope of one cursor: the object, the parent key path for deeper
/// levels, and the epoch range.
#[derive(Debug, Clone)]
pub struct IterParams {
    pub addr: ObjectAddr,
    pub dkey: Option<KeyBuf>,
    pub akey: Option<KeyBuf>,
    pub range: EpochRange,
}

/// Probe outcome. `Empty` and `Retry` are normal control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    Positioned,
    Empty,
    Retry,
}

/// Advance outcome. `Exhausted` is terminal and normal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Advanced,
    Exhausted,
}

/// Kind of entry a cursor yields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    DatasetKey,
    AttrKey,
    Single,
    Extent,
}

/// Byte range of an extent entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtentSpan {
    pub offset: u64,
    pub len: u32,
}

/// Entry metadata at the cursor's current position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterEntry {
    pub key: KeyBuf,
    pub epoch: Epoch,
    pub kind: EntryKind,
    /// Record size in bytes; zero for key-level entries.
    pub size: u64,
    pub extent: Option<ExtentSpan>,
}

/// One fetched entry with its full key path, as produced by the
/// whole-hierarchy walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraversalRecord {
    pub level: IterLevel,
    pub dkey: KeyBuf,
    pub akey: Option<KeyBuf>,
    pub entry: IterEntry,
}

/// Walk every dataset-key, attribute-key, and value of one object.
pub(crate) fn walk_object(
    container: Arc<ContainerShared>,
    codec: KeyCodec,
    addr: ObjectAddr,
    range: EpochRange,
    nested: bool,
) -> Result<Vec<TraversalRecord>> {
    let mut out = Vec::new();
    let params = IterParams {
        addr,
        dkey: None,
        akey: None,
        range,
    };
    walk_level(
        &container,
        codec,
        IterLevel::DatasetKey,
        &params,
        None,
        nested,
        &mut out,
    )?;
    Ok(out)
}

fn walk_level(
    container: &Arc<ContainerShared>,
    codec: KeyCodec,
    level: IterLevel,
    params: &IterParams,
    parent: Option<&Cursor>,
    nested: bool,
    out: &mut Vec<TraversalRecord>,
) -> Result<()> {
    let mut cur = Cursor::prepare(Arc::clone(container), codec, level, params, parent)?;

    let mut probe = cur.probe(None)?;
    if probe == Probe::Retry {
        probe = cur.probe(None)?;
    }
    match probe {
        // A second Retry in a row means the structure is churning;
        // treat the scope as empty, as the contract allows.
        Probe::Empty | Probe::Retry => {
            cur.finish();
            return Ok(());
        }
        Probe::Positioned => {}
    }

    loop {
        let entry = cur.fetch()?;

        match level {
            IterLevel::DatasetKey => {
                out.push(TraversalRecord {
                    level,
                    dkey: entry.key.clone(),
                    akey: None,
                    entry: entry.clone(),
                });
                let child = IterParams {
                    addr: params.addr,
                    dkey: Some(entry.key.clone()),
                    akey: None,
                    range: params.range,
                };
                let link = if nested { Some(&cur) } else { None };
                walk_level(container, codec, IterLevel::AttrKey, &child, link, nested, out)?;
            }
            IterLevel::AttrKey => {
                let dkey = params.dkey.clone().expect("attribute scope has a dataset-key");
                out.push(TraversalRecord {
                    level,
                    dkey: dkey.clone(),
                    akey: Some(entry.key.clone()),
                    entry: entry.clone(),
                });
                let child = IterParams {
                    addr: params.addr,
                    dkey: Some(dkey),
                    akey: Some(entry.key.clone()),
                    range: params.range,
                };
                let link = if nested { Some(&cur) } else { None };
                walk_level(container, codec, IterLevel::Extent, &child, link, nested, out)?;
                walk_level(container, codec, IterLevel::SingleValue, &child, link, nested, out)?;
            }
            IterLevel::SingleValue | IterLevel::Extent => {
                out.push(TraversalRecord {
                    level,
                    dkey: params.dkey.clone().expect("value scope has a dataset-key"),
                    akey: params.akey.clone(),
                    entry,
                });
            }
        }

        match cur.next()? {
            Step::Advanced => continue,
            Step::Exhausted => break,
        }
    }

    cur.finish();
    Ok(())
}
