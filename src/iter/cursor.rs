//! # Hierarchy Cursor
//!
//! One cursor traverses one level of the key hierarchy, scoped to its
//! parent key path and an epoch range. The protocol is a small state
//! machine:
//!
//! ```text
//!            probe ── Positioned ── fetch / next ──┐
//! Created ──┤                                      │
//!            probe ── Empty ──> Exhausted <── next exhausts
//!
//! finish(cursor)  -- consumes the cursor from any state
//! ```
//!
//! - `probe` positions at the first entry at or after an anchor (absent
//!   anchor means scope start). `Empty` and a later `Exhausted` are
//!   normal outcomes, never errors. `Retry` reports that the container
//!   moved structurally between prepare and probe; the caller re-probes
//!   or treats the scope as empty; the cursor never retries itself.
//! - `fetch` reads the current entry without advancing; calling it on an
//!   unpositioned or exhausted cursor is a caller error.
//! - `finish` consumes the cursor exactly once; a cursor that merely
//!   goes out of scope releases the same resources via drop.
//!
//! Rows are materialized at prepare time ([`super::snapshot`]), so a
//! cursor is an explicit restartable sequence rather than callback-bound
//! control flow, and child cursors can share the parent's materialized
//! subtree in nested mode.

use std::sync::Arc;

use eyre::Result;

use super::anchor::Anchor;
use super::snapshot::{extent_entries, single_entries, AkeySnap, DkeySnap, ObjectSnap};
use super::{EntryKind, IterEntry, IterLevel, IterParams, Probe, Step};
use crate::error::invalid_arg;
use crate::store::container::ContainerShared;
use crate::store::object::find_key_row;
use crate::store::KeyCodec;
use crate::store::KeyBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CursorState {
    Created,
    Positioned,
    Exhausted,
}

enum Rows {
    Dkeys(Arc<Vec<DkeySnap>>),
    Akeys(Arc<Vec<AkeySnap>>),
    Values(Vec<IterEntry>),
}

/// A traversal position within one hierarchy level.
pub struct Cursor {
    level: IterLevel,
    state: CursorState,
    rows: Rows,
    pos: usize,
    codec: KeyCodec,
    container: Arc<ContainerShared>,
    generation: u64,
}

impl Cursor {
    /// Open a cursor over `level` within the scope described by
    /// `params`. A scope with no eligible entries yields a cursor whose
    /// first probe reports `Empty`, never an error.
    ///
    /// With `parent`, the child adopts the parent's current subtree
    /// instead of re-resolving the key path; the parent must be
    /// positioned on the entry that spawned this child. Entries are the
    /// same in both modes.
    pub(crate) fn prepare(
        container: Arc<ContainerShared>,
        codec: KeyCodec,
        level: IterLevel,
        params: &IterParams,
        parent: Option<&Cursor>,
    ) -> Result<Cursor> {
        if let Some(dkey) = &params.dkey {
            codec.validate("dataset-key", dkey)?;
        }
        if let Some(akey) = &params.akey {
            codec.validate("attribute-key", akey)?;
        }

        let rows = match level {
            IterLevel::DatasetKey => {
                if parent.is_some() {
                    return Err(invalid_arg("dataset-key cursors take no parent scope"));
                }
                let objects = container.objects.read();
                let snap = ObjectSnap::capture(&objects, params.addr, params.range);
                Rows::Dkeys(snap.dkeys)
            }
            IterLevel::AttrKey => {
                let dkey = params
                    .dkey
                    .as_ref()
                    .ok_or_else(|| invalid_arg("attribute-key scope requires a dataset-key"))?;
                match parent {
                    Some(p) => Rows::Akeys(p.current_dkey_snap(dkey, codec)?),
                    None => {
                        let objects = container.objects.read();
                        let snap = ObjectSnap::capture(&objects, params.addr, params.range);
                        match find_key_row(&snap.dkeys, codec, dkey) {
                            Some(row) => Rows::Akeys(Arc::clone(&row.akeys)),
                            None => Rows::Akeys(Arc::new(Vec::new())),
                        }
                    }
                }
            }
            IterLevel::SingleValue | IterLevel::Extent => {
                let dkey = params
                    .dkey
                    .as_ref()
                    .ok_or_else(|| invalid_arg("value scope requires a dataset-key"))?;
                let akey = params
                    .akey
                    .as_ref()
                    .ok_or_else(|| invalid_arg("value scope requires an attribute-key"))?;

                let akey_snap = match parent {
                    Some(p) => p.current_akey_snap(akey, codec)?,
                    None => {
                        let objects = container.objects.read();
                        let snap = ObjectSnap::capture(&objects, params.addr, params.range);
                        find_key_row(&snap.dkeys, codec, dkey)
                            .and_then(|d| find_key_row(&d.akeys, codec, akey).cloned())
                    }
                };
                let entries = match (&akey_snap, level) {
                    (Some(a), IterLevel::SingleValue) => single_entries(a, params.range),
                    (Some(a), IterLevel::Extent) => extent_entries(a, params.range),
                    (None, _) => Vec::new(),
                    _ => unreachable!(),
                };
                Rows::Values(entries)
            }
        };

        let generation = container.generation();
        Ok(Cursor {
            level,
            state: CursorState::Created,
            rows,
            pos: 0,
            codec,
            container,
            generation,
        })
    }

    pub fn level(&self) -> IterLevel {
        self.level
    }

    pub fn is_exhausted(&self) -> bool {
        self.state == CursorState::Exhausted
    }

    /// Position at the first entry at or after `anchor` (scope start
    /// when absent).
    pub fn probe(&mut self, anchor: Option<&Anchor>) -> Result<Probe> {
        let generation = self.container.generation();
        if generation != self.generation {
            // The container moved structurally since this cursor's view
            // was taken. Adopt the new generation so the caller's
            // re-probe proceeds.
            self.generation = generation;
            return Ok(Probe::Retry);
        }

        let pos = match anchor {
            None => 0,
            Some(a) => self.position_at(a)?,
        };

        if pos >= self.row_count() {
            self.state = CursorState::Exhausted;
            Ok(Probe::Empty)
        } else {
            self.pos = pos;
            self.state = CursorState::Positioned;
            Ok(Probe::Positioned)
        }
    }

    /// Read the entry at the current position without advancing.
    pub fn fetch(&self) -> Result<IterEntry> {
        if self.state != CursorState::Positioned {
            return Err(invalid_arg("fetch on a cursor that is not positioned"));
        }
        Ok(match &self.rows {
            Rows::Dkeys(rows) => {
                let row = &rows[self.pos];
                IterEntry {
                    key: row.key.clone(),
                    epoch: row.max_epoch,
                    kind: EntryKind::DatasetKey,
                    size: 0,
                    extent: None,
                }
            }
            Rows::Akeys(rows) => {
                let row = &rows[self.pos];
                IterEntry {
                    key: row.key.clone(),
                    epoch: row.max_epoch,
                    kind: EntryKind::AttrKey,
                    size: 0,
                    extent: None,
                }
            }
            Rows::Values(entries) => entries[self.pos].clone(),
        })
    }

    /// Advance one position. `Exhausted` is terminal and normal.
    pub fn next(&mut self) -> Result<Step> {
        match self.state {
            CursorState::Created => Err(invalid_arg("next on a cursor that was never probed")),
            CursorState::Exhausted => Ok(Step::Exhausted),
            CursorState::Positioned => {
                self.pos += 1;
                if self.pos >= self.row_count() {
                    self.state = CursorState::Exhausted;
                    Ok(Step::Exhausted)
                } else {
                    Ok(Step::Advanced)
                }
            }
        }
    }

    /// Anchor for the current position, suitable for re-probing a fresh
    /// cursor over the same scope.
    pub fn position_anchor(&self) -> Result<Anchor> {
        if self.state != CursorState::Positioned {
            return Err(invalid_arg("anchor of a cursor that is not positioned"));
        }
        match &self.rows {
            Rows::Dkeys(rows) => Anchor::for_key(self.level, &rows[self.pos].key),
            Rows::Akeys(rows) => Anchor::for_key(self.level, &rows[self.pos].key),
            Rows::Values(entries) => {
                let entry = &entries[self.pos];
                match entry.kind {
                    EntryKind::Single => Ok(Anchor::for_single(entry.epoch)),
                    EntryKind::Extent => {
                        let span = entry
                            .extent
                            .ok_or_else(|| invalid_arg("extent entry without a span"))?;
                        Ok(Anchor::for_extent(span.offset, entry.epoch))
                    }
                    _ => Err(invalid_arg("value cursor holding a key entry")),
                }
            }
        }
    }

    /// Release the cursor. Dropping releases the same resources; the
    /// consuming form exists so traversal code closes each cursor
    /// exactly once, children before their parent advances.
    pub fn finish(self) {}

    fn row_count(&self) -> usize {
        match &self.rows {
            Rows::Dkeys(rows) => rows.len(),
            Rows::Akeys(rows) => rows.len(),
            Rows::Values(entries) => entries.len(),
        }
    }

    fn position_at(&self, anchor: &Anchor) -> Result<usize> {
        if anchor.level_tag() != self.level.as_u32() {
            return Err(invalid_arg("anchor level does not match cursor level"));
        }
        Ok(match &self.rows {
            Rows::Dkeys(rows) => {
                let key = KeyBuf::from_slice(anchor.key_bytes());
                rows.partition_point(|r| self.codec.compare(&r.key, &key).is_lt())
            }
            Rows::Akeys(rows) => {
                let key = KeyBuf::from_slice(anchor.key_bytes());
                rows.partition_point(|r| self.codec.compare(&r.key, &key).is_lt())
            }
            Rows::Values(entries) => match self.level {
                IterLevel::SingleValue => {
                    entries.partition_point(|e| e.epoch < anchor.epoch())
                }
                IterLevel::Extent => entries
                    .partition_point(|e| e.extent.map_or(0, |s| s.offset) < anchor.offset()),
                _ => 0,
            },
        })
    }

    fn current_dkey_snap(&self, dkey: &KeyBuf, codec: KeyCodec) -> Result<Arc<Vec<AkeySnap>>> {
        if self.state != CursorState::Positioned {
            return Err(invalid_arg("parent cursor is not positioned"));
        }
        let Rows::Dkeys(rows) = &self.rows else {
            return Err(invalid_arg("parent of an attribute-key cursor must iterate dataset-keys"));
        };
        let row = &rows[self.pos];
        if codec.compare(&row.key, dkey).is_ne() {
            return Err(invalid_arg("parent cursor is positioned on a different dataset-key"));
        }
        Ok(Arc::clone(&row.akeys))
    }

    fn current_akey_snap(&self, akey: &KeyBuf, codec: KeyCodec) -> Result<Option<AkeySnap>> {
        if self.state != CursorState::Positioned {
            return Err(invalid_arg("parent cursor is not positioned"));
        }
        let Rows::Akeys(rows) = &self.rows else {
            return Err(invalid_arg("parent of a value cursor must iterate attribute-keys"));
        };
        let row = &rows[self.pos];
        if codec.compare(&row.key, akey).is_ne() {
            return Err(invalid_arg("parent cursor is positioned on a different attribute-key"));
        }
        Ok(Some(row.clone()))
    }
}
