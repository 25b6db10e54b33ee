//! Object trees: sorted key arrays at the dataset and attribute levels.
//!
//! Both key levels are materialized as sorted arrays. Ordering is
//! maintained with [`array_sort`] and lookups go through
//! [`array_find_first`], with the key comparison delegated to the
//! engine's [`KeyCodec`]; the node types never order themselves.

use std::cmp::Ordering;

use super::key::{KeyBuf, KeyCodec};
use super::value::{ExtentVersion, SingleVersion};
use crate::sort::{array_find_first, array_sort, ArrayOps, KeyedArrayOps};

/// Address of an object within a container: object identifier plus
/// shard. Opaque to the engine beyond equality and hashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectAddr {
    pub object: u64,
    pub shard: u32,
}

impl ObjectAddr {
    pub fn new(object: u64, shard: u32) -> Self {
        Self { object, shard }
    }
}

#[derive(Debug, Default)]
pub(crate) struct ObjectTree {
    pub dkeys: Vec<DkeyNode>,
}

#[derive(Debug)]
pub(crate) struct DkeyNode {
    pub key: KeyBuf,
    pub akeys: Vec<AkeyNode>,
}

impl DkeyNode {
    pub(crate) fn new(key: KeyBuf) -> Self {
        Self {
            key,
            akeys: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub(crate) struct AkeyNode {
    pub key: KeyBuf,
    pub singles: Vec<SingleVersion>,
    pub extents: Vec<ExtentVersion>,
}

impl AkeyNode {
    pub(crate) fn new(key: KeyBuf) -> Self {
        Self {
            key,
            singles: Vec::new(),
            extents: Vec::new(),
        }
    }
}

/// A row type carrying a sortable key.
pub(crate) trait KeyRow {
    fn sort_key(&self) -> &KeyBuf;
}

impl KeyRow for DkeyNode {
    fn sort_key(&self) -> &KeyBuf {
        &self.key
    }
}

impl KeyRow for AkeyNode {
    fn sort_key(&self) -> &KeyBuf {
        &self.key
    }
}

/// Mutable ordering capability over keyed rows.
pub(crate) struct KeyRowsMut<'a, T: KeyRow> {
    pub rows: &'a mut [T],
    pub codec: KeyCodec,
}

impl<T: KeyRow> ArrayOps for KeyRowsMut<'_, T> {
    fn len(&self) -> usize {
        self.rows.len()
    }

    fn compare(&self, i: usize, j: usize) -> Ordering {
        self.codec
            .compare(self.rows[i].sort_key(), self.rows[j].sort_key())
    }

    fn swap(&mut self, i: usize, j: usize) {
        self.rows.swap(i, j);
    }
}

/// Read-only search capability over keyed rows.
pub(crate) struct KeyRows<'a, T: KeyRow> {
    pub rows: &'a [T],
    pub codec: KeyCodec,
}

impl<T: KeyRow> KeyedArrayOps for KeyRows<'_, T> {
    type Key = KeyBuf;

    fn len(&self) -> usize {
        self.rows.len()
    }

    fn compare_key(&self, i: usize, key: &KeyBuf) -> Ordering {
        self.codec.compare(self.rows[i].sort_key(), key)
    }
}

/// First row matching `key`, or `None`. Keys within a level are unique,
/// so "first" is "the" match.
pub(crate) fn find_key_row<'a, T: KeyRow>(
    rows: &'a [T],
    codec: KeyCodec,
    key: &KeyBuf,
) -> Option<&'a T> {
    if rows.is_empty() {
        return None;
    }
    array_find_first(&KeyRows { rows, codec }, key).map(|i| &rows[i])
}

/// Index of the row for `key`, inserting a fresh row (and re-sorting the
/// level) when absent.
pub(crate) fn key_index_or_insert<T: KeyRow>(
    rows: &mut Vec<T>,
    codec: KeyCodec,
    key: &KeyBuf,
    make: impl FnOnce() -> T,
) -> usize {
    if !rows.is_empty() {
        if let Some(i) = array_find_first(&KeyRows { rows: rows.as_slice(), codec }, key) {
            return i;
        }
    }

    rows.push(make());
    let mut ops = KeyRowsMut {
        rows: rows.as_mut_slice(),
        codec,
    };
    array_sort(&mut ops, false).expect("sort without uniqueness cannot fail");

    array_find_first(&KeyRows { rows: rows.as_slice(), codec }, key)
        .expect("key present after insert")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::KeyKind;

    #[test]
    fn insert_keeps_dkeys_sorted() {
        let codec = KeyCodec::new(KeyKind::Bytes);
        let mut rows: Vec<DkeyNode> = Vec::new();

        for name in [&b"delta"[..], b"alpha", b"charlie", b"bravo"] {
            let key = KeyBuf::from_slice(name);
            key_index_or_insert(&mut rows, codec, &key, || DkeyNode::new(key.clone()));
        }

        let names: Vec<&[u8]> = rows.iter().map(|r| r.key.as_bytes()).collect();
        assert_eq!(names, vec![&b"alpha"[..], b"bravo", b"charlie", b"delta"]);
    }

    #[test]
    fn reinserting_a_key_reuses_its_row() {
        let codec = KeyCodec::new(KeyKind::Bytes);
        let mut rows: Vec<DkeyNode> = Vec::new();
        let key = KeyBuf::from_slice(b"same");

        let a = key_index_or_insert(&mut rows, codec, &key, || DkeyNode::new(key.clone()));
        let b = key_index_or_insert(&mut rows, codec, &key, || DkeyNode::new(key.clone()));
        assert_eq!(a, b);
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn find_misses_on_absent_key() {
        let codec = KeyCodec::new(KeyKind::Bytes);
        let rows = vec![DkeyNode::new(KeyBuf::from_slice(b"present"))];
        assert!(find_key_row(&rows, codec, &KeyBuf::from_slice(b"absent")).is_none());
        assert!(find_key_row(&rows[..0], codec, &KeyBuf::from_slice(b"any")).is_none());
    }
}
