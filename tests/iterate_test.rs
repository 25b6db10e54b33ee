//! Hierarchy traversal integration tests.
//!
//! Covers cursor protocol outcomes (empty scopes, exhaustion, transient
//! retry), nested-versus-flat traversal equivalence, and per-key epoch
//! range selection.

use epodb::{
    Engine, EntryKind, EpochRange, IoDescriptor, IterLevel, IterParams, KeyBuf, ObjectAddr, Probe,
    RecordSpec, SgList, Step,
};
use tempfile::TempDir;

fn test_engine() -> (TempDir, Engine) {
    let dir = tempfile::tempdir().unwrap();
    let engine = Engine::builder().data_dir(dir.path()).open().unwrap();
    (dir, engine)
}

fn put_single(engine: &Engine, ch: epodb::ContainerHandle, addr: ObjectAddr, dkey: &[u8], akey: &[u8], epoch: u64, value: &[u8]) {
    let desc = IoDescriptor {
        dkey: KeyBuf::from_slice(dkey),
        akey: KeyBuf::from_slice(akey),
        spec: RecordSpec::Single {
            size: value.len() as u32,
        },
    };
    engine
        .update(ch, addr, epoch, &desc, &SgList::single(value))
        .unwrap();
}

fn put_extent(engine: &Engine, ch: epodb::ContainerHandle, addr: ObjectAddr, dkey: &[u8], akey: &[u8], epoch: u64, offset: u64, value: &[u8]) {
    let desc = IoDescriptor {
        dkey: KeyBuf::from_slice(dkey),
        akey: KeyBuf::from_slice(akey),
        spec: RecordSpec::Extent {
            offset,
            len: value.len() as u32,
        },
    };
    engine
        .update(ch, addr, epoch, &desc, &SgList::single(value))
        .unwrap();
}

#[test]
fn empty_scope_probes_empty_then_exhausts() {
    let (_dir, engine) = test_engine();
    let ch = engine.create_container().unwrap();
    let addr = ObjectAddr::new(1, 0);

    let params = IterParams {
        addr,
        dkey: None,
        akey: None,
        range: EpochRange::all(),
    };
    let mut cur = engine
        .iter_prepare(ch, IterLevel::DatasetKey, &params, None)
        .unwrap();

    assert_eq!(cur.probe(None).unwrap(), Probe::Empty);
    assert_eq!(cur.next().unwrap(), Step::Exhausted);
    assert_eq!(cur.next().unwrap(), Step::Exhausted);
    cur.finish();
}

#[test]
fn fetch_before_probe_is_a_caller_error() {
    let (_dir, engine) = test_engine();
    let ch = engine.create_container().unwrap();

    let params = IterParams {
        addr: ObjectAddr::new(1, 0),
        dkey: None,
        akey: None,
        range: EpochRange::all(),
    };
    let cur = engine
        .iter_prepare(ch, IterLevel::DatasetKey, &params, None)
        .unwrap();
    assert!(cur.fetch().is_err());
}

#[test]
fn dataset_keys_come_back_in_key_order() {
    let (_dir, engine) = test_engine();
    let ch = engine.create_container().unwrap();
    let addr = ObjectAddr::new(1, 0);

    for dkey in [&b"delta"[..], b"alpha", b"charlie"] {
        put_single(&engine, ch, addr, dkey, b"attr", 5, b"x");
    }

    let params = IterParams {
        addr,
        dkey: None,
        akey: None,
        range: EpochRange::all(),
    };
    let mut cur = engine
        .iter_prepare(ch, IterLevel::DatasetKey, &params, None)
        .unwrap();
    assert_eq!(cur.probe(None).unwrap(), Probe::Positioned);

    let mut keys = Vec::new();
    loop {
        keys.push(cur.fetch().unwrap().key.as_bytes().to_vec());
        if cur.next().unwrap() == Step::Exhausted {
            break;
        }
    }
    cur.finish();

    assert_eq!(keys, vec![b"alpha".to_vec(), b"charlie".to_vec(), b"delta".to_vec()]);
}

#[test]
fn nested_and_flat_traversals_agree() {
    let (_dir, engine) = test_engine();
    let ch = engine.create_container().unwrap();
    let addr = ObjectAddr::new(9, 1);

    for (dkey, akey) in [
        (&b"dk-b"[..], &b"ak-1"[..]),
        (b"dk-a", b"ak-2"),
        (b"dk-b", b"ak-2"),
    ] {
        put_single(&engine, ch, addr, dkey, akey, 3, b"scalar!!");
        put_extent(&engine, ch, addr, dkey, akey, 4, 0, b"ext-lo");
        put_extent(&engine, ch, addr, dkey, akey, 5, 64, b"ext-hi");
    }

    let flat = engine.iterate(ch, addr, EpochRange::all(), false).unwrap();
    let nested = engine.iterate(ch, addr, EpochRange::all(), true).unwrap();

    assert_eq!(flat, nested);
    assert!(!flat.is_empty());

    // Shape spot-checks: dataset-keys ascend, extents precede singles
    // under each attribute.
    let dkeys: Vec<&[u8]> = flat
        .iter()
        .filter(|r| r.level == IterLevel::DatasetKey)
        .map(|r| r.entry.key.as_bytes())
        .collect();
    assert_eq!(dkeys, vec![&b"dk-a"[..], b"dk-b"]);

    let kinds: Vec<EntryKind> = flat
        .iter()
        .filter(|r| r.dkey.as_bytes() == b"dk-a")
        .map(|r| r.entry.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            EntryKind::DatasetKey,
            EntryKind::AttrKey,
            EntryKind::Extent,
            EntryKind::Extent,
            EntryKind::Single,
        ]
    );
}

#[test]
fn range_selection_picks_most_recent_per_key() {
    let (_dir, engine) = test_engine();
    let ch = engine.create_container().unwrap();
    let addr = ObjectAddr::new(2, 0);

    put_single(&engine, ch, addr, b"dk", b"attr", 2, b"v2");
    put_single(&engine, ch, addr, b"dk", b"attr", 5, b"v5");
    put_single(&engine, ch, addr, b"dk", b"attr", 9, b"v9");

    let records = engine
        .iterate(ch, addr, EpochRange { lo: 1, hi: 6 }, false)
        .unwrap();
    let singles: Vec<_> = records
        .iter()
        .filter(|r| r.entry.kind == EntryKind::Single)
        .collect();
    assert_eq!(singles.len(), 1);
    assert_eq!(singles[0].entry.epoch, 5);

    // A range covering none of the versions yields no entries at all.
    let records = engine
        .iterate(ch, addr, EpochRange { lo: 10, hi: 20 }, false)
        .unwrap();
    assert!(records.is_empty());
}

#[test]
fn extent_selection_is_per_offset() {
    let (_dir, engine) = test_engine();
    let ch = engine.create_container().unwrap();
    let addr = ObjectAddr::new(3, 0);

    put_extent(&engine, ch, addr, b"dk", b"arr", 2, 0, b"old-");
    put_extent(&engine, ch, addr, b"dk", b"arr", 6, 0, b"new-");
    put_extent(&engine, ch, addr, b"dk", b"arr", 3, 128, b"far-");

    let records = engine
        .iterate(ch, addr, EpochRange { lo: 0, hi: 10 }, false)
        .unwrap();
    let extents: Vec<(u64, u64)> = records
        .iter()
        .filter(|r| r.entry.kind == EntryKind::Extent)
        .map(|r| (r.entry.extent.unwrap().offset, r.entry.epoch))
        .collect();
    assert_eq!(extents, vec![(0, 6), (128, 3)]);
}

#[test]
fn anchor_resumes_where_a_cursor_left_off() {
    let (_dir, engine) = test_engine();
    let ch = engine.create_container().unwrap();
    let addr = ObjectAddr::new(4, 0);

    for dkey in [&b"a"[..], b"b", b"c", b"d"] {
        put_single(&engine, ch, addr, dkey, b"attr", 1, b"x");
    }

    let params = IterParams {
        addr,
        dkey: None,
        akey: None,
        range: EpochRange::all(),
    };

    let mut first = engine
        .iter_prepare(ch, IterLevel::DatasetKey, &params, None)
        .unwrap();
    assert_eq!(first.probe(None).unwrap(), Probe::Positioned);
    first.next().unwrap();
    first.next().unwrap();
    let anchor = first.position_anchor().unwrap();
    first.finish();

    // The anchor survives a byte round-trip and re-positions a fresh
    // cursor at the same entry.
    let anchor = epodb::Anchor::from_bytes(anchor.to_bytes()).unwrap();
    let mut second = engine
        .iter_prepare(ch, IterLevel::DatasetKey, &params, None)
        .unwrap();
    assert_eq!(second.probe(Some(&anchor)).unwrap(), Probe::Positioned);
    assert_eq!(second.fetch().unwrap().key.as_bytes(), b"c");
    second.finish();
}

#[test]
fn structural_change_between_prepare_and_probe_retries() {
    let dir = tempfile::tempdir().unwrap();
    // A one-page arena so a large write forces growth (and a remap).
    let engine = Engine::builder()
        .data_dir(dir.path())
        .arena_initial_pages(1)
        .open()
        .unwrap();
    let ch = engine.create_container().unwrap();
    let addr = ObjectAddr::new(5, 0);

    put_single(&engine, ch, addr, b"dk", b"attr", 1, b"seed");

    let params = IterParams {
        addr,
        dkey: None,
        akey: None,
        range: EpochRange::all(),
    };
    let mut cur = engine
        .iter_prepare(ch, IterLevel::DatasetKey, &params, None)
        .unwrap();

    let big = vec![7u8; 100 * 1024];
    put_single(&engine, ch, addr, b"dk", b"grow", 2, &big);

    assert_eq!(cur.probe(None).unwrap(), Probe::Retry);
    // The caller-driven re-probe proceeds on the cursor's view.
    assert_eq!(cur.probe(None).unwrap(), Probe::Positioned);
    assert_eq!(cur.fetch().unwrap().key.as_bytes(), b"dk");
    cur.finish();
}

#[test]
fn nested_value_cursor_reuses_parent_position() {
    let (_dir, engine) = test_engine();
    let ch = engine.create_container().unwrap();
    let addr = ObjectAddr::new(6, 0);

    put_single(&engine, ch, addr, b"dk", b"ak", 3, b"value");

    let dk_params = IterParams {
        addr,
        dkey: None,
        akey: None,
        range: EpochRange::all(),
    };
    let mut dk_cur = engine
        .iter_prepare(ch, IterLevel::DatasetKey, &dk_params, None)
        .unwrap();
    assert_eq!(dk_cur.probe(None).unwrap(), Probe::Positioned);
    let dkey = dk_cur.fetch().unwrap().key;

    let ak_params = IterParams {
        addr,
        dkey: Some(dkey.clone()),
        akey: None,
        range: EpochRange::all(),
    };
    let mut ak_cur = engine
        .iter_prepare(ch, IterLevel::AttrKey, &ak_params, Some(&dk_cur))
        .unwrap();
    assert_eq!(ak_cur.probe(None).unwrap(), Probe::Positioned);
    let akey = ak_cur.fetch().unwrap().key;

    let val_params = IterParams {
        addr,
        dkey: Some(dkey),
        akey: Some(akey),
        range: EpochRange::all(),
    };
    let mut val_cur = engine
        .iter_prepare(ch, IterLevel::SingleValue, &val_params, Some(&ak_cur))
        .unwrap();
    assert_eq!(val_cur.probe(None).unwrap(), Probe::Positioned);
    let entry = val_cur.fetch().unwrap();
    assert_eq!(entry.epoch, 3);
    assert_eq!(entry.size, 5);

    // Children close before their parents advance or close.
    val_cur.finish();
    ak_cur.finish();
    dk_cur.finish();
}
