//! # Value Arena
//!
//! Append-only, file-backed storage for value bytes. The file is
//! memory-mapped so fetches copy straight out of the mapping with no
//! read syscalls, and it grows in [`ARENA_PAGE_SIZE`] increments.
//!
//! ## Remap Hazard
//!
//! Growing remaps the file, which invalidates every slice previously
//! returned by [`ValueArena::read`]. The borrow checker rules out
//! dangling slices at compile time (`grow` takes `&mut self`), but a
//! cursor that captured its view before a grow still needs to know the
//! structure moved underneath it: the arena carries a `generation`
//! counter, bumped on every remap, which the cursor layer checks at
//! probe time to signal a transient retry.

use std::fs::{File, OpenOptions};
use std::path::Path;

use eyre::{ensure, Result, WrapErr};
use memmap2::MmapMut;
use tracing::debug;

use super::value::ArenaSlice;
use crate::config::ARENA_PAGE_SIZE;
use crate::error::io_failure;

#[derive(Debug)]
pub(crate) struct ValueArena {
    file: File,
    mmap: MmapMut,
    pages: u32,
    used: u64,
    generation: u64,
}

impl ValueArena {
    pub(crate) fn create<P: AsRef<Path>>(path: P, initial_pages: u32) -> Result<Self> {
        let path = path.as_ref();

        ensure!(initial_pages > 0, "arena must start with at least one page");

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .wrap_err_with(|| format!("failed to create arena file '{}'", path.display()))?;

        let size = initial_pages as u64 * ARENA_PAGE_SIZE as u64;
        file.set_len(size)
            .map_err(|e| io_failure(format!("failed to size arena to {size} bytes: {e}")))?;

        // SAFETY: the file was just created with exclusive read+write
        // access and truncated, so no other mapping or process mutates
        // it. The mapping's lifetime is tied to ValueArena, and all
        // access goes through read()/append() which bounds-check against
        // `used` and the mapped length.
        let mmap = unsafe {
            MmapMut::map_mut(&file)
                .wrap_err_with(|| format!("failed to memory-map arena '{}'", path.display()))?
        };

        Ok(Self {
            file,
            mmap,
            pages: initial_pages,
            used: 0,
            generation: 0,
        })
    }

    /// Bytes appended so far.
    pub(crate) fn used(&self) -> u64 {
        self.used
    }

    pub(crate) fn capacity(&self) -> u64 {
        self.pages as u64 * ARENA_PAGE_SIZE as u64
    }

    /// Remap counter; changes whenever the mapping moves.
    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    /// Append `data` and return its location. Grows (and remaps) the
    /// arena when the tail does not fit.
    pub(crate) fn append(&mut self, data: &[u8]) -> Result<ArenaSlice> {
        ensure!(
            data.len() <= u32::MAX as usize,
            "value of {} bytes exceeds addressable record size",
            data.len()
        );

        let need = self.used + data.len() as u64;
        if need > self.capacity() {
            let need_pages = need.div_ceil(ARENA_PAGE_SIZE as u64) as u32;
            self.grow(need_pages.max(self.pages * 2))?;
        }

        let off = self.used;
        self.mmap[off as usize..off as usize + data.len()].copy_from_slice(data);
        self.used = need;

        Ok(ArenaSlice {
            off,
            len: data.len() as u32,
        })
    }

    /// Borrow the bytes of a previously appended slice.
    pub(crate) fn read(&self, slice: ArenaSlice) -> Result<&[u8]> {
        let end = slice.off + slice.len as u64;
        ensure!(
            end <= self.used,
            "arena slice {}..{} out of bounds (used={})",
            slice.off,
            end,
            self.used
        );
        Ok(&self.mmap[slice.off as usize..end as usize])
    }

    fn grow(&mut self, new_pages: u32) -> Result<()> {
        if new_pages <= self.pages {
            return Ok(());
        }

        self.mmap
            .flush()
            .map_err(|e| io_failure(format!("arena flush before grow failed: {e}")))?;

        let new_size = new_pages as u64 * ARENA_PAGE_SIZE as u64;
        self.file
            .set_len(new_size)
            .map_err(|e| io_failure(format!("failed to extend arena to {new_size} bytes: {e}")))?;

        // SAFETY: grow() holds &mut self, so no slice into the old
        // mapping can be live. The old mapping was flushed above and the
        // file extended to new_size before remapping; the old mapping is
        // dropped on assignment.
        self.mmap = unsafe {
            MmapMut::map_mut(&self.file).wrap_err("failed to remap arena after grow")?
        };

        self.pages = new_pages;
        self.generation += 1;
        debug!(pages = new_pages, generation = self.generation, "value arena grown");
        Ok(())
    }

    /// Flush appended bytes to the backing file.
    pub(crate) fn sync(&self) -> Result<()> {
        self.mmap
            .flush()
            .map_err(|e| io_failure(format!("arena sync failed: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn append_and_read_round_trip() {
        let dir = tempdir().unwrap();
        let mut arena = ValueArena::create(dir.path().join("t.arena"), 1).unwrap();

        let a = arena.append(b"first value").unwrap();
        let b = arena.append(b"second").unwrap();

        assert_eq!(arena.read(a).unwrap(), b"first value");
        assert_eq!(arena.read(b).unwrap(), b"second");
        assert_eq!(arena.used(), 17);
    }

    #[test]
    fn create_rejects_zero_pages() {
        let dir = tempdir().unwrap();
        assert!(ValueArena::create(dir.path().join("t.arena"), 0).is_err());
    }

    #[test]
    fn growth_bumps_generation_and_preserves_data() {
        let dir = tempdir().unwrap();
        let mut arena = ValueArena::create(dir.path().join("t.arena"), 1).unwrap();
        assert_eq!(arena.generation(), 0);

        let first = arena.append(&[0xAB; 100]).unwrap();
        let big = vec![0xCD; ARENA_PAGE_SIZE + 1];
        let second = arena.append(&big).unwrap();

        assert_eq!(arena.generation(), 1);
        assert_eq!(arena.read(first).unwrap(), &[0xAB; 100][..]);
        assert_eq!(arena.read(second).unwrap(), &big[..]);
    }

    #[test]
    fn out_of_bounds_read_is_rejected() {
        let dir = tempdir().unwrap();
        let mut arena = ValueArena::create(dir.path().join("t.arena"), 1).unwrap();
        arena.append(b"xy").unwrap();

        let bogus = ArenaSlice { off: 1, len: 8 };
        assert!(arena.read(bogus).is_err());
    }

    #[test]
    fn sync_persists_to_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.arena");
        let mut arena = ValueArena::create(&path, 1).unwrap();
        arena.append(b"durable").unwrap();
        arena.sync().unwrap();

        let on_disk = std::fs::read(&path).unwrap();
        assert_eq!(&on_disk[..7], b"durable");
    }
}
