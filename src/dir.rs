//! Directory blocks and their fixed-size entries.
//!
//! A directory's data blocks each hold 32 records of `{filename, inode}`.
//! Live entries form a prefix of each block; a zero inode number marks a
//! free slot. Removal keeps the prefix packed by swapping the last live
//! entry into the hole.

use crate::alloc;
use crate::device::{BLOCK_SIZE, Block, BlockDevice};
use crate::error::{Error, Result};
use crate::inode::{self, Inode};
use crate::superblock::Geometry;
use crate::util::{read_i32, write_i32};

/// The on-disk size of a filename, terminating NUL included.
pub const FILENAME_LEN: usize = 12;
/// The size of a directory entry in bytes.
pub const ENTRY_SIZE: usize = FILENAME_LEN + 4;
/// The number of entries in one directory block.
pub const ENTRIES_PER_BLOCK: usize = BLOCK_SIZE / ENTRY_SIZE;

/// One `{filename, inode}` record of a directory block.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DirEntry {
    /// NUL-padded filename.
    pub name: [u8; FILENAME_LEN],
    /// Inode of the entry; 0 marks a free slot.
    pub inode: i32,
}

impl DirEntry {
    /// Builds an entry for `name`, which must fit the on-disk limit.
    pub fn new(name: &str, ino: i32) -> Self {
        let mut buf = [0; FILENAME_LEN];
        buf[..name.len()].copy_from_slice(name.as_bytes());
        Self {
            name: buf,
            inode: ino,
        }
    }

    /// Returns the filename without its NUL padding.
    pub fn name(&self) -> &[u8] {
        let len = self
            .name
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(FILENAME_LEN);
        &self.name[..len]
    }

    /// Tells whether the slot is free.
    pub fn is_free(&self) -> bool {
        self.inode <= 0
    }

    fn decode(buf: &[u8]) -> Self {
        let mut name = [0; FILENAME_LEN];
        name.copy_from_slice(&buf[..FILENAME_LEN]);
        Self {
            name,
            inode: read_i32(buf, FILENAME_LEN),
        }
    }

    fn encode(&self, buf: &mut [u8]) {
        buf[..FILENAME_LEN].copy_from_slice(&self.name);
        write_i32(buf, FILENAME_LEN, self.inode);
    }
}

fn entry_at(buf: &Block, slot: usize) -> DirEntry {
    DirEntry::decode(&buf[slot * ENTRY_SIZE..(slot + 1) * ENTRY_SIZE])
}

fn set_entry(buf: &mut Block, slot: usize, ent: &DirEntry) {
    ent.encode(&mut buf[slot * ENTRY_SIZE..(slot + 1) * ENTRY_SIZE]);
}

/// Adds the entry (`name`, `child`) to the directory held by inode
/// `dir_ino`.
///
/// The entry goes into the first free slot of the directory's last block; a
/// new block is appended when the last one is full or the directory has no
/// block yet.
pub fn add_entry(
    dev: &mut BlockDevice,
    geo: &Geometry,
    dir_ino: i32,
    name: &str,
    child: i32,
) -> Result<()> {
    let dir = Inode::read(dev, geo, dir_ino)?;
    if dir.num_blocks > 0 {
        let mut buf: Block = [0; BLOCK_SIZE];
        let blk = dir.data_block(dev, dir.num_blocks - 1, &mut buf)?;
        for slot in 0..ENTRIES_PER_BLOCK {
            if entry_at(&buf, slot).is_free() {
                set_entry(&mut buf, slot, &DirEntry::new(name, child));
                return dev.write_block(blk, &buf);
            }
        }
    }
    // No room in the last block: start a new one
    let blk = inode::append_block(dev, geo, dir_ino)?;
    let mut buf: Block = [0; BLOCK_SIZE];
    set_entry(&mut buf, 0, &DirEntry::new(name, child));
    dev.write_block(blk, &buf)
}

/// Looks up `name` in the directory held by `dir`.
///
/// Returns the inode number of the matching entry, or `None` when there is
/// none. Fails with [`Error::NotADir`] when `dir` is not a directory.
pub fn find(dev: &mut BlockDevice, dir: &Inode, name: &str) -> Result<Option<i32>> {
    if !dir.is_dir {
        return Err(Error::NotADir);
    }
    let mut buf: Block = [0; BLOCK_SIZE];
    for b in 0..dir.num_blocks {
        dir.data_block(dev, b, &mut buf)?;
        for slot in 0..ENTRIES_PER_BLOCK {
            let ent = entry_at(&buf, slot);
            if !ent.is_free() && ent.name() == name.as_bytes() {
                return Ok(Some(ent.inode));
            }
        }
    }
    Ok(None)
}

/// Tells whether the directory held by `dir` has no live entries.
pub fn is_empty(dev: &mut BlockDevice, dir: &Inode) -> Result<bool> {
    let mut buf: Block = [0; BLOCK_SIZE];
    for b in 0..dir.num_blocks {
        dir.data_block(dev, b, &mut buf)?;
        for slot in 0..ENTRIES_PER_BLOCK {
            if !entry_at(&buf, slot).is_free() {
                return Ok(false);
            }
        }
    }
    Ok(true)
}

/// Returns the names of all live entries of the directory held by `dir`.
pub fn list(dev: &mut BlockDevice, dir: &Inode) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let mut buf: Block = [0; BLOCK_SIZE];
    for b in 0..dir.num_blocks {
        dir.data_block(dev, b, &mut buf)?;
        for slot in 0..ENTRIES_PER_BLOCK {
            let ent = entry_at(&buf, slot);
            if !ent.is_free() {
                names.push(String::from_utf8_lossy(ent.name()).into_owned());
            }
        }
    }
    Ok(names)
}

/// Removes the entry named `name` from the directory held by inode
/// `dir_ino`.
///
/// The hole left behind is filled with the last live entry of the
/// directory's last block; if that block empties out, it is released and
/// the directory shrinks by one block.
pub fn remove_entry(dev: &mut BlockDevice, geo: &Geometry, dir_ino: i32, name: &str) -> Result<()> {
    let mut dir = Inode::read(dev, geo, dir_ino)?;
    // Locate the target entry
    let mut buf: Block = [0; BLOCK_SIZE];
    let mut target = None;
    'blocks: for b in 0..dir.num_blocks {
        let blk = dir.data_block(dev, b, &mut buf)?;
        for slot in 0..ENTRIES_PER_BLOCK {
            let ent = entry_at(&buf, slot);
            if !ent.is_free() && ent.name() == name.as_bytes() {
                target = Some((b, blk, slot));
                break 'blocks;
            }
        }
    }
    let Some((b, blk, slot)) = target else {
        return Err(Error::FileNotFound);
    };
    let last_b = dir.num_blocks - 1;
    let mut last_buf: Block = [0; BLOCK_SIZE];
    let last_blk = dir.data_block(dev, last_b, &mut last_buf)?;
    // First free slot of the last block bounds its live prefix
    let last_live = (0..ENTRIES_PER_BLOCK)
        .position(|slot| entry_at(&last_buf, slot).is_free())
        .unwrap_or(ENTRIES_PER_BLOCK);
    if last_live == 0 {
        // The live-prefix invariant guarantees the last block is never empty
        return Err(Error::Internal);
    }
    let last_live = last_live - 1;
    let empty = DirEntry::new("", 0);
    if b == last_b {
        let moved = entry_at(&buf, last_live);
        set_entry(&mut buf, slot, &moved);
        set_entry(&mut buf, last_live, &empty);
        dev.write_block(blk, &buf)?;
    } else {
        let moved = entry_at(&last_buf, last_live);
        set_entry(&mut buf, slot, &moved);
        set_entry(&mut last_buf, last_live, &empty);
        dev.write_block(blk, &buf)?;
        dev.write_block(last_blk, &last_buf)?;
    }
    if last_live == 0 {
        // The last block just emptied: give it back and shrink the directory
        alloc::free_block(dev, last_blk)?;
        dir.num_blocks -= 1;
        dir.write(dev, geo, dir_ino)?;
        inode::trim_indirection(dev, geo, dir_ino)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::Fs;
    use crate::inode::ROOT_INODE;
    use crate::superblock::Superblock;
    use tempfile::TempDir;

    #[test]
    fn entry_codec() {
        let ent = DirEntry::new("hello", 7);
        let mut buf = [0u8; ENTRY_SIZE];
        ent.encode(&mut buf);

        assert_eq!(&buf[..5], b"hello");
        assert!(buf[5..FILENAME_LEN].iter().all(|b| *b == 0));
        assert_eq!(buf[FILENAME_LEN], 7);
        assert_eq!(DirEntry::decode(&buf), ent);
        assert_eq!(DirEntry::decode(&buf).name(), b"hello");
    }

    #[test]
    fn add_and_find() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("img");
        Fs::format(&path, 32).unwrap();
        let mut dev = BlockDevice::open(&path).unwrap();
        let geo = Superblock::load(&mut dev).unwrap().geometry();

        add_entry(&mut dev, &geo, ROOT_INODE, "first", 1).unwrap();
        add_entry(&mut dev, &geo, ROOT_INODE, "second", 2).unwrap();

        let root = Inode::read(&mut dev, &geo, ROOT_INODE).unwrap();
        assert_eq!(find(&mut dev, &root, "first").unwrap(), Some(1));
        assert_eq!(find(&mut dev, &root, "second").unwrap(), Some(2));
        assert_eq!(find(&mut dev, &root, "third").unwrap(), None);
        // Exact match only
        assert_eq!(find(&mut dev, &root, "firs").unwrap(), None);
        assert_eq!(list(&mut dev, &root).unwrap(), ["first", "second"]);
    }

    #[test]
    fn find_on_file_fails() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("img");
        Fs::format(&path, 32).unwrap();
        let mut dev = BlockDevice::open(&path).unwrap();
        let geo = Superblock::load(&mut dev).unwrap().geometry();

        let ino = inode::alloc_inode(&mut dev, &geo).unwrap();
        let file = Inode::read(&mut dev, &geo, ino).unwrap();
        assert_eq!(find(&mut dev, &file, "x"), Err(Error::NotADir));
    }

    #[test]
    fn remove_swaps_last_entry() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("img");
        Fs::format(&path, 32).unwrap();
        let mut dev = BlockDevice::open(&path).unwrap();
        let geo = Superblock::load(&mut dev).unwrap().geometry();

        add_entry(&mut dev, &geo, ROOT_INODE, "a", 1).unwrap();
        add_entry(&mut dev, &geo, ROOT_INODE, "b", 2).unwrap();
        add_entry(&mut dev, &geo, ROOT_INODE, "c", 3).unwrap();
        remove_entry(&mut dev, &geo, ROOT_INODE, "a").unwrap();

        let root = Inode::read(&mut dev, &geo, ROOT_INODE).unwrap();
        // "c" moved into the hole, the prefix stays packed
        assert_eq!(list(&mut dev, &root).unwrap(), ["c", "b"]);
        assert_eq!(find(&mut dev, &root, "a").unwrap(), None);
    }

    #[test]
    fn remove_missing_entry() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("img");
        Fs::format(&path, 32).unwrap();
        let mut dev = BlockDevice::open(&path).unwrap();
        let geo = Superblock::load(&mut dev).unwrap().geometry();

        assert_eq!(
            remove_entry(&mut dev, &geo, ROOT_INODE, "ghost"),
            Err(Error::FileNotFound)
        );
    }
}
