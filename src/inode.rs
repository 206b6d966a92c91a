//! Inode storage and the block map.
//!
//! Inodes live in a fixed region starting at block 2, eight per block. The
//! block map resolves a file-relative block index to an absolute disk block
//! through the inode's direct pointers, a single indirection block, or two
//! levels of indirection, and grows files one block at a time.

use crate::alloc;
use crate::device::{BLOCK_SIZE, Block, BlockDevice};
use crate::error::{Error, Result};
use crate::superblock::{Geometry, Superblock};
use crate::util::{read_i32, write_i32};
use log::debug;

/// The size of an on-disk inode in bytes.
pub const INODE_SIZE: usize = 64;
/// The number of inodes in one inode block.
pub const INODES_PER_BLOCK: usize = BLOCK_SIZE / INODE_SIZE;
/// The number of direct block pointers in an inode.
pub const DIRECT_BLOCKS_COUNT: usize = 10;
/// The number of block pointers in an indirection block.
pub const POINTERS_PER_BLOCK: usize = BLOCK_SIZE / 4;
/// The maximum number of data blocks in a file.
pub const MAX_FILE_BLOCKS: usize =
    DIRECT_BLOCKS_COUNT + POINTERS_PER_BLOCK + POINTERS_PER_BLOCK * POINTERS_PER_BLOCK;

/// `next_free_inode` value marking an inode in use.
pub const NEXT_FREE_USED: i32 = -2;
/// `direct[0]` sentinel on a free inode, distinct from valid block indices.
pub const BLOCK_UNSET: i32 = -3;

/// The inode number of the root directory.
pub const ROOT_INODE: i32 = 0;

/// On-disk metadata of one file or directory.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Inode {
    /// Next inode on the free list; -1 terminates the list, -2 marks the
    /// inode as in use.
    pub next_free_inode: i32,
    /// Whether the inode is on the free list.
    pub is_free: bool,
    /// Number of data blocks of the file. Indirection blocks are not
    /// counted; their presence follows from this value alone.
    pub num_blocks: i32,
    /// Whether the inode holds a directory.
    pub is_dir: bool,
    /// Direct data block pointers.
    pub direct: [i32; DIRECT_BLOCKS_COUNT],
    /// Single indirection block, or 0 if absent.
    pub indirect1: i32,
    /// Double indirection block, or 0 if absent.
    pub indirect2: i32,
}

/// Returns the index of the block containing inode `ino`.
fn inode_block_index(ino: i32) -> i32 {
    ino / INODES_PER_BLOCK as i32 + 2
}

impl Inode {
    /// Reads inode `ino` from the image.
    pub fn read(dev: &mut BlockDevice, geo: &Geometry, ino: i32) -> Result<Self> {
        if ino < 0 || ino >= geo.num_inodes {
            return Err(Error::Internal);
        }
        let mut buf: Block = [0; BLOCK_SIZE];
        dev.read_block(inode_block_index(ino), &mut buf)?;
        let off = ino as usize % INODES_PER_BLOCK * INODE_SIZE;
        Ok(Self::decode(&buf[off..off + INODE_SIZE]))
    }

    /// Writes the inode back in place, leaving its block siblings untouched.
    pub fn write(&self, dev: &mut BlockDevice, geo: &Geometry, ino: i32) -> Result<()> {
        if ino < 0 || ino >= geo.num_inodes {
            return Err(Error::Internal);
        }
        let blk = inode_block_index(ino);
        let mut buf: Block = [0; BLOCK_SIZE];
        dev.read_block(blk, &mut buf)?;
        let off = ino as usize % INODES_PER_BLOCK * INODE_SIZE;
        self.encode(&mut buf[off..off + INODE_SIZE]);
        dev.write_block(blk, &buf)
    }

    pub(crate) fn decode(buf: &[u8]) -> Self {
        let mut direct = [0; DIRECT_BLOCKS_COUNT];
        for (i, d) in direct.iter_mut().enumerate() {
            *d = read_i32(buf, 16 + i * 4);
        }
        Self {
            next_free_inode: read_i32(buf, 0),
            is_free: read_i32(buf, 4) != 0,
            num_blocks: read_i32(buf, 8),
            is_dir: read_i32(buf, 12) != 0,
            direct,
            indirect1: read_i32(buf, 56),
            indirect2: read_i32(buf, 60),
        }
    }

    pub(crate) fn encode(&self, buf: &mut [u8]) {
        write_i32(buf, 0, self.next_free_inode);
        write_i32(buf, 4, self.is_free as i32);
        write_i32(buf, 8, self.num_blocks);
        write_i32(buf, 12, self.is_dir as i32);
        for (i, d) in self.direct.iter().enumerate() {
            write_i32(buf, 16 + i * 4, *d);
        }
        write_i32(buf, 56, self.indirect1);
        write_i32(buf, 60, self.indirect2);
    }

    /// Resolves the file-relative block index `k` to an absolute block index.
    pub fn locate_block(&self, dev: &mut BlockDevice, k: i32) -> Result<i32> {
        match block_path(k)? {
            BlockPath::Direct(i) => Ok(self.direct[i]),
            BlockPath::Single(i) => {
                let mut buf: Block = [0; BLOCK_SIZE];
                dev.read_block(self.indirect1, &mut buf)?;
                Ok(read_i32(&buf, i * 4))
            }
            BlockPath::Double(i, j) => {
                let mut buf: Block = [0; BLOCK_SIZE];
                dev.read_block(self.indirect2, &mut buf)?;
                let second = read_i32(&buf, i * 4);
                dev.read_block(second, &mut buf)?;
                Ok(read_i32(&buf, j * 4))
            }
        }
    }

    /// Resolves file-relative block `k`, reads it into `buf` and returns its
    /// absolute index.
    pub fn data_block(&self, dev: &mut BlockDevice, k: i32, buf: &mut Block) -> Result<i32> {
        let blk = self.locate_block(dev, k)?;
        dev.read_block(blk, buf)?;
        Ok(blk)
    }
}

/// The indirection path leading to a file-relative block.
#[derive(Debug)]
enum BlockPath {
    /// Slot in the inode's direct array.
    Direct(usize),
    /// Slot in the single indirection block.
    Single(usize),
    /// Slots in the double indirection block and its second level.
    Double(usize, usize),
}

fn block_path(k: i32) -> Result<BlockPath> {
    if k < 0 {
        return Err(Error::PastEnd);
    }
    let k = k as usize;
    if k < DIRECT_BLOCKS_COUNT {
        Ok(BlockPath::Direct(k))
    } else if k < DIRECT_BLOCKS_COUNT + POINTERS_PER_BLOCK {
        Ok(BlockPath::Single(k - DIRECT_BLOCKS_COUNT))
    } else if k < MAX_FILE_BLOCKS {
        let off = k - DIRECT_BLOCKS_COUNT - POINTERS_PER_BLOCK;
        Ok(BlockPath::Double(
            off / POINTERS_PER_BLOCK,
            off % POINTERS_PER_BLOCK,
        ))
    } else {
        Err(Error::PastEnd)
    }
}

/// Pops the head of the free-inode list and resets it to a used, empty state.
pub fn alloc_inode(dev: &mut BlockDevice, geo: &Geometry) -> Result<i32> {
    let mut sb = Superblock::load(dev)?;
    let ino = sb.free_inode_list;
    if ino < 0 {
        return Err(Error::MaxFiles);
    }
    let prev = Inode::read(dev, geo, ino)?;
    sb.free_inode_list = prev.next_free_inode;
    sb.files_allocated += 1;
    let inode = Inode {
        next_free_inode: NEXT_FREE_USED,
        ..Default::default()
    };
    inode.write(dev, geo, ino)?;
    sb.store(dev)?;
    debug!("allocated inode {ino}");
    Ok(ino)
}

/// Appends one data block to the file held by inode `ino` and returns the
/// new block's absolute index.
///
/// The inode is reloaded and persisted here; callers holding a copy must
/// reread it afterwards.
pub fn append_block(dev: &mut BlockDevice, geo: &Geometry, ino: i32) -> Result<i32> {
    let mut inode = Inode::read(dev, geo, ino)?;
    let k = inode.num_blocks;
    let path = block_path(k)?;
    let new_db = alloc::alloc_block(dev)?;
    match path {
        BlockPath::Direct(i) => inode.direct[i] = new_db,
        BlockPath::Single(0) => {
            // First block past the direct range: set up the indirection block
            let ind = alloc::alloc_block(dev)?;
            let mut buf: Block = [0; BLOCK_SIZE];
            write_i32(&mut buf, 0, new_db);
            dev.write_block(ind, &buf)?;
            inode.indirect1 = ind;
        }
        BlockPath::Single(i) => {
            let mut buf: Block = [0; BLOCK_SIZE];
            dev.read_block(inode.indirect1, &mut buf)?;
            write_i32(&mut buf, i * 4, new_db);
            dev.write_block(inode.indirect1, &buf)?;
        }
        BlockPath::Double(0, 0) => {
            // First block past the single-indirect range: set up both levels
            let top = alloc::alloc_block(dev)?;
            let second = alloc::alloc_block(dev)?;
            let mut buf: Block = [0; BLOCK_SIZE];
            write_i32(&mut buf, 0, new_db);
            dev.write_block(second, &buf)?;
            let mut buf: Block = [0; BLOCK_SIZE];
            write_i32(&mut buf, 0, second);
            dev.write_block(top, &buf)?;
            inode.indirect2 = top;
        }
        BlockPath::Double(i, 0) => {
            // Crossing into a fresh second-level block
            let second = alloc::alloc_block(dev)?;
            let mut buf: Block = [0; BLOCK_SIZE];
            write_i32(&mut buf, 0, new_db);
            dev.write_block(second, &buf)?;
            let mut top_buf: Block = [0; BLOCK_SIZE];
            dev.read_block(inode.indirect2, &mut top_buf)?;
            write_i32(&mut top_buf, i * 4, second);
            dev.write_block(inode.indirect2, &top_buf)?;
        }
        BlockPath::Double(i, j) => {
            let mut top_buf: Block = [0; BLOCK_SIZE];
            dev.read_block(inode.indirect2, &mut top_buf)?;
            let second = read_i32(&top_buf, i * 4);
            let mut buf: Block = [0; BLOCK_SIZE];
            dev.read_block(second, &mut buf)?;
            write_i32(&mut buf, j * 4, new_db);
            dev.write_block(second, &buf)?;
        }
    }
    inode.num_blocks = k + 1;
    inode.write(dev, geo, ino)?;
    Ok(new_db)
}

/// Frees indirection blocks that became unreachable after the file shrank.
pub fn trim_indirection(dev: &mut BlockDevice, geo: &Geometry, ino: i32) -> Result<()> {
    let mut inode = Inode::read(dev, geo, ino)?;
    let n = inode.num_blocks as usize;
    let mut dirty = false;
    if n < DIRECT_BLOCKS_COUNT && inode.indirect1 != 0 {
        alloc::free_block(dev, inode.indirect1)?;
        inode.indirect1 = 0;
        dirty = true;
    }
    if n < DIRECT_BLOCKS_COUNT + POINTERS_PER_BLOCK && inode.indirect2 != 0 {
        alloc::free_block(dev, inode.indirect2)?;
        inode.indirect2 = 0;
        dirty = true;
    }
    if dirty {
        inode.write(dev, geo, ino)?;
        return Ok(());
    }
    // Inside the double-indirect range, a second-level block empties out
    // exactly when the count falls on a fanout boundary.
    if (DIRECT_BLOCKS_COUNT + POINTERS_PER_BLOCK..MAX_FILE_BLOCKS).contains(&n)
        && (n - DIRECT_BLOCKS_COUNT - POINTERS_PER_BLOCK) % POINTERS_PER_BLOCK == 0
        && inode.indirect2 != 0
    {
        let slot = (n - DIRECT_BLOCKS_COUNT - POINTERS_PER_BLOCK) / POINTERS_PER_BLOCK;
        let mut buf: Block = [0; BLOCK_SIZE];
        dev.read_block(inode.indirect2, &mut buf)?;
        let second = read_i32(&buf, slot * 4);
        if second != 0 {
            alloc::free_block(dev, second)?;
            write_i32(&mut buf, slot * 4, 0);
            dev.write_block(inode.indirect2, &buf)?;
        }
    }
    Ok(())
}

/// Frees every block of inode `ino`, resets it and pushes it back onto the
/// free-inode list.
pub fn erase_inode(dev: &mut BlockDevice, geo: &Geometry, ino: i32) -> Result<()> {
    let mut inode = Inode::read(dev, geo, ino)?;
    // Data blocks, from the tail down
    while inode.num_blocks > 0 {
        let blk = inode.locate_block(dev, inode.num_blocks - 1)?;
        alloc::free_block(dev, blk)?;
        inode.num_blocks -= 1;
    }
    if inode.indirect1 != 0 {
        alloc::free_block(dev, inode.indirect1)?;
        inode.indirect1 = 0;
    }
    if inode.indirect2 != 0 {
        let mut buf: Block = [0; BLOCK_SIZE];
        dev.read_block(inode.indirect2, &mut buf)?;
        for i in 0..POINTERS_PER_BLOCK {
            let second = read_i32(&buf, i * 4);
            if second != 0 {
                alloc::free_block(dev, second)?;
            }
        }
        alloc::free_block(dev, inode.indirect2)?;
        inode.indirect2 = 0;
    }
    inode.direct = [0; DIRECT_BLOCKS_COUNT];
    inode.is_dir = false;
    inode.is_free = true;
    let mut sb = Superblock::load(dev)?;
    inode.next_free_inode = sb.free_inode_list;
    sb.free_inode_list = ino;
    sb.files_allocated -= 1;
    inode.write(dev, geo, ino)?;
    sb.store(dev)?;
    debug!("erased inode {ino}");
    Ok(())
}
