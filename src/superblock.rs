//! The superblock and the image geometry derived from it.

use crate::device::{BLOCK_SIZE, Block, BlockDevice};
use crate::error::Result;
use crate::inode::INODES_PER_BLOCK;
use crate::util::{read_i32, write_i32};

/// The signature identifying a formatted image, stored little-endian.
pub const MAGIC: i32 = 12345;

/// The index of the block holding the superblock.
pub const SUPERBLOCK_INDEX: i32 = 1;

/// Terminator of the free-inode and free-data-block lists.
pub const LIST_END: i32 = -1;

/// The superblock, stored at block 1 of the image.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Superblock {
    /// Signature identifying the layout.
    pub magic: i32,
    /// Size of the image in bytes.
    pub disk_size: i32,
    /// Number of data blocks currently handed out by the allocator.
    pub blocks_allocated: i32,
    /// Total number of data blocks.
    pub max_blocks: i32,
    /// Number of inodes in use.
    pub files_allocated: i32,
    /// Total number of inodes.
    pub max_files: i32,
    /// Head of the free-inode list, or [`LIST_END`] if empty.
    pub free_inode_list: i32,
    /// Head of the free-data-block list, or [`LIST_END`] if empty.
    pub free_data_block_list: i32,
}

impl Superblock {
    /// Reads the superblock from the image.
    pub fn load(dev: &mut BlockDevice) -> Result<Self> {
        let mut buf: Block = [0; BLOCK_SIZE];
        dev.read_block(SUPERBLOCK_INDEX, &mut buf)?;
        Ok(Self::decode(&buf))
    }

    /// Writes the superblock back to the image.
    pub fn store(&self, dev: &mut BlockDevice) -> Result<()> {
        let mut buf: Block = [0; BLOCK_SIZE];
        self.encode(&mut buf);
        dev.write_block(SUPERBLOCK_INDEX, &buf)
    }

    fn decode(buf: &Block) -> Self {
        Self {
            magic: read_i32(buf, 0),
            disk_size: read_i32(buf, 4),
            blocks_allocated: read_i32(buf, 8),
            max_blocks: read_i32(buf, 12),
            files_allocated: read_i32(buf, 16),
            max_files: read_i32(buf, 20),
            free_inode_list: read_i32(buf, 24),
            free_data_block_list: read_i32(buf, 28),
        }
    }

    fn encode(&self, buf: &mut Block) {
        write_i32(buf, 0, self.magic);
        write_i32(buf, 4, self.disk_size);
        write_i32(buf, 8, self.blocks_allocated);
        write_i32(buf, 12, self.max_blocks);
        write_i32(buf, 16, self.files_allocated);
        write_i32(buf, 20, self.max_files);
        write_i32(buf, 24, self.free_inode_list);
        write_i32(buf, 28, self.free_data_block_list);
    }

    /// Returns the geometry described by the superblock.
    pub fn geometry(&self) -> Geometry {
        Geometry::new(self.disk_size / BLOCK_SIZE as i32)
    }
}

/// The block layout of an image, derived from its total block count.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Geometry {
    /// Total number of blocks.
    pub num_blocks: i32,
    /// Number of blocks holding inodes.
    pub num_inode_blocks: i32,
    /// Total number of inodes.
    pub num_inodes: i32,
    /// Number of data blocks.
    pub num_data_blocks: i32,
}

impl Geometry {
    /// Derives the geometry of an image of `num_blocks` blocks.
    pub fn new(num_blocks: i32) -> Self {
        let num_inode_blocks = num_blocks / 32;
        Self {
            num_blocks,
            num_inode_blocks,
            num_inodes: num_inode_blocks * INODES_PER_BLOCK as i32,
            num_data_blocks: num_blocks - 2 - num_inode_blocks,
        }
    }

    /// Returns the index of the first block of the data region.
    pub fn first_data_block(&self) -> i32 {
        self.num_inode_blocks + 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_layout() {
        let sb = Superblock {
            magic: MAGIC,
            disk_size: 32 * BLOCK_SIZE as i32,
            blocks_allocated: 0,
            max_blocks: 29,
            files_allocated: 1,
            max_files: 8,
            free_inode_list: 1,
            free_data_block_list: 4,
        };
        let mut buf: Block = [0; BLOCK_SIZE];
        sb.encode(&mut buf);

        // The signature sits in the first four bytes, little-endian.
        assert_eq!(buf[0..4], [0x39, 0x30, 0x00, 0x00]);
        assert_eq!(Superblock::decode(&buf), sb);
        // The remainder of the block is padding.
        assert!(buf[32..].iter().all(|b| *b == 0));
    }

    #[test]
    fn geometry_32_blocks() {
        let geo = Geometry::new(32);
        assert_eq!(geo.num_inode_blocks, 1);
        assert_eq!(geo.num_inodes, 8);
        assert_eq!(geo.num_data_blocks, 29);
        assert_eq!(geo.first_data_block(), 3);
    }

    #[test]
    fn geometry_from_superblock() {
        let sb = Superblock {
            disk_size: 256 * BLOCK_SIZE as i32,
            ..Default::default()
        };
        let geo = sb.geometry();
        assert_eq!(geo.num_blocks, 256);
        assert_eq!(geo.num_inode_blocks, 8);
        assert_eq!(geo.num_inodes, 64);
        assert_eq!(geo.num_data_blocks, 246);
    }
}
