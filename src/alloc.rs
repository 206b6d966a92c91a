//! The free-data-block allocator.
//!
//! Free data blocks form a singly-linked list rooted in the superblock: the
//! first four bytes of a free block hold the index of the next one, with
//! [`LIST_END`](crate::superblock::LIST_END) terminating the chain.

use crate::device::{BLOCK_SIZE, Block, BlockDevice};
use crate::error::{Error, Result};
use crate::superblock::Superblock;
use crate::util::{read_i32, write_i32};
use log::debug;

/// Pops the head of the free-data-block list and returns its index.
///
/// The returned block is zeroed on disk before being handed out.
pub fn alloc_block(dev: &mut BlockDevice) -> Result<i32> {
    let mut sb = Superblock::load(dev)?;
    let blk = sb.free_data_block_list;
    if blk < 0 {
        return Err(Error::DiskFull);
    }
    let mut buf: Block = [0; BLOCK_SIZE];
    dev.read_block(blk, &mut buf)?;
    sb.free_data_block_list = read_i32(&buf, 0);
    sb.blocks_allocated += 1;
    sb.store(dev)?;
    dev.write_block(blk, &[0; BLOCK_SIZE])?;
    debug!("allocated data block {blk}");
    Ok(blk)
}

/// Pushes block `blk` onto the free-data-block list.
pub fn free_block(dev: &mut BlockDevice, blk: i32) -> Result<()> {
    let mut sb = Superblock::load(dev)?;
    let mut buf: Block = [0; BLOCK_SIZE];
    write_i32(&mut buf, 0, sb.free_data_block_list);
    sb.free_data_block_list = blk;
    sb.blocks_allocated -= 1;
    dev.write_block(blk, &buf)?;
    sb.store(dev)?;
    debug!("freed data block {blk}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::Fs;
    use crate::superblock::LIST_END;
    use tempfile::TempDir;

    #[test]
    fn alloc_pops_and_zeroes() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("img");
        Fs::format(&path, 32).unwrap();
        let mut dev = BlockDevice::open(&path).unwrap();

        // The pool starts right after the root's initial block.
        let blk = alloc_block(&mut dev).unwrap();
        assert_eq!(blk, 4);

        let mut buf: Block = [0xaa; BLOCK_SIZE];
        dev.read_block(blk, &mut buf).unwrap();
        assert!(buf.iter().all(|b| *b == 0));

        let sb = Superblock::load(&mut dev).unwrap();
        assert_eq!(sb.free_data_block_list, 5);
        assert_eq!(sb.blocks_allocated, 1);
    }

    #[test]
    fn free_pushes_head() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("img");
        Fs::format(&path, 32).unwrap();
        let mut dev = BlockDevice::open(&path).unwrap();

        let a = alloc_block(&mut dev).unwrap();
        let b = alloc_block(&mut dev).unwrap();
        free_block(&mut dev, a).unwrap();

        let sb = Superblock::load(&mut dev).unwrap();
        assert_eq!(sb.free_data_block_list, a);
        assert_eq!(sb.blocks_allocated, 1);

        // The freed block links to the previous head.
        let mut buf: Block = [0; BLOCK_SIZE];
        dev.read_block(a, &mut buf).unwrap();
        assert_eq!(read_i32(&buf, 0), b + 1);
    }

    #[test]
    fn exhaustion_reports_disk_full() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("img");
        Fs::format(&path, 32).unwrap();
        let mut dev = BlockDevice::open(&path).unwrap();

        // 29 data blocks, one held by the root directory.
        for _ in 0..28 {
            alloc_block(&mut dev).unwrap();
        }
        assert_eq!(alloc_block(&mut dev), Err(Error::DiskFull));

        let sb = Superblock::load(&mut dev).unwrap();
        assert_eq!(sb.free_data_block_list, LIST_END);
    }
}
