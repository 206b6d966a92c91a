//! The filesystem handle and the public file API.

use crate::device::{BLOCK_SIZE, Block, BlockDevice};
use crate::dir;
use crate::error::{Error, Result};
use crate::inode::{
    self, BLOCK_UNSET, INODE_SIZE, INODES_PER_BLOCK, Inode, NEXT_FREE_USED, ROOT_INODE,
};
use crate::path;
use crate::superblock::{Geometry, LIST_END, MAGIC, Superblock};
use crate::util::write_i32;
use log::info;
use std::io;
use std::path::Path;

/// The maximum number of simultaneously open files.
pub const MAX_OPEN_FILES: usize = 20;
/// The minimum number of blocks in an image.
pub const MIN_BLOCKS: i32 = 32;

const B: i64 = BLOCK_SIZE as i64;

/// Origin of a seek operation. Discriminants match the on-wire commands.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Whence {
    /// Relative to the current cursor.
    Current = 0,
    /// Relative to the start of the file.
    Absolute = 1,
    /// Relative to the end of the file.
    End = 2,
}

impl TryFrom<i32> for Whence {
    type Error = Error;

    fn try_from(cmd: i32) -> Result<Self> {
        match cmd {
            0 => Ok(Self::Current),
            1 => Ok(Self::Absolute),
            2 => Ok(Self::End),
            _ => Err(Error::InvalidLseekCmd),
        }
    }
}

/// One slot of the open-file table.
#[derive(Clone, Copy, Default, Debug)]
struct OpenFile {
    /// Inode of the open file.
    inode: i32,
    /// Byte cursor of the handle.
    seek: i64,
    /// Whether the slot is in use.
    open: bool,
}

/// A mounted filesystem image.
///
/// The handle owns the backing file for its whole lifetime; dropping it
/// flushes pending writes. Handles returned by [`Fs::open_file`] index a
/// fixed-size table of cursors and are only meaningful on the `Fs` that
/// produced them.
#[derive(Debug)]
pub struct Fs {
    dev: BlockDevice,
    geo: Geometry,
    open_files: [OpenFile; MAX_OPEN_FILES],
}

impl Fs {
    /// Formats the image at `path` with `num_blocks` blocks, creating or
    /// truncating the file.
    ///
    /// The resulting image holds a superblock, `num_blocks / 32` inode
    /// blocks chained into a free-inode list, an empty root directory
    /// owning the first data block, and all remaining data blocks chained
    /// into the free-data-block list.
    pub fn format(path: &Path, num_blocks: u32) -> Result<()> {
        // The superblock stores the image size in bytes as a 32-bit integer
        if num_blocks as i64 * B > i32::MAX as i64 {
            return Err(Error::Internal);
        }
        let num_blocks = num_blocks as i32;
        if num_blocks < MIN_BLOCKS {
            return Err(Error::MinBlocks);
        }
        let geo = Geometry::new(num_blocks);
        let mut dev = BlockDevice::create(path)?;
        let zero: Block = [0; BLOCK_SIZE];
        // Boot block
        dev.write_block(0, &zero)?;
        // Superblock; the root takes the first data block, so the free pool
        // starts one block further
        let sb = Superblock {
            magic: MAGIC,
            disk_size: num_blocks * BLOCK_SIZE as i32,
            blocks_allocated: 0,
            max_blocks: geo.num_data_blocks,
            files_allocated: 1,
            max_files: geo.num_inodes,
            free_inode_list: 1,
            free_data_block_list: geo.first_data_block() + 1,
        };
        sb.store(&mut dev)?;
        // Inode blocks: the root in slot 0, every other inode chained free
        let mut buf: Block = zero;
        for j in 0..geo.num_inode_blocks {
            for i in 0..INODES_PER_BLOCK {
                let ino = j * INODES_PER_BLOCK as i32 + i as i32;
                let inode = if ino == ROOT_INODE {
                    let mut root = Inode {
                        next_free_inode: NEXT_FREE_USED,
                        is_dir: true,
                        num_blocks: 1,
                        ..Default::default()
                    };
                    root.direct[0] = geo.first_data_block();
                    root
                } else {
                    let next = if ino + 1 < geo.num_inodes {
                        ino + 1
                    } else {
                        LIST_END
                    };
                    let mut inode = Inode {
                        next_free_inode: next,
                        is_free: true,
                        ..Default::default()
                    };
                    inode.direct[0] = BLOCK_UNSET;
                    inode
                };
                inode.encode(&mut buf[i * INODE_SIZE..(i + 1) * INODE_SIZE]);
            }
            dev.write_block(2 + j, &buf)?;
        }
        // Root directory block, all entries free
        dev.write_block(geo.first_data_block(), &zero)?;
        // Free-data chain over the rest of the data region
        for d in geo.first_data_block() + 1..num_blocks {
            let next = if d + 1 < num_blocks { d + 1 } else { LIST_END };
            let mut fb: Block = zero;
            write_i32(&mut fb, 0, next);
            dev.write_block(d, &fb)?;
        }
        dev.sync()?;
        info!("formatted {}: {num_blocks} blocks, {} inodes", path.display(), geo.num_inodes);
        Ok(())
    }

    /// Opens the image at `path`, validating its superblock.
    pub fn open(path: &Path) -> Result<Self> {
        let mut dev = BlockDevice::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => Error::FileNotFound,
            _ => Error::from(e),
        })?;
        let sb = Superblock::load(&mut dev).map_err(|_| Error::FileNotFound)?;
        if sb.magic != MAGIC {
            return Err(Error::InvalidDiskFile);
        }
        let geo = sb.geometry();
        info!(
            "mounted {}: {} blocks, {} inodes, {} data blocks",
            path.display(),
            geo.num_blocks,
            geo.num_inodes,
            geo.num_data_blocks
        );
        Ok(Self {
            dev,
            geo,
            open_files: [OpenFile::default(); MAX_OPEN_FILES],
        })
    }

    /// Returns the image's geometry.
    pub fn geometry(&self) -> &Geometry {
        &self.geo
    }

    /// Returns a fresh copy of the on-disk superblock.
    pub fn superblock(&mut self) -> Result<Superblock> {
        Superblock::load(&mut self.dev)
    }

    /// Creates an empty regular file at `path`.
    pub fn create(&mut self, path: &str) -> Result<()> {
        self.create_node(path, false)
    }

    /// Creates an empty directory at `path`.
    pub fn mkdir(&mut self, path: &str) -> Result<()> {
        self.create_node(path, true)
    }

    fn create_node(&mut self, p: &str, is_dir: bool) -> Result<()> {
        if p == "/" {
            return Err(Error::FileExists);
        }
        let (parent_path, leaf) = path::split(p)?;
        let Some(parent_ino) = path::resolve(&mut self.dev, &self.geo, parent_path)? else {
            return Err(Error::InvalidPath);
        };
        let parent = Inode::read(&mut self.dev, &self.geo, parent_ino)?;
        match dir::find(&mut self.dev, &parent, leaf) {
            Ok(Some(_)) => return Err(Error::FileExists),
            Ok(None) => {}
            Err(Error::NotADir) => return Err(Error::InvalidPath),
            Err(e) => return Err(e),
        }
        let ino = inode::alloc_inode(&mut self.dev, &self.geo)?;
        if is_dir {
            let mut inode = Inode::read(&mut self.dev, &self.geo, ino)?;
            inode.is_dir = true;
            inode.write(&mut self.dev, &self.geo, ino)?;
        }
        dir::add_entry(&mut self.dev, &self.geo, parent_ino, leaf, ino)
    }

    /// Opens the regular file at `path` and returns a handle into the
    /// open-file table.
    ///
    /// A file may be opened several times; each handle keeps its own
    /// cursor, starting at 0.
    pub fn open_file(&mut self, path: &str) -> Result<usize> {
        let Some(ino) = path::resolve(&mut self.dev, &self.geo, path)? else {
            return Err(Error::FileNotFound);
        };
        let inode = Inode::read(&mut self.dev, &self.geo, ino)?;
        if inode.is_dir {
            return Err(Error::FileNotFound);
        }
        let Some(slot) = self.open_files.iter().position(|f| !f.open) else {
            return Err(Error::TooManyFilesOpen);
        };
        self.open_files[slot] = OpenFile {
            inode: ino,
            seek: 0,
            open: true,
        };
        Ok(slot)
    }

    /// Closes `handle`. Closing a handle that is not open is a no-op; there
    /// is nothing to flush since every write goes straight to the image.
    pub fn close_file(&mut self, handle: usize) {
        if let Some(f) = self.open_files.get_mut(handle) {
            f.open = false;
        }
    }

    fn handle(&self, handle: usize) -> Result<OpenFile> {
        self.open_files
            .get(handle)
            .copied()
            .filter(|f| f.open)
            .ok_or(Error::FileNotOpen)
    }

    /// Reads from the handle's cursor into `buf`, returning the number of
    /// bytes read.
    ///
    /// Reads stop at the end of the file; a cursor at or past the end
    /// yields 0.
    pub fn read(&mut self, handle: usize, buf: &mut [u8]) -> Result<usize> {
        let f = self.handle(handle)?;
        let inode = Inode::read(&mut self.dev, &self.geo, f.inode)?;
        let size = inode.num_blocks as i64 * B;
        let mut done = 0;
        let mut pos = f.seek;
        let mut blk: Block = [0; BLOCK_SIZE];
        while done < buf.len() && pos < size {
            let boff = (pos % B) as usize;
            inode.data_block(&mut self.dev, (pos / B) as i32, &mut blk)?;
            let n = (BLOCK_SIZE - boff)
                .min(buf.len() - done)
                .min((size - pos) as usize);
            buf[done..done + n].copy_from_slice(&blk[boff..boff + n]);
            done += n;
            pos += n as i64;
        }
        self.open_files[handle].seek = f.seek + done as i64;
        Ok(done)
    }

    /// Writes `buf` at the handle's cursor, growing the file as needed.
    ///
    /// Returns the number of bytes written, which falls short of
    /// `buf.len()` when the image runs out of blocks or the file reaches
    /// its maximum size; bytes past the last allocated block are dropped.
    pub fn write(&mut self, handle: usize, buf: &[u8]) -> Result<usize> {
        let f = self.handle(handle)?;
        let mut inode = Inode::read(&mut self.dev, &self.geo, f.inode)?;
        // Grow until the write fits or no more blocks can be had
        while inode.num_blocks as i64 * B - f.seek < buf.len() as i64 {
            match inode::append_block(&mut self.dev, &self.geo, f.inode) {
                Ok(_) => inode = Inode::read(&mut self.dev, &self.geo, f.inode)?,
                Err(Error::Internal) => return Err(Error::Internal),
                Err(_) => break,
            }
        }
        let size = inode.num_blocks as i64 * B;
        let mut done = 0;
        let mut pos = f.seek;
        let mut blk: Block = [0; BLOCK_SIZE];
        while done < buf.len() && pos < size {
            let boff = (pos % B) as usize;
            let abs = inode.data_block(&mut self.dev, (pos / B) as i32, &mut blk)?;
            let n = (BLOCK_SIZE - boff)
                .min(buf.len() - done)
                .min((size - pos) as usize);
            blk[boff..boff + n].copy_from_slice(&buf[done..done + n]);
            self.dev.write_block(abs, &blk)?;
            done += n;
            pos += n as i64;
        }
        self.open_files[handle].seek = f.seek + done as i64;
        Ok(done)
    }

    /// Moves the handle's cursor and returns the new position.
    ///
    /// A target past the end of the file extends it with zeroed blocks; if
    /// the image fills up before the target is reached, the cursor lands on
    /// the last valid byte instead.
    pub fn seek(&mut self, handle: usize, offset: i64, whence: Whence) -> Result<u64> {
        let f = self.handle(handle)?;
        let inode = Inode::read(&mut self.dev, &self.geo, f.inode)?;
        let size = inode.num_blocks as i64 * B;
        let new_seek = match whence {
            Whence::Current => f.seek + offset,
            Whence::Absolute => offset,
            Whence::End => size + offset,
        };
        if new_seek < 0 {
            return Err(Error::InvalidLseekOffset);
        }
        if new_seek <= size {
            self.open_files[handle].seek = new_seek;
            return Ok(new_seek as u64);
        }
        let mut needed = (new_seek + B - 1) / B - inode.num_blocks as i64;
        while needed > 0 {
            match inode::append_block(&mut self.dev, &self.geo, f.inode) {
                Ok(_) => needed -= 1,
                Err(Error::Internal) => return Err(Error::Internal),
                Err(_) => break,
            }
        }
        let new_seek = if needed == 0 {
            new_seek
        } else {
            let inode = Inode::read(&mut self.dev, &self.geo, f.inode)?;
            (inode.num_blocks as i64 * B - 1).max(0)
        };
        self.open_files[handle].seek = new_seek;
        Ok(new_seek as u64)
    }

    /// Deletes the regular file at `path`.
    pub fn remove(&mut self, path: &str) -> Result<()> {
        let Some(ino) = path::resolve(&mut self.dev, &self.geo, path)? else {
            return Err(Error::FileNotFound);
        };
        let inode = Inode::read(&mut self.dev, &self.geo, ino)?;
        if inode.is_dir {
            return Err(Error::NotAFile);
        }
        self.delete_node(path, ino)
    }

    /// Removes the directory at `path`, which must have no entries left.
    pub fn rmdir(&mut self, path: &str) -> Result<()> {
        let Some(ino) = path::resolve(&mut self.dev, &self.geo, path)? else {
            return Err(Error::FileNotFound);
        };
        let inode = Inode::read(&mut self.dev, &self.geo, ino)?;
        if !inode.is_dir {
            return Err(Error::NotADir);
        }
        if !dir::is_empty(&mut self.dev, &inode)? {
            return Err(Error::InvalidPath);
        }
        self.delete_node(path, ino)
    }

    fn delete_node(&mut self, p: &str, ino: i32) -> Result<()> {
        if p == "/" {
            return Err(Error::FileExists);
        }
        let (parent_path, leaf) = path::split(p)?;
        let Some(parent_ino) = path::resolve(&mut self.dev, &self.geo, parent_path)? else {
            return Err(Error::InvalidPath);
        };
        inode::erase_inode(&mut self.dev, &self.geo, ino)?;
        dir::remove_entry(&mut self.dev, &self.geo, parent_ino, leaf)
    }

    /// Returns the names of the entries of the directory at `path`.
    pub fn list_dir(&mut self, path: &str) -> Result<Vec<String>> {
        let Some(ino) = path::resolve(&mut self.dev, &self.geo, path)? else {
            return Err(Error::FileNotFound);
        };
        let inode = Inode::read(&mut self.dev, &self.geo, ino)?;
        if !inode.is_dir {
            return Err(Error::NotADir);
        }
        dir::list(&mut self.dev, &inode)
    }

    /// Prints the names of the entries of the directory at `path`, one per
    /// line.
    pub fn print_dir(&mut self, path: &str) -> Result<()> {
        for name in self.list_dir(path)? {
            println!("{name}");
        }
        Ok(())
    }
}

impl Drop for Fs {
    fn drop(&mut self) {
        let _ = self.dev.sync();
    }
}
