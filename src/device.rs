//! Block device abstraction over the host image file.
//!
//! The image is addressed as a sequence of fixed-size blocks; every read and
//! write is absolutely positioned and covers exactly one block.

use crate::error::{Error, Result};
use libc::ioctl;
use std::ffi::c_long;
use std::fs;
use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::io::Read;
use std::io::Seek;
use std::io::SeekFrom;
use std::io::Write;
use std::os::fd::AsRawFd;
use std::os::unix::fs::FileTypeExt;
use std::path::Path;

/// The size of a block in bytes.
pub const BLOCK_SIZE: usize = 512;

/// A single block worth of bytes.
pub type Block = [u8; BLOCK_SIZE];

/// ioctl macro: Command.
macro_rules! ioc {
    ($a:expr, $b:expr, $c:expr, $d:expr) => {
        (($a) << 30) | (($b) << 8) | ($c) | (($d) << 16)
    };
}

/// ioctl macro: Read command.
macro_rules! ior {
    ($a:expr, $b:expr, $c:ty) => {
        ioc!(2, $a, $b, std::mem::size_of::<$c>() as c_long)
    };
}

/// ioctl command: Get size of disk in bytes.
const BLKGETSIZE64: c_long = ior!(0x12, 114, u64);

/// The host file backing a filesystem image.
#[derive(Debug)]
pub struct BlockDevice {
    file: File,
}

impl BlockDevice {
    /// Opens the image at `path` for read/write access.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self { file })
    }

    /// Creates the image at `path`, truncating any previous content.
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self { file })
    }

    /// Reads the block at index `n` into `buf`.
    pub fn read_block(&mut self, n: i32, buf: &mut Block) -> Result<()> {
        if n < 0 {
            return Err(Error::Internal);
        }
        self.file
            .seek(SeekFrom::Start(n as u64 * BLOCK_SIZE as u64))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    /// Writes `buf` to the block at index `n`.
    pub fn write_block(&mut self, n: i32, buf: &Block) -> Result<()> {
        if n < 0 {
            return Err(Error::Internal);
        }
        self.file
            .seek(SeekFrom::Start(n as u64 * BLOCK_SIZE as u64))?;
        self.file.write_all(buf)?;
        Ok(())
    }

    /// Flushes all pending writes to the host file.
    pub fn sync(&self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}

/// Returns the size of the device or image at `path` in blocks.
pub fn device_size(path: &Path) -> io::Result<u64> {
    let metadata = fs::metadata(path)?;
    let file_type = metadata.file_type();
    if file_type.is_block_device() || file_type.is_char_device() {
        let dev = File::open(path)?;
        let mut size = 0u64;
        let ret = unsafe { ioctl(dev.as_raw_fd(), BLKGETSIZE64 as _, &mut size) };
        if ret < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(size / BLOCK_SIZE as u64)
    } else if file_type.is_file() {
        Ok(metadata.len() / BLOCK_SIZE as u64)
    } else {
        Ok(0)
    }
}
