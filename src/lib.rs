//! Unix-style block filesystem stored inside a single image file.
//!
//! The image is self-describing: block 0 is reserved, block 1 holds the
//! superblock, a fixed region of inode blocks follows, and the rest of the
//! image is data blocks. Free inodes and free data blocks form singly-linked
//! lists rooted in the superblock. Files grow through ten direct block
//! pointers, then one and two levels of indirection, up to about 8 MiB.
//!
//! [`Fs`] is the entry point: [`Fs::format`] initializes an image,
//! [`Fs::open`] mounts it and gives byte-granular file access through a
//! small table of open handles.

pub mod alloc;
pub mod device;
pub mod dir;
pub mod error;
pub mod fs;
pub mod inode;
pub mod path;
pub mod superblock;
mod util;

pub use device::BLOCK_SIZE;
pub use error::{Error, Result};
pub use fs::{Fs, MAX_OPEN_FILES, MIN_BLOCKS, Whence};
