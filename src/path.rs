//! Absolute path resolution.

use crate::device::BlockDevice;
use crate::dir;
use crate::dir::FILENAME_LEN;
use crate::error::{Error, Result};
use crate::inode::{Inode, ROOT_INODE};
use crate::superblock::Geometry;

/// The maximum length of a single path component.
pub const MAX_NAME_LEN: usize = FILENAME_LEN - 1;

/// Resolves the absolute path `path` to an inode number, walking
/// component-by-component from the root.
///
/// Empty components (leading or repeated slashes) are skipped; `"/"` thus
/// resolves to the root inode. Returns `None` when a component does not
/// exist or a non-final component is not a directory.
pub fn resolve(dev: &mut BlockDevice, geo: &Geometry, path: &str) -> Result<Option<i32>> {
    let mut cur = ROOT_INODE;
    for comp in path.split('/').filter(|c| !c.is_empty()) {
        let inode = Inode::read(dev, geo, cur)?;
        match dir::find(dev, &inode, comp) {
            Ok(Some(next)) => cur = next,
            Ok(None) | Err(Error::NotADir) => return Ok(None),
            Err(e) => return Err(e),
        }
    }
    Ok(Some(cur))
}

/// Splits `path` into its parent path and final component, stripping one
/// trailing slash first.
///
/// Fails with [`Error::InvalidPath`] when the path has no separator or the
/// final component is empty or does not fit a directory entry.
pub fn split(path: &str) -> Result<(&str, &str)> {
    let path = path.strip_suffix('/').unwrap_or(path);
    let Some((parent, leaf)) = path.rsplit_once('/') else {
        return Err(Error::InvalidPath);
    };
    if leaf.is_empty() || leaf.len() > MAX_NAME_LEN || leaf.contains('\0') {
        return Err(Error::InvalidPath);
    }
    Ok((parent, leaf))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_paths() {
        assert_eq!(split("/a").unwrap(), ("", "a"));
        assert_eq!(split("/a/").unwrap(), ("", "a"));
        assert_eq!(split("/d/f").unwrap(), ("/d", "f"));
        assert_eq!(split("/a/b/c").unwrap(), ("/a/b", "c"));
    }

    #[test]
    fn split_invalid() {
        assert_eq!(split(""), Err(Error::InvalidPath));
        assert_eq!(split("name"), Err(Error::InvalidPath));
        assert_eq!(split("//"), Err(Error::InvalidPath));
        // Eleven characters fit a directory entry, twelve do not
        assert_eq!(split("/abcdefghijk").unwrap(), ("", "abcdefghijk"));
        assert_eq!(split("/abcdefghijkl"), Err(Error::InvalidPath));
    }
}
