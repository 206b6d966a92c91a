//! Helpers shared by the on-disk codecs.

/// Reads the little-endian 32-bit integer at byte offset `off` in `buf`.
pub(crate) fn read_i32(buf: &[u8], off: usize) -> i32 {
    let mut b = [0u8; 4];
    b.copy_from_slice(&buf[off..off + 4]);
    i32::from_le_bytes(b)
}

/// Writes `val` as a little-endian 32-bit integer at byte offset `off` in `buf`.
pub(crate) fn write_i32(buf: &mut [u8], off: usize, val: i32) {
    buf[off..off + 4].copy_from_slice(&val.to_le_bytes());
}
