//! Bounds-checked integer access for fixed-layout headers.

use crate::error::{Error, Result};

/// Borrows `len` bytes at `offset`, failing with `TruncatedInput` if they are not there.
pub fn slice_at<'a>(data: &'a [u8], offset: usize, len: usize, what: &str) -> Result<&'a [u8]> {
    let end = offset
        .checked_add(len)
        .ok_or_else(|| Error::truncated(what, u64::MAX, data.len() as u64))?;
    data.get(offset..end)
        .ok_or_else(|| Error::truncated(what, end as u64, data.len() as u64))
}

fn array_at<const N: usize>(data: &[u8], offset: usize, what: &str) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    buf.copy_from_slice(slice_at(data, offset, N, what)?);
    Ok(buf)
}

/// Reads a u16 from the given offset in little-endian format
pub fn read_u16_le(data: &[u8], offset: usize) -> Result<u16> {
    array_at(data, offset, "u16").map(u16::from_le_bytes)
}

/// Reads a u32 from the given offset in little-endian format
pub fn read_u32_le(data: &[u8], offset: usize) -> Result<u32> {
    array_at(data, offset, "u32").map(u32::from_le_bytes)
}

/// Reads a u16 from the given offset in big-endian format
pub fn read_u16_be(data: &[u8], offset: usize) -> Result<u16> {
    array_at(data, offset, "u16").map(u16::from_be_bytes)
}

/// Reads a u32 from the given offset in big-endian format
pub fn read_u32_be(data: &[u8], offset: usize) -> Result<u32> {
    array_at(data, offset, "u32").map(u32::from_be_bytes)
}

/// Reads a u64 from the given offset in big-endian format
pub fn read_u64_be(data: &[u8], offset: usize) -> Result<u64> {
    array_at(data, offset, "u64").map(u64::from_be_bytes)
}

/// Writes `bytes` at `offset`; the destination must already be large enough.
pub fn put(dest: &mut [u8], offset: usize, bytes: &[u8]) {
    dest[offset..offset + bytes.len()].copy_from_slice(bytes);
}

/// Decodes a zero-padded ASCII field, stopping at the first NUL.
pub fn trim_nul(bytes: &[u8]) -> &[u8] {
    match bytes.iter().position(|&b| b == 0) {
        Some(end) => &bytes[..end],
        None => bytes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endian_reads() {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
        assert_eq!(read_u16_le(&data, 0).unwrap(), 0x0201);
        assert_eq!(read_u16_be(&data, 0).unwrap(), 0x0102);
        assert_eq!(read_u32_le(&data, 4).unwrap(), 0x08070605);
        assert_eq!(read_u32_be(&data, 4).unwrap(), 0x05060708);
        assert_eq!(read_u64_be(&data, 0).unwrap(), 0x0102030405060708);
    }

    #[test]
    fn test_out_of_bounds_read_is_truncation() {
        let data = [0u8; 6];
        assert!(matches!(
            read_u32_be(&data, 4),
            Err(Error::TruncatedInput { needed: 8, available: 6, .. })
        ));
        assert!(slice_at(&data, usize::MAX, 2, "tail").is_err());
    }

    #[test]
    fn test_trim_nul() {
        assert_eq!(trim_nul(b"abc\0\0\0"), b"abc");
        assert_eq!(trim_nul(b"abc"), b"abc");
        assert_eq!(trim_nul(b"\0abc"), b"");
    }
}
