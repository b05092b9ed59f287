//! Opaque byte regions that stand in for digest, key and license data.
//!
//! A fake package carries these areas without computing their contents.

use crate::error::{Error, Result};

/// A fixed-length region whose contents the codec never interprets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservedRegion {
    len: usize,
    fill: Option<Vec<u8>>,
}

impl ReservedRegion {
    /// A region of `len` zero bytes.
    pub fn zeroed(len: usize) -> Self {
        Self { len, fill: None }
    }

    /// A region whose bytes come from outside (e.g. a real digest table).
    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self {
            len: data.len(),
            fill: Some(data),
        }
    }

    /// Length of the region in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the region is empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns true if no contents were supplied.
    pub fn is_placeholder(&self) -> bool {
        self.fill.is_none()
    }

    /// Materializes the region.
    pub fn to_bytes(&self) -> Vec<u8> {
        match &self.fill {
            Some(data) => data.clone(),
            None => vec![0u8; self.len],
        }
    }

    /// Writes the region into `dest`, which must be exactly as long.
    pub fn write_into(&self, dest: &mut [u8]) -> Result<()> {
        if dest.len() != self.len {
            return Err(Error::Layout(format!(
                "reserved region is {} bytes but its slot is {} bytes",
                self.len,
                dest.len()
            )));
        }
        match &self.fill {
            Some(data) => dest.copy_from_slice(data),
            None => dest.fill(0),
        }
        Ok(())
    }
}
