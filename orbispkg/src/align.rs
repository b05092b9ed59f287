//! Alignment arithmetic shared by the container builder and parser.

use crate::error::{Error, Result};

/// Rounds `size` up to the next multiple of `boundary`.
///
/// `boundary` must be a non-zero power of two.
pub fn align_up(size: u64, boundary: u64) -> Result<u64> {
    check_boundary(boundary)?;
    let mask = boundary - 1;
    size.checked_add(mask)
        .map(|v| v & !mask)
        .ok_or_else(|| Error::Layout(format!("{size} cannot be aligned to {boundary} bytes")))
}

/// Returns true if `value` is a multiple of `boundary`.
pub fn is_aligned(value: u64, boundary: u64) -> bool {
    boundary.is_power_of_two() && value & (boundary - 1) == 0
}

/// Validates an alignment boundary.
pub fn check_boundary(boundary: u64) -> Result<()> {
    if !boundary.is_power_of_two() {
        return Err(Error::Configuration(format!(
            "alignment must be a non-zero power of two, got {boundary}"
        )));
    }
    Ok(())
}

/// Offsets of consecutive aligned regions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionLayout {
    /// Start offset of every region, in input order
    pub offsets: Vec<u64>,
    /// Base offset the first region starts at
    pub base: u64,
    /// First byte after the last (padded) region
    pub end: u64,
}

impl RegionLayout {
    /// Total bytes consumed by all padded regions.
    pub fn span(&self) -> u64 {
        self.end - self.base
    }
}

/// Number of bytes a region of `size` occupies once padded.
///
/// Empty regions still take one boundary-sized slot so that offsets stay
/// strictly increasing.
pub fn padded_size(size: u64, boundary: u64) -> Result<u64> {
    align_up(size.max(1), boundary)
}

/// Lays out regions of the given sizes back to back starting at `base`.
///
/// Each offset is the previous one plus [`padded_size`], which equals
/// `align_up(size, boundary)` except for empty regions: those advance the
/// cursor by one full `boundary` instead of zero, so no two regions share an
/// offset.
pub fn layout_offsets(sizes: &[u64], base: u64, boundary: u64) -> Result<RegionLayout> {
    check_boundary(boundary)?;

    let mut offsets = Vec::with_capacity(sizes.len());
    let mut cursor = base;

    for &size in sizes {
        offsets.push(cursor);
        let padded = padded_size(size, boundary)?;
        cursor = cursor
            .checked_add(padded)
            .ok_or_else(|| Error::Layout("region offsets overflow u64".to_string()))?;
    }

    Ok(RegionLayout {
        offsets,
        base,
        end: cursor,
    })
}
