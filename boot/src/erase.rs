//! Erasing a status area.
//!
//! Sectors are erased starting with the last one of the area and working back
//! towards the first.  The head of an area is where the first copy lives, so
//! an erase cut short by a reset leaves the tail cleared and the head intact.
//! The store retires every committed trailer copy before it erases, so what
//! survives at the head never reads as a swap.  The area looks unused, and
//! the next swap that needs it erases it again before writing anything new.

use storage::{find_sector, Flash};

use crate::config::ConfigError;
use crate::{log, Error, Result};

/// Erase the sectors backing `size` bytes at `base`, last sector first.
/// Returns the number of bytes erased.
///
/// A failed erase is returned as is.  There is no retry: without a
/// consistent status area the boot cannot go on.
pub fn erase_area<F: Flash>(flash: &mut F, base: usize, size: usize) -> Result<usize> {
    if size == 0 {
        return Ok(0);
    }
    let last = base
        .checked_add(size - 1)
        .and_then(|end| find_sector(flash, end))
        .ok_or(Error::Flash(storage::Error::OutOfBounds))?;

    let mut sector = last;
    let mut erased = 0;
    loop {
        let off = flash.sector_offset(sector);
        let len = flash.sector_size(sector);
        log::trace!("erase sector {} at 0x{:x}", sector, off);
        flash.erase(off, off + len)?;

        erased += len;
        if erased >= size || sector == 0 {
            break;
        }
        sector -= 1;
    }
    Ok(erased)
}

/// Check that `[base, base + size)` starts and ends on sector boundaries, so
/// that erasing it cannot touch a neighbour.
pub fn check_boundaries<F: Flash>(flash: &F, base: usize, size: usize) -> core::result::Result<(), ConfigError> {
    let end = base.checked_add(size).ok_or(ConfigError::RegionTooSmall)?;
    if end > flash.capacity() {
        return Err(ConfigError::RegionTooSmall);
    }
    let first = find_sector(flash, base).ok_or(ConfigError::RegionTooSmall)?;
    if flash.sector_offset(first) != base {
        return Err(ConfigError::SectorMisaligned);
    }
    if end < flash.capacity() {
        let next = find_sector(flash, end).ok_or(ConfigError::RegionTooSmall)?;
        if flash.sector_offset(next) != end {
            return Err(ConfigError::SectorMisaligned);
        }
    }
    Ok(())
}
