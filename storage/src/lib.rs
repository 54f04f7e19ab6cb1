//! Storage types.
//!
//! The swap-status core never talks to a flash driver directly.  It consumes
//! the small capability interface below: byte reads, aligned writes, sector
//! erases, and enough geometry to find the sectors that back a region.  Flash
//! areas are identified by small integers, resolved from an image index and a
//! slot role through an [`AreaMap`].

#![cfg_attr(not(any(feature = "std", test)), no_std)]

#[cfg(feature = "embedded-storage")]
mod nor;

#[cfg(feature = "embedded-storage")]
pub use nor::NorArea;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    NotAligned,
    OutOfBounds,
    /// Some devices fault when reading a page that has never been programmed.
    NotWritten,
    NotErased,
    /// The device itself reported a failure.
    Device,
}

pub type Result<T> = core::result::Result<T, Error>;

/// Read only interface into flash.
pub trait ReadFlash {
    /// What is the read size (alignment and size multiple).
    fn read_size(&self) -> usize;
    fn read(&mut self, offset: usize, bytes: &mut [u8]) -> Result<()>;
    fn capacity(&self) -> usize;
}

/// Flash that can be written to.
pub trait Flash: ReadFlash {
    /// Write size (alignment and size multiple).
    fn write_size(&self) -> usize;
    /// Erase size (alignment and size multiple).
    fn erase_size(&self) -> usize;

    /// The value every byte reads back as after an erase.
    fn erased_value(&self) -> u8 {
        0xff
    }

    fn erase(&mut self, from: usize, to: usize) -> Result<()>;
    fn write(&mut self, offset: usize, bytes: &[u8]) -> Result<()>;

    /// Number of erase sectors in the device.
    fn sector_count(&self) -> usize {
        self.capacity() / self.erase_size()
    }

    /// Size of the given sector.  Uniform devices only need `erase_size`.
    fn sector_size(&self, _sector: usize) -> usize {
        self.erase_size()
    }

    /// Offset of the start of the given sector.
    fn sector_offset(&self, sector: usize) -> usize {
        sector * self.erase_size()
    }
}

/// Find the sector holding `offset`, if any.
pub fn find_sector<T: Flash>(flash: &T, offset: usize) -> Option<usize> {
    (0..flash.sector_count()).find(|&sector| {
        let base = flash.sector_offset(sector);
        offset >= base && offset - base < flash.sector_size(sector)
    })
}

/// The role a slot plays for one managed image.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SlotRole {
    /// The image that is currently run.
    Primary,
    /// The staged candidate.
    Secondary,
}

impl SlotRole {
    pub const ALL: [SlotRole; 2] = [SlotRole::Primary, SlotRole::Secondary];

    /// Position of this slot within an image's status region.
    pub fn index(self) -> usize {
        match self {
            SlotRole::Primary => 0,
            SlotRole::Secondary => 1,
        }
    }
}

/// Resolves (image index, slot role) pairs to the ids of concrete flash areas.
pub trait AreaMap {
    fn area_id(&self, image: u8, role: SlotRole) -> Option<u8>;

    /// The reverse mapping.  An id belonging to neither slot of `image` yields
    /// `None`.
    fn slot_of(&self, image: u8, area_id: u8) -> Option<SlotRole> {
        SlotRole::ALL
            .into_iter()
            .find(|&role| self.area_id(image, role) == Some(area_id))
    }
}

/// The conventional numbering: image `n` has its primary slot at area
/// `2n + 1` and its secondary at `2n + 2`, area 0 holds the bootloader.
#[derive(Debug, Copy, Clone, Default)]
pub struct DefaultAreaMap {
    pub images: u8,
}

impl AreaMap for DefaultAreaMap {
    fn area_id(&self, image: u8, role: SlotRole) -> Option<u8> {
        if image >= self.images {
            return None;
        }
        image
            .checked_mul(2)?
            .checked_add(1 + role.index() as u8)
    }
}

// Utilities taken from embedded-storage for validating arguments.
pub fn check_read<T: ReadFlash>(
    flash: &T,
    offset: usize,
    length: usize,
) -> Result<()> {
    check_slice(flash, flash.read_size(), offset, length)
}

pub fn check_erase<T: Flash>(
    flash: &T,
    from: usize,
    to: usize,
) -> Result<()> {
    if from > to || to > flash.capacity() {
        return Err(Error::OutOfBounds);
    }
    if from % flash.erase_size() != 0 || to % flash.erase_size() != 0 {
        return Err(Error::NotAligned);
    }
    Ok(())
}

pub fn check_write<T: Flash>(
    flash: &T,
    offset: usize,
    length: usize,
) -> Result<()> {
    check_slice(flash, flash.write_size(), offset, length)
}

pub fn check_slice<T: ReadFlash>(
    flash: &T,
    align: usize,
    offset: usize,
    length: usize,
) -> Result<()> {
    if length > flash.capacity() || offset > flash.capacity() - length {
        return Err(Error::OutOfBounds);
    }
    if offset % align != 0 || length % align != 0 {
        return Err(Error::NotAligned);
    }
    Ok(())
}
