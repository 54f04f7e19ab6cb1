//! Adapter from embedded-storage NOR devices.
//!
//! Board flash drivers implement `embedded_storage::nor_flash::NorFlash`.
//! `NorArea` carves a window out of such a device and presents it as a
//! [`Flash`], so the status region can be placed anywhere in the part.

use embedded_storage::nor_flash::{NorFlash, NorFlashError, NorFlashErrorKind};

use crate::{check_erase, check_read, check_write, Error, Flash, ReadFlash, Result};

pub struct NorArea<F> {
    flash: F,
    base: usize,
    length: usize,
}

impl<F: NorFlash> NorArea<F> {
    /// Wrap the `length` bytes of `flash` starting at `base`.  Both must be
    /// erase aligned.
    pub fn new(flash: F, base: usize, length: usize) -> Result<Self> {
        let end = base.checked_add(length).ok_or(Error::OutOfBounds)?;
        if length == 0 || end > flash.capacity() {
            return Err(Error::OutOfBounds);
        }
        if base % F::ERASE_SIZE != 0 || length % F::ERASE_SIZE != 0 {
            return Err(Error::NotAligned);
        }
        Ok(NorArea { flash, base, length })
    }

    /// Give back the underlying device.
    pub fn release(self) -> F {
        self.flash
    }

    fn device_offset(&self, offset: usize) -> Result<u32> {
        let offset = offset.checked_add(self.base).ok_or(Error::OutOfBounds)?;
        u32::try_from(offset).map_err(|_| Error::OutOfBounds)
    }
}

fn convert<E: NorFlashError>(e: E) -> Error {
    match e.kind() {
        NorFlashErrorKind::NotAligned => Error::NotAligned,
        NorFlashErrorKind::OutOfBounds => Error::OutOfBounds,
        _ => Error::Device,
    }
}

impl<F: NorFlash> ReadFlash for NorArea<F> {
    fn read_size(&self) -> usize {
        F::READ_SIZE
    }

    fn read(&mut self, offset: usize, bytes: &mut [u8]) -> Result<()> {
        check_read(self, offset, bytes.len())?;
        let offset = self.device_offset(offset)?;
        self.flash.read(offset, bytes).map_err(convert)
    }

    fn capacity(&self) -> usize {
        self.length
    }
}

impl<F: NorFlash> Flash for NorArea<F> {
    fn write_size(&self) -> usize {
        F::WRITE_SIZE
    }

    fn erase_size(&self) -> usize {
        F::ERASE_SIZE
    }

    fn erase(&mut self, from: usize, to: usize) -> Result<()> {
        check_erase(self, from, to)?;
        let from = self.device_offset(from)?;
        let to = self.device_offset(to)?;
        self.flash.erase(from, to).map_err(convert)
    }

    fn write(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        check_write(self, offset, bytes.len())?;
        let offset = self.device_offset(offset)?;
        self.flash.write(offset, bytes).map_err(convert)
    }
}
