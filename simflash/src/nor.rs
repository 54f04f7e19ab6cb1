//! embedded-storage view of the simulator.
//!
//! The NorFlash traits want the write and erase sizes as constants, so the
//! sizes become const generics here.  Board drivers sit behind the same
//! traits, which makes this the way to run the status code over a driver
//! shaped device.

use embedded_storage::nor_flash::{
    ErrorType, NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash,
};
use storage::{Flash, ReadFlash};

use crate::SimFlash;

/// The richer error type used in the simulator.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SimError {
    Inner(NorFlashErrorKind),
    Storage(storage::Error),
}

impl From<NorFlashErrorKind> for SimError {
    fn from(inner: NorFlashErrorKind) -> Self {
        SimError::Inner(inner)
    }
}

impl From<storage::Error> for SimError {
    fn from(e: storage::Error) -> Self {
        SimError::Storage(e)
    }
}

impl NorFlashError for SimError {
    fn kind(&self) -> NorFlashErrorKind {
        match self {
            SimError::Inner(inner) => *inner,
            SimError::Storage(storage::Error::NotAligned) => NorFlashErrorKind::NotAligned,
            SimError::Storage(storage::Error::OutOfBounds) => NorFlashErrorKind::OutOfBounds,
            SimError::Storage(_) => NorFlashErrorKind::Other,
        }
    }
}

type Result<T> = core::result::Result<T, SimError>;

pub struct NorSim<const WRITE_SIZE: usize, const ERASE_SIZE: usize> {
    inner: SimFlash,
}

impl<const WRITE_SIZE: usize, const ERASE_SIZE: usize> NorSim<WRITE_SIZE, ERASE_SIZE> {
    pub fn new(sectors: usize) -> anyhow::Result<Self> {
        let inner = SimFlash::new(1, WRITE_SIZE, ERASE_SIZE, sectors)?;
        Ok(NorSim { inner })
    }

    pub fn inner(&mut self) -> &mut SimFlash {
        &mut self.inner
    }
}

impl<const WRITE_SIZE: usize, const ERASE_SIZE: usize> ErrorType for NorSim<WRITE_SIZE, ERASE_SIZE> {
    type Error = SimError;
}

impl<const WRITE_SIZE: usize, const ERASE_SIZE: usize> ReadNorFlash for NorSim<WRITE_SIZE, ERASE_SIZE> {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<()> {
        Ok(self.inner.read(offset as usize, bytes)?)
    }

    fn capacity(&self) -> usize {
        self.inner.capacity()
    }
}

impl<const WRITE_SIZE: usize, const ERASE_SIZE: usize> NorFlash for NorSim<WRITE_SIZE, ERASE_SIZE> {
    const WRITE_SIZE: usize = WRITE_SIZE;
    const ERASE_SIZE: usize = ERASE_SIZE;

    fn erase(&mut self, from: u32, to: u32) -> Result<()> {
        Ok(self.inner.erase(from as usize, to as usize)?)
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<()> {
        Ok(self.inner.write(offset as usize, bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn through_traits() {
        let mut nor = NorSim::<4, 256>::new(4).unwrap();
        assert_eq!(ReadNorFlash::capacity(&nor), 1024);
        NorFlash::write(&mut nor, 0, &[1, 2, 3, 4]).unwrap();

        let err = NorFlash::write(&mut nor, 2, &[0; 4]).unwrap_err();
        assert_eq!(err.kind(), NorFlashErrorKind::NotAligned);
        let err = NorFlash::write(&mut nor, 0, &[0; 4]).unwrap_err();
        assert_eq!(err, SimError::Storage(storage::Error::NotErased));
        assert_eq!(err.kind(), NorFlashErrorKind::Other);

        NorFlash::erase(&mut nor, 0, 256).unwrap();
        assert_eq!(nor.inner().erase_count(0), 1);
    }
}
