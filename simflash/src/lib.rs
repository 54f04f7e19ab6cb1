//! Simulated flash
//!
//! The NOR-type flashes used in microcontrollers differs quite a bit in terms
//! of capabilities provided.  This simulator attempts to capture the parts of
//! that diversity that matter to the swap status code:
//!
//! - Writes only go to erased bytes.  Anything else is `NotErased`.
//! - Erases cover whole sectors.
//! - Some paged parts (the LPC55S69 for one) fault when reading a page that
//!   was never programmed.  That is available as `read_erased_fails`.
//! - Power can be lost at any point.  `fail_after` lets a number of writes
//!   and erases through, then cuts the next one short, leaving it half done,
//!   and fails everything after until `power_cycle`.
//!
//! The devices are exposed through the `storage` traits, and, with the sizes
//! fixed at compile time, through the embedded-storage NOR traits (see
//! [`NorSim`]).

use anyhow::{anyhow, Result};
use storage::{check_erase, check_read, check_write, Error, Flash, ReadFlash};

pub mod gen;
mod nor;
pub mod styles;

pub use nor::{NorSim, SimError};

pub struct SimFlash {
    read_size: usize,
    write_size: usize,
    erase_size: usize,
    erased: u8,
    read_erased_fails: bool,
    data: Vec<u8>,
    /// Which write units have been programmed since their last erase.
    programmed: Vec<bool>,
    erase_counts: Vec<u32>,
    /// Writes and erases still allowed before the power goes.
    budget: Option<usize>,
    tripped: bool,
}

impl SimFlash {
    pub fn new(
        read_size: usize,
        write_size: usize,
        erase_size: usize,
        sectors: usize,
    ) -> Result<SimFlash> {
        if read_size == 0 || write_size == 0 || erase_size == 0 || sectors == 0 {
            return Err(anyhow!("flash sizes must be non-zero"));
        }
        if erase_size % write_size != 0 {
            return Err(anyhow!(
                "erase size {} not a multiple of write size {}",
                erase_size,
                write_size
            ));
        }
        if write_size % read_size != 0 {
            return Err(anyhow!(
                "write size {} not a multiple of read size {}",
                write_size,
                read_size
            ));
        }

        let capacity = erase_size * sectors;
        Ok(SimFlash {
            read_size,
            write_size,
            erase_size,
            erased: 0xff,
            read_erased_fails: false,
            data: vec![0xff; capacity],
            programmed: vec![false; capacity / write_size],
            erase_counts: vec![0; sectors],
            budget: None,
            tripped: false,
        })
    }

    /// Use a different erased value.  The device starts out erased.
    pub fn erased_value(mut self, erased: u8) -> SimFlash {
        self.erased = erased;
        self.data.fill(erased);
        self
    }

    /// Make reads of never programmed write units fail with `NotWritten`.
    pub fn read_erased_fails(mut self, fails: bool) -> SimFlash {
        self.read_erased_fails = fails;
        self
    }

    /// Allow `ops` more writes or erases, then lose power during the next
    /// one.
    pub fn fail_after(&mut self, ops: usize) {
        self.budget = Some(ops);
    }

    /// Power comes back.  Nothing fails from here on.
    pub fn power_cycle(&mut self) {
        self.budget = None;
        self.tripped = false;
    }

    /// Has the power been lost?
    pub fn is_tripped(&self) -> bool {
        self.tripped
    }

    /// How often a sector has been erased.
    pub fn erase_count(&self, sector: usize) -> u32 {
        self.erase_counts[sector]
    }

    /// Raw contents, bypassing every check.
    pub fn contents(&self) -> &[u8] {
        &self.data
    }

    /// Place data directly into flash, as a programmer would.
    pub fn install(&mut self, data: &[u8], offset: usize) -> Result<()> {
        let end = offset
            .checked_add(data.len())
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| anyhow!("install of {} bytes at 0x{:x} out of range", data.len(), offset))?;
        self.data[offset..end].copy_from_slice(data);
        let first = offset / self.write_size;
        let last = end.div_ceil(self.write_size);
        self.programmed[first..last].fill(true);
        Ok(())
    }

    /// Invert one bit, as a disturbed cell would.
    pub fn flip_bit(&mut self, offset: usize, bit: u8) {
        self.data[offset] ^= 1 << (bit % 8);
    }

    /// Take one operation out of the power budget.  Returns false if this
    /// is the operation that gets cut short.
    fn spend(&mut self) -> bool {
        match self.budget {
            Some(0) => {
                self.tripped = true;
                false
            }
            Some(n) => {
                self.budget = Some(n - 1);
                true
            }
            None => true,
        }
    }

    fn check_power(&self) -> storage::Result<()> {
        if self.tripped {
            Err(Error::Device)
        } else {
            Ok(())
        }
    }
}

impl ReadFlash for SimFlash {
    fn read_size(&self) -> usize {
        self.read_size
    }

    fn read(&mut self, offset: usize, bytes: &mut [u8]) -> storage::Result<()> {
        self.check_power()?;
        check_read(self, offset, bytes.len())?;
        if bytes.is_empty() {
            return Ok(());
        }
        if self.read_erased_fails {
            let first = offset / self.write_size;
            let last = (offset + bytes.len()).div_ceil(self.write_size);
            if !self.programmed[first..last].iter().all(|&p| p) {
                return Err(Error::NotWritten);
            }
        }
        bytes.copy_from_slice(&self.data[offset..offset + bytes.len()]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.data.len()
    }
}

impl Flash for SimFlash {
    fn write_size(&self) -> usize {
        self.write_size
    }

    fn erase_size(&self) -> usize {
        self.erase_size
    }

    fn erased_value(&self) -> u8 {
        self.erased
    }

    fn erase(&mut self, from: usize, to: usize) -> storage::Result<()> {
        self.check_power()?;
        check_erase(self, from, to)?;

        // A cut short erase clears the first half of the range.
        let (to, complete) = if self.spend() {
            (to, true)
        } else {
            (from + (to - from) / 2, false)
        };

        self.data[from..to].fill(self.erased);
        self.programmed[from / self.write_size..to / self.write_size].fill(false);
        if complete {
            for sector in from / self.erase_size..to / self.erase_size {
                self.erase_counts[sector] += 1;
            }
            Ok(())
        } else {
            Err(Error::Device)
        }
    }

    fn write(&mut self, offset: usize, bytes: &[u8]) -> storage::Result<()> {
        self.check_power()?;
        check_write(self, offset, bytes.len())?;
        let end = offset + bytes.len();
        if self.data[offset..end].iter().any(|&b| b != self.erased) {
            return Err(Error::NotErased);
        }

        // A cut short write programs only the first half.
        let (len, complete) = if self.spend() {
            (bytes.len(), true)
        } else {
            (bytes.len() / 2, false)
        };

        self.data[offset..offset + len].copy_from_slice(&bytes[..len]);
        let last = end.div_ceil(self.write_size);
        self.programmed[offset / self.write_size..last].fill(true);
        if complete {
            Ok(())
        } else {
            Err(Error::Device)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flash() -> SimFlash {
        SimFlash::new(1, 8, 64, 4).unwrap()
    }

    #[test]
    fn geometry() {
        let flash = flash();
        assert_eq!(flash.capacity(), 256);
        assert_eq!(flash.sector_count(), 4);
        assert!(SimFlash::new(1, 48, 64, 4).is_err());
        assert!(SimFlash::new(1, 8, 64, 0).is_err());
    }

    #[test]
    fn nor_semantics() {
        let mut flash = flash();
        let mut buf = [0u8; 8];
        flash.read(0, &mut buf).unwrap();
        assert_eq!(buf, [0xff; 8]);

        flash.write(8, &[1; 8]).unwrap();
        assert_eq!(flash.write(8, &[2; 8]), Err(Error::NotErased));
        assert_eq!(flash.write(4, &[2; 8]), Err(Error::NotAligned));
        assert_eq!(flash.erase(0, 32), Err(Error::NotAligned));

        flash.erase(0, 64).unwrap();
        flash.write(8, &[2; 8]).unwrap();
        flash.read(8, &mut buf).unwrap();
        assert_eq!(buf, [2; 8]);
        assert_eq!(flash.erase_count(0), 1);
        assert_eq!(flash.erase_count(1), 0);
    }

    #[test]
    fn erased_reads_fail() {
        let mut flash = flash().read_erased_fails(true);
        let mut buf = [0u8; 4];
        assert_eq!(flash.read(0, &mut buf), Err(Error::NotWritten));
        flash.write(0, &[0; 8]).unwrap();
        flash.read(0, &mut buf).unwrap();
        flash.read(6, &mut buf).unwrap_err();
        flash.erase(0, 64).unwrap();
        assert_eq!(flash.read(0, &mut buf), Err(Error::NotWritten));
    }

    #[test]
    fn torn_write() {
        let mut flash = flash();
        flash.fail_after(1);
        flash.write(0, &[0; 8]).unwrap();
        assert_eq!(flash.write(8, &[0; 8]), Err(Error::Device));
        assert!(flash.is_tripped());
        assert_eq!(&flash.contents()[8..16], &[0, 0, 0, 0, 0xff, 0xff, 0xff, 0xff]);

        // Nothing works until the power is back.
        let mut buf = [0u8; 1];
        assert_eq!(flash.read(0, &mut buf), Err(Error::Device));
        assert_eq!(flash.erase(64, 128), Err(Error::Device));
        flash.power_cycle();
        flash.erase(0, 64).unwrap();
    }

    #[test]
    fn torn_erase() {
        let mut flash = flash();
        flash.install(&[0u8; 64], 64).unwrap();
        flash.fail_after(0);
        assert_eq!(flash.erase(64, 128), Err(Error::Device));
        assert!(flash.contents()[64..96].iter().all(|&b| b == 0xff));
        assert!(flash.contents()[96..128].iter().all(|&b| b == 0));
        assert_eq!(flash.erase_count(1), 0);
    }

    #[test]
    fn zero_erase() {
        let mut flash = flash().erased_value(0);
        assert!(flash.contents().iter().all(|&b| b == 0));
        flash.write(0, &[0x55; 8]).unwrap();
        flash.erase(0, 64).unwrap();
        assert_eq!(flash.contents()[0], 0);
    }
}
