//! Flash styles
//!
//! The status region needs a flash that can erase a single status row, so the
//! styles here are the small-erase parts status areas are actually placed in.

use crate::SimFlash;
use anyhow::Result;

/// The configuration of a single flash area.
pub struct AreaLayout {
    pub name: &'static str,
    pub read_size: usize,
    pub write_size: usize,
    pub erase_size: usize,
    pub sectors: usize,
    /// Reading an erased page faults.
    pub read_erased_fails: bool,
}

impl AreaLayout {
    pub fn build(&self) -> Result<SimFlash> {
        Ok(SimFlash::new(
            self.read_size,
            self.write_size,
            self.erase_size,
            self.sectors,
        )?
        .read_erased_fails(self.read_erased_fails))
    }

    /// The smallest status row this device can hold: one erasable, writable
    /// unit.
    pub fn row_size(&self) -> usize {
        self.write_size.max(self.erase_size)
    }
}

/// PSoC 6 style.  Flash is written and erased a 512 byte row at a time.
pub static PSOC6: AreaLayout = AreaLayout {
    name: "psoc6",
    read_size: 1,
    write_size: 512,
    erase_size: 512,
    sectors: 64,
    read_erased_fails: false,
};

/// Page-style devices.  Based on the LPC55S69, which also faults on reads of
/// erased pages.
pub static LPC: AreaLayout = AreaLayout {
    name: "lpc55s69",
    read_size: 1,
    write_size: 512,
    erase_size: 512,
    sectors: 64,
    read_erased_fails: true,
};

/// STM32L0 style.  128 byte pages, programmed a half page at a time.
pub static STM32L0: AreaLayout = AreaLayout {
    name: "stm32l0",
    read_size: 1,
    write_size: 64,
    erase_size: 128,
    sectors: 128,
    read_erased_fails: false,
};

/// All of the flash styles.
pub static ALL_STYLES: [&'static AreaLayout; 3] = [&PSOC6, &LPC, &STM32L0];

/// Each style along with a fresh device of that style.
pub fn all_flashes() -> impl Iterator<Item = Result<(&'static AreaLayout, SimFlash)>> {
    ALL_STYLES
        .iter()
        .map(|&layout| layout.build().map(|flash| (layout, flash)))
}
