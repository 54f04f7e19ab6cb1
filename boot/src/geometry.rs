//! Status area geometry.
//!
//! The status flash is a sequence of fixed size rows, each one flash write
//! unit long.  For every image there is one area per slot, and every area
//! holds `wear_multiplier` copies of the same set of rows:
//!
//! +-------------------------------+
//! | image 0, primary, copy 0      |  sector rows, then the trailer row
//! | image 0, primary, copy 1      |
//! |   ...                         |
//! | image 0, secondary, copy 0    |
//! | image 0, secondary, copy 1    |
//! |   ...                         |
//! | image 1, primary, copy 0      |
//! +-------------------------------+
//!
//! Within a copy, rows `0..sector_rows` hold one progress byte per image
//! sector and the final row holds the image trailer.

use storage::SlotRole;

use crate::config::{ConfigError, StatusConfig};
use crate::trailer::TRAILER_SIZE;

/// Bytes of the per row sequence counter.
pub const COUNTER_SIZE: usize = 4;

/// Bytes of the per row checksum.
pub const CHECKSUM_SIZE: usize = 4;

/// Rows used for the trailer in each copy.
pub const TRAILER_ROWS: usize = 1;

/// Slots tracked for each image.
pub const SLOT_COUNT: usize = 2;

/// Largest supported row.  Row buffers live on the stack with this capacity.
pub const MAX_ROW_SIZE: usize = 512;

/// Largest supported sector count for one image.
pub const MAX_IMAGE_SECTORS: usize = 1024;

/// Smallest row that can hold the trailer.
const MIN_ROW_SIZE: usize = TRAILER_SIZE + COUNTER_SIZE + CHECKSUM_SIZE;

/// Layout constants derived from a [`StatusConfig`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Geometry {
    pub row_size: usize,
    pub payload_size: usize,
    pub sector_rows: usize,
    pub trailer_rows: usize,
    /// Size of one copy of the rows.
    pub copy_size: usize,
    pub wear_multiplier: usize,
    /// Size of the status area of one slot: all of its copies.
    pub area_size: usize,
    config: StatusConfig,
}

impl Geometry {
    /// Derive the layout, rejecting configurations that cannot work.
    pub const fn new(config: &StatusConfig) -> Result<Geometry, ConfigError> {
        let row_size = config.flash_align;

        if !row_size.is_power_of_two() {
            return Err(ConfigError::AlignNotPowerOfTwo);
        }
        if row_size < MIN_ROW_SIZE {
            return Err(ConfigError::AlignTooSmall);
        }
        if row_size > MAX_ROW_SIZE {
            return Err(ConfigError::RowTooLarge);
        }
        if config.max_image_sectors == 0 {
            return Err(ConfigError::NoSectors);
        }
        if config.max_image_sectors > MAX_IMAGE_SECTORS {
            return Err(ConfigError::TooManySectors);
        }
        if config.wear_multiplier == 0 {
            return Err(ConfigError::NoCopies);
        }
        if config.image_count == 0 {
            return Err(ConfigError::NoImages);
        }

        let payload_size = row_size - COUNTER_SIZE - CHECKSUM_SIZE;
        let sector_rows = config.max_image_sectors.div_ceil(payload_size);
        let copy_size = row_size * (sector_rows + TRAILER_ROWS);

        Ok(Geometry {
            row_size,
            payload_size,
            sector_rows,
            trailer_rows: TRAILER_ROWS,
            copy_size,
            wear_multiplier: config.wear_multiplier,
            area_size: config.wear_multiplier * copy_size,
            config: *config,
        })
    }

    /// Like `new`, but panics on a bad configuration.  Meant for `const`
    /// items, where the panic becomes a build failure.
    pub const fn build(config: &StatusConfig) -> Geometry {
        match Geometry::new(config) {
            Ok(geometry) => geometry,
            Err(e) => panic!("{}", e.as_str()),
        }
    }

    pub fn config(&self) -> &StatusConfig {
        &self.config
    }

    pub fn max_image_sectors(&self) -> usize {
        self.config.max_image_sectors
    }

    /// Rows in one copy.
    pub fn rows(&self) -> usize {
        self.sector_rows + self.trailer_rows
    }

    /// Index of the trailer row within a copy.
    pub fn trailer_row(&self) -> usize {
        self.sector_rows
    }

    /// Which sector row, and which byte within its payload, holds the
    /// progress of `sector`.
    pub fn sector_position(&self, sector: usize) -> (usize, usize) {
        (sector / self.payload_size, sector % self.payload_size)
    }

    /// Bytes used by the status areas of every image.
    pub fn region_size(&self) -> usize {
        self.config.image_count * SLOT_COUNT * self.area_size
    }

    /// Start of the status area of one slot.
    pub fn area_offset(&self, image: usize, slot: SlotRole) -> usize {
        (image * SLOT_COUNT + slot.index()) * self.area_size
    }

    /// Start of a copy, relative to its area.
    pub fn copy_offset(&self, copy: usize) -> usize {
        copy * self.copy_size
    }

    /// Absolute offset of one physical row.
    pub fn row_offset(&self, image: usize, slot: SlotRole, copy: usize, row: usize) -> usize {
        self.area_offset(image, slot) + self.copy_offset(copy) + row * self.row_size
    }
}
