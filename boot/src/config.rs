//! Status area configuration.
//!
//! Everything that shapes the on-flash layout is collected here, resolved once
//! at startup, and handed to [`Geometry`](crate::Geometry).  The builder
//! methods are `const` so that a board can keep its whole configuration in a
//! `const` item and have a bad layout rejected by the compiler.

/// The knobs of the status area.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StatusConfig {
    /// Flash write alignment.  Each status row is exactly this many bytes.
    pub flash_align: usize,
    /// The most sectors an image slot can span.
    pub max_image_sectors: usize,
    /// How many physical copies of every row rotate to spread wear.  1 is a
    /// single copy, 2 halves the wear, and so on.
    pub wear_multiplier: usize,
    /// Whether the trailer carries the two image encryption keys.
    pub encryption: bool,
    /// Number of images sharing the status flash.
    pub image_count: usize,
}

impl StatusConfig {
    pub const fn new(flash_align: usize, max_image_sectors: usize) -> StatusConfig {
        StatusConfig {
            flash_align,
            max_image_sectors,
            wear_multiplier: 2,
            encryption: false,
            image_count: 1,
        }
    }

    pub const fn wear_multiplier(mut self, wear_multiplier: usize) -> StatusConfig {
        self.wear_multiplier = wear_multiplier;
        self
    }

    pub const fn encryption(mut self, encryption: bool) -> StatusConfig {
        self.encryption = encryption;
        self
    }

    pub const fn image_count(mut self, image_count: usize) -> StatusConfig {
        self.image_count = image_count;
        self
    }
}

/// Ways a configuration, or the flash it is applied to, can be unusable.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    AlignNotPowerOfTwo,
    /// The row cannot hold the counter, checksum, and trailer.
    AlignTooSmall,
    RowTooLarge,
    NoSectors,
    TooManySectors,
    NoCopies,
    NoImages,
    ImageOutOfRange,
    /// The flash write size does not divide the row size.
    RowUnaligned,
    /// The flash cannot erase a single row.
    EraseTooLarge,
    /// The status region does not fit in the flash.
    RegionTooSmall,
    /// A status area does not start or end on a sector boundary.
    SectorMisaligned,
}

impl ConfigError {
    pub const fn as_str(self) -> &'static str {
        match self {
            ConfigError::AlignNotPowerOfTwo => "flash alignment is not a power of two",
            ConfigError::AlignTooSmall => "flash alignment too small for a status row",
            ConfigError::RowTooLarge => "flash alignment larger than the largest supported row",
            ConfigError::NoSectors => "max image sectors is zero",
            ConfigError::TooManySectors => "max image sectors exceeds the supported count",
            ConfigError::NoCopies => "wear multiplier is zero",
            ConfigError::NoImages => "image count is zero",
            ConfigError::ImageOutOfRange => "image index beyond the configured image count",
            ConfigError::RowUnaligned => "flash write size does not divide the row size",
            ConfigError::EraseTooLarge => "flash erase size does not divide the row size",
            ConfigError::RegionTooSmall => "status region does not fit in flash",
            ConfigError::SectorMisaligned => "status area not on sector boundaries",
        }
    }
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}
