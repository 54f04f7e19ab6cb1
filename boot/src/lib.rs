//! Swap-status bookkeeping for an embedded bootloader.
//!
//! Firmware is upgraded by swapping the contents of a primary and a secondary
//! slot.  Power can go away at any instruction, so the progress of that swap
//! is recorded in a dedicated status flash region, and every boot starts by
//! reading it back to decide whether to resume, revert, or just boot.
//!
//! - [`Geometry`] derives the layout of the status region from a
//!   [`StatusConfig`].
//! - [`row`] packs status into checksummed, counted rows.
//! - [`Store`] keeps the trailer and per sector progress of each slot, writing
//!   rows round-robin over several copies to spread wear.
//! - [`Recovery`] classifies what the last boot left behind and drives the
//!   sector swap to completion.

#![cfg_attr(not(any(feature = "std", test)), no_std)]

mod config;
mod erase;
mod geometry;
pub mod row;
mod status;
mod swap;
mod trailer;

pub use config::{ConfigError, StatusConfig};
pub use erase::erase_area;
pub use geometry::{
    Geometry, CHECKSUM_SIZE, COUNTER_SIZE, MAX_IMAGE_SECTORS, MAX_ROW_SIZE, SLOT_COUNT,
    TRAILER_ROWS,
};
pub use status::{RowLocation, SectorState, Store, SwapState};
pub use swap::{
    classify, status_source, BootOutcome, Classification, ImageVerifier, Recovery, SectorSwap,
    Source,
};
pub use trailer::{Flag, MagicState, SwapType, Trailer, BOOT_MAGIC, ENC_KEY_SIZE, TRAILER_SIZE};

pub use storage::SlotRole;

pub type Result<T> = core::result::Result<T, Error>;

// Use the error kind to avoid this depending on the particular flash.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    Flash(storage::Error),
    Config(ConfigError),
    /// The flash area id names neither slot of this image.
    InvalidArea(u8),
    /// A row counter would wrap.  Not reachable within flash endurance.
    CounterExhausted,
    /// The swap does not fit the configured layout.
    CannotUpgrade,
}

/// Convert the flash error into our error type.
impl From<storage::Error> for Error {
    fn from(e: storage::Error) -> Self {
        Error::Flash(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::Flash(e) => write!(f, "flash error: {:?}", e),
            Error::Config(e) => write!(f, "bad configuration: {}", e),
            Error::InvalidArea(id) => write!(f, "invalid flash area id {}", id),
            Error::CounterExhausted => f.write_str("status row counter exhausted"),
            Error::CannotUpgrade => f.write_str("swap does not fit the status layout"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

// Logging goes to defmt or the log crate, whichever is enabled, and vanishes
// otherwise.
#[cfg(feature = "defmt")]
pub(crate) mod log {
    pub(crate) use defmt::{debug, error, info, trace, warn};
}

#[cfg(all(feature = "log", not(feature = "defmt")))]
pub(crate) mod log {
    pub(crate) use ::log::{debug, error, info, trace, warn};
}

#[cfg(not(any(feature = "log", feature = "defmt")))]
pub(crate) mod log {
    macro_rules! discard {
        ($($arg:expr),* $(,)?) => {{ $( let _ = &$arg; )* }};
    }
    pub(crate) use discard as debug;
    pub(crate) use discard as error;
    pub(crate) use discard as info;
    pub(crate) use discard as trace;
    pub(crate) use discard as warn;
}
