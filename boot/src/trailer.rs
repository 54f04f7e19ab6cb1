//! The image trailer.
//!
//! The trailer row describes the swap a slot is part of.  Its payload starts
//! with the following fields, in this order:
//!
//! | offset | size | field                                        |
//! |--------|------|----------------------------------------------|
//! | 0      | 16   | enc_key1                                     |
//! | 16     | 16   | enc_key2                                     |
//! | 32     | 4    | swap_size, little-endian                     |
//! | 36     | 1    | swap_info: swap type (low), image (high)     |
//! | 37     | 1    | copy_done                                    |
//! | 38     | 1    | image_ok                                     |
//! | 39     | 16   | magic                                        |
//!
//! Fields that have not been written hold the erased value, and the rest of
//! the payload is padding.  The magic is always written last: a trailer
//! without it has not been committed and means nothing.

/// Size of one encryption key.
pub const ENC_KEY_SIZE: usize = 16;

pub const MAGIC_SIZE: usize = 16;

/// The trailer magic, shared with the rest of the mcuboot family.
pub const BOOT_MAGIC: [u8; MAGIC_SIZE] = [
    0x77, 0xc2, 0x95, 0xf3, 0x60, 0xd2, 0xef, 0x7f, 0x35, 0x52, 0x50, 0x0f, 0x2c, 0xb6, 0x79, 0x80,
];

const ENC_KEY1_OFF: usize = 0;
const ENC_KEY2_OFF: usize = ENC_KEY1_OFF + ENC_KEY_SIZE;
const SWAP_SIZE_OFF: usize = ENC_KEY2_OFF + ENC_KEY_SIZE;
const SWAP_INFO_OFF: usize = SWAP_SIZE_OFF + 4;
const COPY_DONE_OFF: usize = SWAP_INFO_OFF + 1;
const IMAGE_OK_OFF: usize = COPY_DONE_OFF + 1;
const MAGIC_OFF: usize = IMAGE_OK_OFF + 1;

/// Bytes of the trailer payload in use.
pub const TRAILER_SIZE: usize = MAGIC_OFF + MAGIC_SIZE;

/// Flag byte value meaning "set".
const FLAG_SET: u8 = 0x01;
const FLAG_BAD: u8 = 0x02;

/// What kind of swap a trailer describes.  The discriminants are the values
/// stored in the low nibble of swap_info.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum SwapType {
    /// Nothing to do.
    None = 1,
    /// Run the secondary image once, revert unless it is confirmed.
    Test = 2,
    /// Swap for good.
    Perm = 3,
    /// Undo an unconfirmed test swap.
    Revert = 4,
    /// The swapped image failed verification, restore the original.
    Fail = 5,
}

impl SwapType {
    pub fn from_raw(raw: u8) -> Option<SwapType> {
        match raw {
            1 => Some(SwapType::None),
            2 => Some(SwapType::Test),
            3 => Some(SwapType::Perm),
            4 => Some(SwapType::Revert),
            5 => Some(SwapType::Fail),
            _ => None,
        }
    }

    /// Is this a swap that moves data?
    pub fn is_active(self) -> bool {
        self != SwapType::None
    }

    /// Does this swap put the secondary image in the primary slot?
    pub fn is_upgrade(self) -> bool {
        matches!(self, SwapType::Test | SwapType::Perm)
    }
}

/// A trailer flag.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Flag {
    Unset,
    Set,
    /// Neither erased nor set.
    Bad,
}

impl Flag {
    fn decode(raw: u8, erased: u8) -> Flag {
        if raw == erased {
            Flag::Unset
        } else if raw == FLAG_SET {
            Flag::Set
        } else {
            Flag::Bad
        }
    }

    fn encode(self, erased: u8) -> u8 {
        match self {
            Flag::Unset => erased,
            Flag::Set => FLAG_SET,
            Flag::Bad => FLAG_BAD,
        }
    }

    pub fn is_set(self) -> bool {
        self == Flag::Set
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MagicState {
    Unset,
    Good,
    Bad,
}

/// The decoded trailer of one slot.  The default value is what an erased
/// trailer reads as.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Trailer {
    pub enc_key1: Option<[u8; ENC_KEY_SIZE]>,
    pub enc_key2: Option<[u8; ENC_KEY_SIZE]>,
    pub swap_size: Option<u32>,
    pub swap_type: SwapType,
    /// Image index from the high nibble of swap_info.
    pub image: u8,
    pub copy_done: Flag,
    pub image_ok: Flag,
    pub magic: MagicState,
}

impl Default for Trailer {
    fn default() -> Self {
        Trailer {
            enc_key1: None,
            enc_key2: None,
            swap_size: None,
            swap_type: SwapType::None,
            image: 0,
            copy_done: Flag::Unset,
            image_ok: Flag::Unset,
            magic: MagicState::Unset,
        }
    }
}

impl Trailer {
    /// A trailer is only meaningful once its magic has been written.
    pub fn is_committed(&self) -> bool {
        self.magic == MagicState::Good
    }

    /// The swap type, counting an uncommitted trailer as no swap at all.
    pub fn effective_swap_type(&self) -> SwapType {
        if self.is_committed() {
            self.swap_type
        } else {
            SwapType::None
        }
    }

    /// Read the fields out of a trailer row payload.
    pub fn decode(payload: &[u8], erased: u8) -> Trailer {
        let key = |off: usize| {
            let mut key = [0u8; ENC_KEY_SIZE];
            key.copy_from_slice(&payload[off..off + ENC_KEY_SIZE]);
            if key.iter().all(|&b| b == erased) {
                None
            } else {
                Some(key)
            }
        };

        let raw_size = &payload[SWAP_SIZE_OFF..SWAP_SIZE_OFF + 4];
        let swap_size = if raw_size.iter().all(|&b| b == erased) {
            None
        } else {
            let mut size = [0u8; 4];
            size.copy_from_slice(raw_size);
            Some(u32::from_le_bytes(size))
        };

        let info = payload[SWAP_INFO_OFF];
        let (swap_type, image) = if info == erased {
            (SwapType::None, 0)
        } else {
            (SwapType::from_raw(info & 0x0f).unwrap_or(SwapType::None), info >> 4)
        };

        let magic = &payload[MAGIC_OFF..MAGIC_OFF + MAGIC_SIZE];
        let magic = if magic == &BOOT_MAGIC[..] {
            MagicState::Good
        } else if magic.iter().all(|&b| b == erased) {
            MagicState::Unset
        } else {
            MagicState::Bad
        };

        Trailer {
            enc_key1: key(ENC_KEY1_OFF),
            enc_key2: key(ENC_KEY2_OFF),
            swap_size,
            swap_type,
            image,
            copy_done: Flag::decode(payload[COPY_DONE_OFF], erased),
            image_ok: Flag::decode(payload[IMAGE_OK_OFF], erased),
            magic,
        }
    }

    /// Fill in a trailer row payload.  Absent fields get the erased value.
    pub fn encode(&self, payload: &mut [u8], erased: u8) {
        payload.fill(erased);

        if let Some(key) = &self.enc_key1 {
            payload[ENC_KEY1_OFF..ENC_KEY1_OFF + ENC_KEY_SIZE].copy_from_slice(key);
        }
        if let Some(key) = &self.enc_key2 {
            payload[ENC_KEY2_OFF..ENC_KEY2_OFF + ENC_KEY_SIZE].copy_from_slice(key);
        }
        if let Some(size) = self.swap_size {
            payload[SWAP_SIZE_OFF..SWAP_SIZE_OFF + 4].copy_from_slice(&size.to_le_bytes());
        }
        if self.swap_type.is_active() || self.image != 0 {
            payload[SWAP_INFO_OFF] = (self.image << 4) | (self.swap_type as u8 & 0x0f);
        }
        payload[COPY_DONE_OFF] = self.copy_done.encode(erased);
        payload[IMAGE_OK_OFF] = self.image_ok.encode(erased);
        match self.magic {
            MagicState::Good => {
                payload[MAGIC_OFF..MAGIC_OFF + MAGIC_SIZE].copy_from_slice(&BOOT_MAGIC);
            }
            MagicState::Bad => payload[MAGIC_OFF..MAGIC_OFF + MAGIC_SIZE].fill(!erased),
            MagicState::Unset => (),
        }
    }
}
