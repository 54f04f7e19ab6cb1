//! Resuming and reverting swaps.
//!
//! On every boot the trailers of both slots are read and the situation is
//! classified.  The classification depends on nothing but what is on flash,
//! so a reset at any point leads the next boot back to the same decision, and
//! every step taken from there can be repeated safely.
//!
//! Progress of a swap is always recorded in the status area of the primary
//! slot.  The secondary status area only ever holds a request.
//!
//! Moving the sector contents, and judging whether an image can be trusted,
//! are left to the [`SectorSwap`] and [`ImageVerifier`] collaborators.

use storage::{AreaMap, Flash, SlotRole};

use crate::status::{SectorState, Store, SwapState};
use crate::trailer::{Flag, MagicState, SwapType, Trailer, ENC_KEY_SIZE};
use crate::{log, Result};

/// Moves the contents of image sectors between the slots.
pub trait SectorSwap {
    /// Sectors the swap covers.
    fn sector_count(&self) -> usize;

    /// Bytes the swap moves, recorded in the trailer.
    fn swap_size(&self) -> u32;

    /// Encryption key material for the trailer, if the images are encrypted.
    fn enc_key(&self, _index: usize) -> Option<[u8; ENC_KEY_SIZE]> {
        None
    }

    /// Bring one sector to its swapped state.  For `Test` and `Perm` that
    /// puts the secondary contents in the primary slot.  `Revert` and `Fail`
    /// put the original contents back.  Repeating a call must be harmless.
    fn swap_sector(&mut self, sector: usize, swap_type: SwapType) -> Result<()>;
}

/// Decides whether the image in a slot may be booted.
pub trait ImageVerifier {
    fn verify(&mut self, slot: SlotRole) -> bool;
}

impl<T: FnMut(SlotRole) -> bool> ImageVerifier for T {
    fn verify(&mut self, slot: SlotRole) -> bool {
        self(slot)
    }
}

/// Which slot holds the status that describes the pending work.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Source {
    None,
    Primary,
    Secondary,
}

/// Find the slot whose trailer is both committed and furthest along.  A swap
/// in progress in the primary slot wins over a request in the secondary.
pub fn status_source(primary: &Trailer, secondary: &Trailer) -> Source {
    if primary.is_committed() && primary.swap_type.is_active() && primary.copy_done != Flag::Set {
        Source::Primary
    } else if secondary.is_committed() && secondary.swap_type.is_upgrade() {
        Source::Secondary
    } else {
        Source::None
    }
}

/// What the last boot left behind.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Classification {
    /// No swap requested or pending.  Boot the primary slot as is.
    Idle,
    /// A swap was started and not finished.
    Interrupted(SwapType),
    /// A test swap completed but was never confirmed.  The image has had its
    /// chance to run, so it gets reverted.
    Unconfirmed,
    /// The secondary slot asks to be swapped in.
    Requested(SwapType),
}

pub fn classify(primary: &Trailer, secondary: &Trailer) -> Classification {
    match status_source(primary, secondary) {
        Source::Primary => Classification::Interrupted(primary.swap_type),
        _ if primary.is_committed()
            && primary.swap_type == SwapType::Test
            && primary.copy_done == Flag::Set
            && primary.image_ok != Flag::Set =>
        {
            Classification::Unconfirmed
        }
        Source::Secondary => Classification::Requested(secondary.swap_type),
        Source::None => Classification::Idle,
    }
}

/// The result of a recovery pass.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BootOutcome {
    pub classification: Classification,
    /// The swap carried out during this pass, `Fail` when the candidate image
    /// was rejected or too large, `None` when nothing moved.
    pub swap_type: SwapType,
}

/// Drives a swap to a consistent end on boot.
pub struct Recovery<'s, F, M> {
    store: &'s mut Store<F, M>,
}

impl<'s, F: Flash, M: AreaMap> Recovery<'s, F, M> {
    pub fn new(store: &'s mut Store<F, M>) -> Self {
        Recovery { store }
    }

    /// Read both trailers and classify them.  A trailer that names another
    /// image counts as no trailer.
    pub fn classify(&mut self) -> Result<Classification> {
        let primary = self.store.area_id(SlotRole::Primary)?;
        let secondary = self.store.area_id(SlotRole::Secondary)?;
        let primary = self.own_trailer(primary)?;
        let secondary = self.own_trailer(secondary)?;
        let classification = classify(&primary, &secondary);
        log::info!(
            "swap status: {:?}, source {:?}",
            classification,
            status_source(&primary, &secondary)
        );
        Ok(classification)
    }

    fn own_trailer(&mut self, area_id: u8) -> Result<Trailer> {
        let trailer = self.store.read_trailer(area_id)?;
        if trailer.is_committed() && trailer.swap_type.is_active() && trailer.image != self.store.image() {
            log::warn!("area {} trailer is for image {}, ignoring", area_id, trailer.image);
            return Ok(Trailer::default());
        }
        Ok(trailer)
    }

    /// Bring the slots to a state that can be booted.  Once this returns Ok,
    /// the primary slot holds the image to run.
    ///
    /// Flash errors are returned without attempting anything further; the
    /// caller should not boot.
    pub fn run<S, V>(&mut self, mover: &mut S, verifier: &mut V) -> Result<BootOutcome>
    where
        S: SectorSwap,
        V: ImageVerifier,
    {
        let classification = self.classify()?;
        let result = match classification {
            Classification::Idle => Ok(SwapType::None),
            Classification::Requested(swap_type) => self.start(swap_type, mover, verifier),
            Classification::Interrupted(swap_type) => {
                log::info!("resuming {:?} swap", swap_type);
                self.finish(swap_type, mover, verifier)
            }
            Classification::Unconfirmed => {
                log::info!("test image not confirmed, reverting");
                self.restart(SwapType::Revert)
                    .and_then(|()| self.finish(SwapType::Revert, mover, verifier))
            }
        };
        let swap_type = result.map_err(|e| {
            log::error!("recovery stopped: {:?}", e);
            e
        })?;
        Ok(BootOutcome { classification, swap_type })
    }

    /// Begin the swap asked for by the secondary slot.
    fn start<S, V>(&mut self, swap_type: SwapType, mover: &mut S, verifier: &mut V) -> Result<SwapType>
    where
        S: SectorSwap,
        V: ImageVerifier,
    {
        let primary = self.store.area_id(SlotRole::Primary)?;
        let secondary = self.store.area_id(SlotRole::Secondary)?;

        if mover.sector_count() > self.store.geometry().max_image_sectors() {
            log::warn!("swap of {} sectors does not fit, dropping request", mover.sector_count());
            self.store.erase_trailer(secondary)?;
            return Ok(SwapType::Fail);
        }
        if !verifier.verify(SlotRole::Secondary) {
            log::warn!("secondary image rejected, dropping request");
            self.store.erase_trailer(secondary)?;
            return Ok(SwapType::Fail);
        }

        let request = self.store.read_trailer(secondary)?;
        let trailer = Trailer {
            enc_key1: mover.enc_key(0),
            enc_key2: mover.enc_key(1),
            swap_size: Some(mover.swap_size()),
            swap_type,
            image: self.store.image(),
            copy_done: Flag::Unset,
            image_ok: if swap_type == SwapType::Perm { request.image_ok } else { Flag::Unset },
            magic: MagicState::Good,
        };

        log::info!("starting {:?} swap of {} sectors", swap_type, mover.sector_count());
        self.store.erase_trailer(primary)?;
        self.store.write(primary, &SwapState::new(trailer, 0)?)?;
        self.finish(swap_type, mover, verifier)
    }

    /// Switch the primary status to a new kind of swap, with every sector
    /// pending.  The sector rows are cleared before the trailer changes; if
    /// power goes in between, the old classification is repeated and leads
    /// here again.
    fn restart(&mut self, swap_type: SwapType) -> Result<()> {
        let primary = self.store.area_id(SlotRole::Primary)?;
        let current = self.store.read_trailer(primary)?;
        self.store.reset_sectors(primary)?;
        let trailer = Trailer {
            swap_type,
            copy_done: Flag::Unset,
            image_ok: Flag::Unset,
            magic: MagicState::Good,
            ..current
        };
        self.store.replace_trailer(primary, &trailer)
    }

    /// Move every sector not yet done, then mark the swap complete.
    fn finish<S, V>(&mut self, swap_type: SwapType, mover: &mut S, verifier: &mut V) -> Result<SwapType>
    where
        S: SectorSwap,
        V: ImageVerifier,
    {
        let primary = self.store.area_id(SlotRole::Primary)?;
        let secondary = self.store.area_id(SlotRole::Secondary)?;

        let mut swap_type = swap_type;
        loop {
            self.move_sectors(swap_type, mover)?;
            if !swap_type.is_upgrade() || verifier.verify(SlotRole::Primary) {
                break;
            }
            log::warn!("swapped image failed verification, restoring");
            self.restart(SwapType::Fail)?;
            swap_type = SwapType::Fail;
        }

        // Drop the request before marking the swap done, so a finished swap
        // is never taken for a new request.
        if self.store.read_trailer(secondary)?.is_committed() {
            self.store.erase_trailer(secondary)?;
        }

        if swap_type.is_upgrade() {
            self.store.write_copy_done(primary)?;
        } else {
            let current = self.store.read_trailer(primary)?;
            let trailer = Trailer {
                copy_done: Flag::Set,
                image_ok: Flag::Set,
                ..current
            };
            self.store.replace_trailer(primary, &trailer)?;
        }
        log::info!("{:?} swap complete", swap_type);
        Ok(swap_type)
    }

    fn move_sectors<S: SectorSwap>(&mut self, swap_type: SwapType, mover: &mut S) -> Result<()> {
        let primary = self.store.area_id(SlotRole::Primary)?;
        let state = self.store.read(primary)?;
        let count = mover.sector_count().min(state.sectors.len());

        for sector in 0..count {
            if state.sectors[sector] == SectorState::Done {
                continue;
            }
            mover.swap_sector(sector, swap_type)?;
            self.store.set_sector_state(primary, sector, SectorState::Done)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trailer(swap_type: SwapType, copy_done: Flag, image_ok: Flag) -> Trailer {
        Trailer {
            swap_type,
            copy_done,
            image_ok,
            magic: MagicState::Good,
            ..Trailer::default()
        }
    }

    #[test]
    fn blank() {
        let blank = Trailer::default();
        assert_eq!(status_source(&blank, &blank), Source::None);
        assert_eq!(classify(&blank, &blank), Classification::Idle);
    }

    #[test]
    fn requests() {
        let blank = Trailer::default();
        let test = trailer(SwapType::Test, Flag::Unset, Flag::Unset);
        let perm = trailer(SwapType::Perm, Flag::Unset, Flag::Set);
        assert_eq!(status_source(&blank, &test), Source::Secondary);
        assert_eq!(classify(&blank, &test), Classification::Requested(SwapType::Test));
        assert_eq!(classify(&blank, &perm), Classification::Requested(SwapType::Perm));

        // An uncommitted request is no request.
        let partial = Trailer { magic: MagicState::Unset, ..test };
        assert_eq!(classify(&blank, &partial), Classification::Idle);
        let bad = Trailer { magic: MagicState::Bad, ..test };
        assert_eq!(classify(&blank, &bad), Classification::Idle);

        // Requests only ever ask for an upgrade.
        let revert = trailer(SwapType::Revert, Flag::Unset, Flag::Unset);
        assert_eq!(classify(&blank, &revert), Classification::Idle);
    }

    #[test]
    fn in_progress_wins() {
        let request = trailer(SwapType::Test, Flag::Unset, Flag::Unset);
        for swap_type in [SwapType::Test, SwapType::Perm, SwapType::Revert, SwapType::Fail] {
            let primary = trailer(swap_type, Flag::Unset, Flag::Unset);
            assert_eq!(status_source(&primary, &request), Source::Primary);
            assert_eq!(classify(&primary, &request), Classification::Interrupted(swap_type));
        }
    }

    #[test]
    fn after_copy() {
        let blank = Trailer::default();

        let unconfirmed = trailer(SwapType::Test, Flag::Set, Flag::Unset);
        assert_eq!(status_source(&unconfirmed, &blank), Source::None);
        assert_eq!(classify(&unconfirmed, &blank), Classification::Unconfirmed);

        let confirmed = trailer(SwapType::Test, Flag::Set, Flag::Set);
        assert_eq!(classify(&confirmed, &blank), Classification::Idle);

        let perm = trailer(SwapType::Perm, Flag::Set, Flag::Set);
        assert_eq!(classify(&perm, &blank), Classification::Idle);

        let reverted = trailer(SwapType::Revert, Flag::Set, Flag::Set);
        assert_eq!(classify(&reverted, &blank), Classification::Idle);

        // A new request after a confirmed swap.
        let request = trailer(SwapType::Perm, Flag::Unset, Flag::Set);
        assert_eq!(classify(&confirmed, &request), Classification::Requested(SwapType::Perm));
        // But an unconfirmed image is reverted first.
        assert_eq!(classify(&unconfirmed, &request), Classification::Unconfirmed);
    }
}
