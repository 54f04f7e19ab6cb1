//! Image upgrade status
//!
//! The upgrade keeps track of its progress in a status region that is
//! separate from the image slots.  Each slot has its own status area, made of
//! per sector progress rows followed by a trailer row, and each row is stored
//! `wear_multiplier` times.  A write always goes to the copy after the current
//! one, with a counter one larger, so the current row is never the one being
//! erased or programmed.
//!
//! The status moves through the following states.
//!
//! (m = magic, t = swap type, cd = copy done, ok = image ok)
//!
//! +------------------+------------------+--------------------------------+
//! | Primary status   | Secondary status | State
//! +------------------+------------------+--------------------------------+
//! | blank            | blank            | None
//! | any              | m+t              | Request
//! | m+t              | any              | Started, sector rows show progress
//! | m+t+cd           | blank            | Copy done (test: to be confirmed)
//! | m+t+cd+ok        | blank            | Image ok - no further changes.
//! | m+revert         | blank            | Started revert
//! | m+revert+cd+ok   | blank            | Reverted - no further changes.
//! +------------------+------------------+--------------------------------+
//!
//! A trailer without its magic does not count: the trailer fields of a fresh
//! area are written one at a time with the magic last.  Once a trailer is
//! committed, it is only ever replaced by a whole new trailer row, so it goes
//! from one committed state to the next without a gap.

use storage::{AreaMap, Flash, SlotRole};

use crate::config::ConfigError;
use crate::erase::{check_boundaries, erase_area};
use crate::geometry::{Geometry, MAX_IMAGE_SECTORS, MAX_ROW_SIZE};
use crate::row::{self, RowBuf, StatusRow};
use crate::trailer::{Flag, MagicState, SwapType, Trailer};
use crate::{log, Error, Result};

/// Progress of one image sector.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SectorState {
    Pending,
    Done,
}

impl SectorState {
    const PENDING: u8 = 0;
    const DONE: u8 = 1;

    /// Anything but the done marker reads as pending.
    pub fn from_raw(raw: u8) -> SectorState {
        if raw == SectorState::DONE {
            SectorState::Done
        } else {
            SectorState::Pending
        }
    }

    pub fn raw(self) -> u8 {
        match self {
            SectorState::Pending => SectorState::PENDING,
            SectorState::Done => SectorState::DONE,
        }
    }
}

/// Everything recorded for one slot.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SwapState {
    pub trailer: Trailer,
    /// One entry per sector, up to the configured maximum.
    pub sectors: heapless::Vec<SectorState, MAX_IMAGE_SECTORS>,
}

impl SwapState {
    /// A state with every sector pending.  More sectors than any layout can
    /// track is `CannotUpgrade`.
    pub fn new(trailer: Trailer, sectors: usize) -> Result<SwapState> {
        let mut state = SwapState { trailer, sectors: heapless::Vec::new() };
        state
            .sectors
            .resize(sectors, SectorState::Pending)
            .map_err(|_| Error::CannotUpgrade)?;
        Ok(state)
    }

    /// Nothing has been recorded: no committed trailer and no progress.
    pub fn is_uninitialized(&self) -> bool {
        !self.trailer.is_committed() && self.done_count() == 0
    }

    pub fn done_count(&self) -> usize {
        self.sectors.iter().filter(|&&s| s == SectorState::Done).count()
    }
}

/// Where a row write landed.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RowLocation {
    pub copy: usize,
    pub counter: u32,
}

/// Durable swap state for the two slots of one image.
///
/// The store owns the status flash for as long as it lives; nothing else may
/// write it.  `into_inner` hands it back.
pub struct Store<F, M> {
    flash: F,
    map: M,
    geometry: Geometry,
    image: u8,
}

impl<F: Flash, M: AreaMap> Store<F, M> {
    /// Bind a status flash to a layout, checking that the device can hold it.
    pub fn new(flash: F, map: M, geometry: Geometry, image: u8) -> Result<Self> {
        if image as usize >= geometry.config().image_count {
            return Err(ConfigError::ImageOutOfRange.into());
        }
        if geometry.row_size % flash.write_size() != 0 {
            return Err(ConfigError::RowUnaligned.into());
        }
        if flash.erase_size() > geometry.row_size || geometry.row_size % flash.erase_size() != 0 {
            return Err(ConfigError::EraseTooLarge.into());
        }
        if geometry.region_size() > flash.capacity() {
            return Err(ConfigError::RegionTooSmall.into());
        }
        for role in SlotRole::ALL {
            check_boundaries(&flash, geometry.area_offset(image as usize, role), geometry.area_size)?;
        }
        if geometry.wear_multiplier == 1 {
            log::warn!("single status copy: row rewrites are not power fail safe");
        }

        Ok(Store { flash, map, geometry, image })
    }

    /// Give back the flash.
    pub fn into_inner(self) -> F {
        self.flash
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn image(&self) -> u8 {
        self.image
    }

    /// The area id of one of our slots.
    pub fn area_id(&self, role: SlotRole) -> Result<u8> {
        self.map
            .area_id(self.image, role)
            .ok_or(Error::Config(ConfigError::ImageOutOfRange))
    }

    /// Which of our slots an area id refers to.
    pub fn slot_of(&self, area_id: u8) -> Result<SlotRole> {
        self.map
            .slot_of(self.image, area_id)
            .ok_or(Error::InvalidArea(area_id))
    }

    /// Read back everything recorded for a slot.  An erased area reads as an
    /// uncommitted trailer with every sector pending.
    pub fn read(&mut self, area_id: u8) -> Result<SwapState> {
        let slot = self.slot_of(area_id)?;
        let trailer = self.trailer_of(slot)?;
        let mut state = SwapState::new(trailer, 0)?;

        let max = self.geometry.max_image_sectors();
        for row in 0..self.geometry.sector_rows {
            let payload = self.sector_payload(slot, row)?;
            for &raw in payload.iter() {
                if state.sectors.len() == max {
                    break;
                }
                let _ = state.sectors.push(SectorState::from_raw(raw));
            }
        }
        Ok(state)
    }

    /// Write a whole state: sector rows first, then the trailer.  Rows that
    /// already hold the wanted content are left alone.
    ///
    /// If the slot has a committed trailer it is replaced in a single row
    /// write, otherwise the trailer is built up field by field with the magic
    /// last.  Either way the slot ends up with a committed trailer.
    ///
    /// A state with more sectors than the layout tracks is refused before
    /// anything is written.
    pub fn write(&mut self, area_id: u8, state: &SwapState) -> Result<()> {
        let slot = self.slot_of(area_id)?;
        if state.sectors.len() > self.geometry.max_image_sectors() {
            log::error!("state of {} sectors does not fit", state.sectors.len());
            return Err(Error::CannotUpgrade);
        }
        let payload_size = self.geometry.payload_size;

        for row in 0..self.geometry.sector_rows {
            let mut payload = zeroed(payload_size);
            let first = row * payload_size;
            for (byte, sector) in state.sectors.iter().skip(first).take(payload_size).enumerate() {
                payload[byte] = sector.raw();
            }
            if self.sector_payload(slot, row)? != payload {
                self.write_row(slot, row, &payload)?;
            }
        }

        if self.trailer_of(slot)?.is_committed() {
            let trailer = Trailer { magic: MagicState::Good, ..state.trailer };
            self.put_trailer(slot, &trailer)?;
        } else {
            self.stage_trailer(slot, &state.trailer)?;
        }
        Ok(())
    }

    /// Erase the status area of a slot, ready for a fresh `write`.
    ///
    /// Committed trailers are retired first, so an erase cut short never
    /// leaves one behind at the head of the area.
    pub fn erase_trailer(&mut self, area_id: u8) -> Result<()> {
        let slot = self.slot_of(area_id)?;
        self.retire_trailer(slot)?;
        log::debug!("Erasing trailer; fa_id={}", area_id);
        let base = self.geometry.area_offset(self.image as usize, slot);
        erase_area(&mut self.flash, base, self.geometry.area_size)?;
        Ok(())
    }

    /// The current trailer of a slot.
    pub fn read_trailer(&mut self, area_id: u8) -> Result<Trailer> {
        let slot = self.slot_of(area_id)?;
        self.trailer_of(slot)
    }

    /// Write a trailer into a fresh area, one field per row write, in the
    /// order keys, swap size, swap type, flags, magic.  The magic is always
    /// written, whatever `trailer.magic` says.
    pub fn init_trailer(&mut self, area_id: u8, trailer: &Trailer) -> Result<()> {
        let slot = self.slot_of(area_id)?;
        self.stage_trailer(slot, trailer)
    }

    /// Replace the trailer with a single row write.
    pub fn replace_trailer(&mut self, area_id: u8, trailer: &Trailer) -> Result<()> {
        let slot = self.slot_of(area_id)?;
        self.put_trailer(slot, trailer)?;
        Ok(())
    }

    pub fn write_copy_done(&mut self, area_id: u8) -> Result<()> {
        let slot = self.slot_of(area_id)?;
        let trailer = self.trailer_of(slot)?;
        if trailer.copy_done != Flag::Set {
            self.put_trailer(slot, &Trailer { copy_done: Flag::Set, ..trailer })?;
        }
        Ok(())
    }

    pub fn write_image_ok(&mut self, area_id: u8) -> Result<()> {
        let slot = self.slot_of(area_id)?;
        let trailer = self.trailer_of(slot)?;
        if trailer.image_ok != Flag::Set {
            self.put_trailer(slot, &Trailer { image_ok: Flag::Set, ..trailer })?;
        }
        Ok(())
    }

    pub fn sector_state(&mut self, area_id: u8, sector: usize) -> Result<SectorState> {
        let slot = self.slot_of(area_id)?;
        let (row, byte) = self.sector_index(sector)?;
        let payload = self.sector_payload(slot, row)?;
        Ok(SectorState::from_raw(payload[byte]))
    }

    /// Record the progress of one sector.  Writing the state a sector already
    /// has costs nothing.
    pub fn set_sector_state(&mut self, area_id: u8, sector: usize, state: SectorState) -> Result<()> {
        let slot = self.slot_of(area_id)?;
        let (row, byte) = self.sector_index(sector)?;
        let mut payload = self.sector_payload(slot, row)?;
        if SectorState::from_raw(payload[byte]) == state {
            return Ok(());
        }
        payload[byte] = state.raw();
        log::trace!("sector {} {:?}", sector, state);
        self.write_row(slot, row, &payload)?;
        Ok(())
    }

    /// Mark every sector pending, rewriting only rows that record progress.
    pub fn reset_sectors(&mut self, area_id: u8) -> Result<()> {
        let slot = self.slot_of(area_id)?;
        for row in 0..self.geometry.sector_rows {
            if let Some((_, current)) = self.current_row(slot, row)? {
                if current.payload.iter().any(|&b| b != SectorState::PENDING) {
                    let payload = zeroed(self.geometry.payload_size);
                    self.write_row(slot, row, &payload)?;
                }
            }
        }
        Ok(())
    }

    /// Ask for the secondary image to be swapped in on the next boot, once as
    /// a test or for good.
    pub fn request_upgrade(&mut self, permanent: bool) -> Result<()> {
        let secondary = self.area_id(SlotRole::Secondary)?;
        let trailer = Trailer {
            swap_type: if permanent { SwapType::Perm } else { SwapType::Test },
            image: self.image,
            image_ok: if permanent { Flag::Set } else { Flag::Unset },
            ..Trailer::default()
        };
        log::info!("upgrade requested: {:?}", trailer.swap_type);
        self.erase_trailer(secondary)?;
        self.init_trailer(secondary, &trailer)
    }

    /// Mark the running image good, so it will not be reverted.  Nothing
    /// happens if no swap is recorded.
    pub fn confirm(&mut self) -> Result<()> {
        let primary = self.area_id(SlotRole::Primary)?;
        if !self.read_trailer(primary)?.is_committed() {
            return Ok(());
        }
        self.write_image_ok(primary)
    }

    /// Read every copy of a logical row and pick the current one.
    pub fn current_row(&mut self, slot: SlotRole, row: usize) -> Result<Option<(usize, StatusRow)>> {
        let mut failure = None;
        let copies = self.geometry.wear_multiplier;
        let candidates = (0..copies).map(|copy| match self.read_copy(slot, copy, row) {
            Ok(candidate) => candidate,
            Err(e) => {
                failure.get_or_insert(e);
                None
            }
        });
        let current = row::select_current(candidates);
        match failure {
            Some(e) => Err(e),
            None => Ok(current),
        }
    }

    /// Write a new version of a logical row into the copy after the current
    /// one.
    pub fn write_row(&mut self, slot: SlotRole, row: usize, payload: &[u8]) -> Result<RowLocation> {
        let (copy, counter) = match self.current_row(slot, row)? {
            Some((copy, current)) => (
                (copy + 1) % self.geometry.wear_multiplier,
                current.counter.checked_add(1).ok_or(Error::CounterExhausted)?,
            ),
            None => (0, 1),
        };

        let bytes = row::encode(&self.geometry, counter, payload);
        let offset = self.geometry.row_offset(self.image as usize, slot, copy, row);
        self.program(offset, &bytes)?;
        Ok(RowLocation { copy, counter })
    }

    fn read_copy(&mut self, slot: SlotRole, copy: usize, row: usize) -> Result<Option<StatusRow>> {
        let mut buf = [0u8; MAX_ROW_SIZE];
        let buf = &mut buf[..self.geometry.row_size];
        let offset = self.geometry.row_offset(self.image as usize, slot, copy, row);

        match self.flash.read(offset, buf) {
            Ok(()) => (),
            // Never programmed, so nothing valid there.
            Err(storage::Error::NotWritten) => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        match row::decode(&self.geometry, buf) {
            Ok(decoded) => Ok(Some(decoded)),
            Err(_) => {
                log::trace!("no valid row at 0x{:x}", offset);
                Ok(None)
            }
        }
    }

    /// Program one encoded row, erasing it first unless it is already blank.
    fn program(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        let erased = self.flash.erased_value();
        let mut buf = [0u8; MAX_ROW_SIZE];
        let buf = &mut buf[..bytes.len()];
        let blank = match self.flash.read(offset, buf) {
            Ok(()) => buf.iter().all(|&b| b == erased),
            Err(storage::Error::NotWritten) => false,
            Err(e) => return Err(e.into()),
        };
        if !blank {
            self.flash.erase(offset, offset + bytes.len())?;
        }
        self.flash.write(offset, bytes)?;
        Ok(())
    }

    fn sector_index(&self, sector: usize) -> Result<(usize, usize)> {
        if sector >= self.geometry.max_image_sectors() {
            return Err(Error::CannotUpgrade);
        }
        Ok(self.geometry.sector_position(sector))
    }

    /// Payload of a sector row, all pending if there is no valid row.
    fn sector_payload(&mut self, slot: SlotRole, row: usize) -> Result<RowBuf> {
        Ok(match self.current_row(slot, row)? {
            Some((_, current)) => current.payload,
            None => zeroed(self.geometry.payload_size),
        })
    }

    fn trailer_of(&mut self, slot: SlotRole) -> Result<Trailer> {
        let erased = self.flash.erased_value();
        Ok(match self.current_row(slot, self.geometry.trailer_row())? {
            Some((_, current)) => Trailer::decode(&current.payload, erased),
            None => Trailer::default(),
        })
    }

    /// Overwrite every copy of the trailer row with an uncommitted trailer,
    /// if any copy still holds a committed one.  Older copies come back when
    /// the newest is erased, and the erase starts at the tail, which is where
    /// the newest may well be.
    fn retire_trailer(&mut self, slot: SlotRole) -> Result<()> {
        let erased = self.flash.erased_value();
        let row = self.geometry.trailer_row();
        let mut committed = false;
        for copy in 0..self.geometry.wear_multiplier {
            if let Some(found) = self.read_copy(slot, copy, row)? {
                committed |= Trailer::decode(&found.payload, erased).is_committed();
            }
        }
        if committed {
            log::debug!("retiring {:?} trailer", slot);
            for _ in 0..self.geometry.wear_multiplier {
                self.put_trailer(slot, &Trailer::default())?;
            }
        }
        Ok(())
    }

    fn put_trailer(&mut self, slot: SlotRole, trailer: &Trailer) -> Result<RowLocation> {
        let mut payload = [0u8; MAX_ROW_SIZE];
        let payload = &mut payload[..self.geometry.payload_size];
        trailer.encode(payload, self.flash.erased_value());
        self.write_row(slot, self.geometry.trailer_row(), payload)
    }

    fn stage_trailer(&mut self, slot: SlotRole, trailer: &Trailer) -> Result<()> {
        let mut staged = Trailer::default();

        if self.geometry.config().encryption {
            if let Some(key) = trailer.enc_key1 {
                staged.enc_key1 = Some(key);
                self.put_trailer(slot, &staged)?;
            }
            if let Some(key) = trailer.enc_key2 {
                staged.enc_key2 = Some(key);
                self.put_trailer(slot, &staged)?;
            }
        }
        if trailer.swap_size.is_some() {
            staged.swap_size = trailer.swap_size;
            self.put_trailer(slot, &staged)?;
        }
        if trailer.swap_type.is_active() {
            staged.swap_type = trailer.swap_type;
            staged.image = trailer.image;
            self.put_trailer(slot, &staged)?;
        }
        if trailer.copy_done != Flag::Unset || trailer.image_ok != Flag::Unset {
            staged.copy_done = trailer.copy_done;
            staged.image_ok = trailer.image_ok;
            self.put_trailer(slot, &staged)?;
        }

        staged.magic = MagicState::Good;
        self.put_trailer(slot, &staged)?;
        Ok(())
    }
}

fn zeroed(len: usize) -> RowBuf {
    let mut buf = RowBuf::new();
    let _ = buf.resize(len, 0);
    buf
}

#[cfg(test)]
mod tests {
    use simflash::SimFlash;
    use storage::DefaultAreaMap;

    use super::*;
    use crate::config::StatusConfig;

    const PRIMARY: u8 = 1;
    const SECONDARY: u8 = 2;

    fn store(config: StatusConfig) -> Store<SimFlash, DefaultAreaMap> {
        let geometry = Geometry::new(&config).unwrap();
        let flash = SimFlash::new(1, config.flash_align, config.flash_align, 64).unwrap();
        Store::new(flash, DefaultAreaMap { images: 1 }, geometry, 0).unwrap()
    }

    fn reopen(flash: SimFlash, config: StatusConfig) -> Store<SimFlash, DefaultAreaMap> {
        let geometry = Geometry::new(&config).unwrap();
        Store::new(flash, DefaultAreaMap { images: 1 }, geometry, 0).unwrap()
    }

    #[test]
    fn erased_reads_uninitialized() {
        let mut store = store(StatusConfig::new(128, 300));
        for area in [PRIMARY, SECONDARY] {
            let state = store.read(area).unwrap();
            assert!(state.is_uninitialized());
            assert_eq!(state.trailer, Trailer::default());
            assert_eq!(state.sectors.len(), 300);
            assert!(state.sectors.iter().all(|&s| s == SectorState::Pending));
        }
    }

    #[test]
    fn unknown_area() {
        let mut store = store(StatusConfig::new(128, 16));
        assert_eq!(store.read(0), Err(Error::InvalidArea(0)));
        assert_eq!(store.read_trailer(3), Err(Error::InvalidArea(3)));
        assert_eq!(store.erase_trailer(9), Err(Error::InvalidArea(9)));
        assert_eq!(store.set_sector_state(7, 0, SectorState::Done), Err(Error::InvalidArea(7)));
    }

    #[test]
    fn sector_progress() {
        let mut store = store(StatusConfig::new(64, 200));
        for sector in [0, 55, 56, 199] {
            store.set_sector_state(PRIMARY, sector, SectorState::Done).unwrap();
        }
        assert_eq!(store.sector_state(PRIMARY, 55).unwrap(), SectorState::Done);
        assert_eq!(store.sector_state(PRIMARY, 54).unwrap(), SectorState::Pending);
        assert_eq!(store.sector_state(SECONDARY, 55).unwrap(), SectorState::Pending);
        assert_eq!(store.set_sector_state(PRIMARY, 200, SectorState::Done), Err(Error::CannotUpgrade));

        let state = store.read(PRIMARY).unwrap();
        assert_eq!(state.done_count(), 4);
        assert_eq!(state.sectors[56], SectorState::Done);

        store.reset_sectors(PRIMARY).unwrap();
        assert_eq!(store.read(PRIMARY).unwrap().done_count(), 0);
    }

    #[test]
    fn repeat_costs_nothing() {
        let mut store = store(StatusConfig::new(64, 10));
        store.set_sector_state(PRIMARY, 3, SectorState::Done).unwrap();
        let before = store.current_row(SlotRole::Primary, 0).unwrap().unwrap();
        store.set_sector_state(PRIMARY, 3, SectorState::Done).unwrap();
        let after = store.current_row(SlotRole::Primary, 0).unwrap().unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn whole_state() {
        let mut store = store(StatusConfig::new(256, 40).encryption(true));
        let trailer = Trailer {
            enc_key1: Some([1; 16]),
            enc_key2: Some([2; 16]),
            swap_size: Some(40 * 4096),
            swap_type: SwapType::Test,
            ..Trailer::default()
        };
        let mut state = SwapState::new(trailer, 40).unwrap();
        state.sectors[7] = SectorState::Done;
        store.write(PRIMARY, &state).unwrap();

        let back = store.read(PRIMARY).unwrap();
        assert!(back.trailer.is_committed());
        assert_eq!(back.trailer.swap_type, SwapType::Test);
        assert_eq!(back.trailer.enc_key2, Some([2; 16]));
        assert_eq!(back.trailer.copy_done, Flag::Unset);
        assert_eq!(back.sectors, state.sectors);

        // A committed trailer is replaced in one go.
        let counter = store.current_row(SlotRole::Primary, 1).unwrap().unwrap().1.counter;
        state.trailer.copy_done = Flag::Set;
        store.write(PRIMARY, &state).unwrap();
        let back = store.read(PRIMARY).unwrap();
        assert_eq!(back.trailer.copy_done, Flag::Set);
        assert!(back.trailer.is_committed());
        let (_, row) = store.current_row(SlotRole::Primary, 1).unwrap().unwrap();
        assert_eq!(row.counter, counter + 1);
    }

    #[test]
    fn oversized_state() {
        assert_eq!(
            SwapState::new(Trailer::default(), MAX_IMAGE_SECTORS + 1),
            Err(Error::CannotUpgrade)
        );

        let mut store = store(StatusConfig::new(128, 8));
        let trailer = Trailer { swap_type: SwapType::Test, ..Trailer::default() };
        let state = SwapState::new(trailer, 10).unwrap();
        assert_eq!(store.write(PRIMARY, &state), Err(Error::CannotUpgrade));
        assert!(store.read(PRIMARY).unwrap().is_uninitialized());

        let state = SwapState::new(trailer, 8).unwrap();
        store.write(PRIMARY, &state).unwrap();
        assert!(store.read_trailer(PRIMARY).unwrap().is_committed());
    }

    #[test]
    fn erase_retires_every_copy() {
        let config = StatusConfig::new(128, 8).wear_multiplier(3);
        let mut store = store(config);
        store.request_upgrade(false).unwrap();

        // Three trailer rewrites get through (five operations, as the first
        // lands on a blank copy), then the erase of the last sector is cut
        // short.
        let mut flash = store.into_inner();
        flash.fail_after(5);
        let mut store = reopen(flash, config);
        assert_eq!(store.erase_trailer(SECONDARY), Err(Error::Flash(storage::Error::Device)));

        let mut flash = store.into_inner();
        flash.power_cycle();
        let mut store = reopen(flash, config);
        let row = store.geometry().trailer_row();
        for copy in 0..3 {
            if let Some(found) = store.read_copy(SlotRole::Secondary, copy, row).unwrap() {
                assert!(!Trailer::decode(&found.payload, 0xff).is_committed(), "copy {}", copy);
            }
        }
        assert!(!store.read_trailer(SECONDARY).unwrap().is_committed());

        store.erase_trailer(SECONDARY).unwrap();
        assert!(store.read(SECONDARY).unwrap().is_uninitialized());
    }

    #[test]
    fn keys_only_with_encryption() {
        let mut store = store(StatusConfig::new(128, 8));
        let trailer = Trailer {
            enc_key1: Some([9; 16]),
            swap_type: SwapType::Perm,
            ..Trailer::default()
        };
        store.init_trailer(PRIMARY, &trailer).unwrap();
        let back = store.read_trailer(PRIMARY).unwrap();
        assert_eq!(back.enc_key1, None);
        assert_eq!(back.swap_type, SwapType::Perm);
        assert!(back.is_committed());
    }

    #[test]
    fn flags() {
        let mut store = store(StatusConfig::new(128, 8));
        // Confirming with nothing recorded is a no-op.
        store.confirm().unwrap();
        assert_eq!(store.read_trailer(PRIMARY).unwrap(), Trailer::default());

        store.init_trailer(PRIMARY, &Trailer { swap_type: SwapType::Test, ..Trailer::default() }).unwrap();
        store.write_copy_done(PRIMARY).unwrap();
        store.confirm().unwrap();
        let trailer = store.read_trailer(PRIMARY).unwrap();
        assert_eq!(trailer.copy_done, Flag::Set);
        assert_eq!(trailer.image_ok, Flag::Set);
        assert!(trailer.is_committed());
    }

    #[test]
    fn request() {
        let mut store = store(StatusConfig::new(128, 8));
        store.request_upgrade(true).unwrap();
        let trailer = store.read_trailer(SECONDARY).unwrap();
        assert_eq!(trailer.swap_type, SwapType::Perm);
        assert_eq!(trailer.image_ok, Flag::Set);
        assert!(trailer.is_committed());

        store.request_upgrade(false).unwrap();
        let trailer = store.read_trailer(SECONDARY).unwrap();
        assert_eq!(trailer.swap_type, SwapType::Test);
        assert_eq!(trailer.image_ok, Flag::Unset);
        assert_eq!(store.read_trailer(PRIMARY).unwrap(), Trailer::default());
    }

    #[test]
    fn bad_devices() {
        let geometry = Geometry::new(&StatusConfig::new(128, 8)).unwrap();
        let map = DefaultAreaMap { images: 1 };

        let big_erase = SimFlash::new(1, 128, 1024, 8).unwrap();
        assert!(matches!(
            Store::new(big_erase, map, geometry, 0),
            Err(Error::Config(ConfigError::EraseTooLarge))
        ));

        let big_write = SimFlash::new(1, 256, 256, 8).unwrap();
        assert!(matches!(
            Store::new(big_write, map, geometry, 0),
            Err(Error::Config(ConfigError::RowUnaligned))
        ));

        // Two slots of two copies of two rows need 1024 bytes.
        let small = SimFlash::new(1, 128, 128, 7).unwrap();
        assert!(matches!(
            Store::new(small, map, geometry, 0),
            Err(Error::Config(ConfigError::RegionTooSmall))
        ));

        let flash = SimFlash::new(1, 128, 128, 8).unwrap();
        assert!(matches!(
            Store::new(flash, map, geometry, 1),
            Err(Error::Config(ConfigError::ImageOutOfRange))
        ));
    }
}
