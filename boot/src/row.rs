//! Status rows
//!
//! Every piece of status is written as a whole row, laid out as
//!
//! +---------------------+---------+----------+
//! | payload             | counter | checksum |
//! +---------------------+---------+----------+
//!
//! with the counter and checksum as little-endian `u32`.  The checksum is the
//! CRC-32 of the counter bytes followed by the payload.  A row whose checksum
//! does not match is simply not there: this covers erased flash and rows that
//! were cut short by a reset, without treating either one specially.
//!
//! The same logical row exists once per wear copy.  The copy with the largest
//! counter is the current one.

use crate::geometry::{Geometry, CHECKSUM_SIZE, COUNTER_SIZE, MAX_ROW_SIZE};

/// Stack buffer for one encoded row, or one payload.
pub type RowBuf = heapless::Vec<u8, MAX_ROW_SIZE>;

/// A decoded row.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct StatusRow {
    pub counter: u32,
    pub payload: RowBuf,
}

/// The bytes do not hold a valid row.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Invalid;

pub fn checksum(counter: u32, payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&counter.to_le_bytes());
    hasher.update(payload);
    hasher.finalize()
}

/// Build the row holding `payload`, zero padded to the payload size.
///
/// Panics if the payload does not fit, which is a layout bug, not a runtime
/// condition.
pub fn encode(geometry: &Geometry, counter: u32, payload: &[u8]) -> RowBuf {
    assert!(payload.len() <= geometry.payload_size);

    let mut row = RowBuf::new();
    // Capacity is MAX_ROW_SIZE and the geometry never exceeds it.
    let _ = row.resize(geometry.payload_size, 0);
    row[..payload.len()].copy_from_slice(payload);

    let crc = checksum(counter, &row);
    let _ = row.extend_from_slice(&counter.to_le_bytes());
    let _ = row.extend_from_slice(&crc.to_le_bytes());
    row
}

/// Check and split a row read back from flash.
pub fn decode(geometry: &Geometry, bytes: &[u8]) -> Result<StatusRow, Invalid> {
    if bytes.len() != geometry.row_size {
        return Err(Invalid);
    }

    let (payload, tail) = bytes.split_at(geometry.payload_size);
    let (counter, crc) = tail.split_at(COUNTER_SIZE);
    let counter = u32::from_le_bytes(counter.try_into().map_err(|_| Invalid)?);
    let crc: [u8; CHECKSUM_SIZE] = crc.try_into().map_err(|_| Invalid)?;

    if u32::from_le_bytes(crc) != checksum(counter, payload) {
        return Err(Invalid);
    }

    let payload = RowBuf::from_slice(payload).map_err(|_| Invalid)?;
    Ok(StatusRow { counter, payload })
}

/// Pick the current row among the physical copies of one logical row.
///
/// Candidates are given in copy order, with `None` for copies that did not
/// decode.  The largest counter wins, and on a tie the later copy wins.
/// Returns the winning copy index along with the row.
pub fn select_current<I>(candidates: I) -> Option<(usize, StatusRow)>
where
    I: IntoIterator<Item = Option<StatusRow>>,
{
    let mut best: Option<(usize, StatusRow)> = None;
    for (copy, row) in candidates.into_iter().enumerate() {
        let Some(row) = row else {
            continue;
        };
        match &best {
            Some((_, current)) if current.counter > row.counter => (),
            _ => best = Some((copy, row)),
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use rand::{RngCore, SeedableRng};
    use rand_xoshiro::Xoshiro256Plus;

    use super::*;
    use crate::config::StatusConfig;

    fn geometry(align: usize) -> Geometry {
        Geometry::new(&StatusConfig::new(align, 64)).unwrap()
    }

    fn row(counter: u32, fill: u8) -> StatusRow {
        StatusRow {
            counter,
            payload: RowBuf::from_slice(&[fill; 8]).unwrap(),
        }
    }

    #[test]
    fn round_trip() {
        let mut rng = Xoshiro256Plus::seed_from_u64(7);
        for align in [64, 128, 512] {
            let geom = geometry(align);
            for counter in [0, 1, 0x1234_5678, u32::MAX - 1, u32::MAX] {
                let mut payload = [0u8; MAX_ROW_SIZE];
                let payload = &mut payload[..geom.payload_size];
                rng.fill_bytes(payload);

                let bytes = encode(&geom, counter, payload);
                assert_eq!(bytes.len(), geom.row_size);
                let decoded = decode(&geom, &bytes).unwrap();
                assert_eq!(decoded.counter, counter);
                assert_eq!(&decoded.payload[..], &payload[..]);
            }
        }
    }

    #[test]
    fn layout() {
        let geom = geometry(64);
        let bytes = encode(&geom, 0x0403_0201, &[0xaa, 0xbb]);
        assert_eq!(&bytes[..2], &[0xaa, 0xbb]);
        // Short payloads are zero padded.
        assert!(bytes[2..56].iter().all(|&b| b == 0));
        assert_eq!(&bytes[56..60], &[1, 2, 3, 4]);
        let crc = checksum(0x0403_0201, &bytes[..56]);
        assert_eq!(&bytes[60..64], &crc.to_le_bytes());
    }

    #[test]
    fn bit_flips() {
        let geom = geometry(64);
        let bytes = encode(&geom, 42, b"sector status");
        for bit in 0..bytes.len() * 8 {
            let mut bad = bytes.clone();
            bad[bit / 8] ^= 1 << (bit % 8);
            assert_eq!(decode(&geom, &bad), Err(Invalid), "bit {}", bit);
        }
    }

    #[test]
    fn erased() {
        for align in [64, 128, 256, 512] {
            let geom = geometry(align);
            let blank = [0xffu8; MAX_ROW_SIZE];
            assert_eq!(decode(&geom, &blank[..align]), Err(Invalid));
            let zero = [0u8; MAX_ROW_SIZE];
            assert_eq!(decode(&geom, &zero[..align]), Err(Invalid));
        }
    }

    #[test]
    fn truncated() {
        let geom = geometry(64);
        let bytes = encode(&geom, 3, &[1, 2, 3]);
        assert_eq!(decode(&geom, &bytes[..63]), Err(Invalid));

        // A write cut off half way leaves the tail erased.
        let mut torn = bytes.clone();
        torn[32..].fill(0xff);
        assert_eq!(decode(&geom, &torn), Err(Invalid));
    }

    #[test]
    fn recency() {
        assert_eq!(select_current([None, None, None]), None);
        assert_eq!(select_current(Vec::<Option<StatusRow>>::new()), None);

        let (copy, current) = select_current([Some(row(1, 1)), Some(row(2, 2))]).unwrap();
        assert_eq!((copy, current.counter), (1, 2));

        let (copy, current) = select_current([Some(row(9, 1)), Some(row(4, 2)), None]).unwrap();
        assert_eq!((copy, current.counter), (0, 9));

        let (copy, _) = select_current([None, Some(row(5, 1))]).unwrap();
        assert_eq!(copy, 1);

        // Equal counters: the later copy is the more recent write.
        let (copy, current) = select_current([Some(row(3, 1)), Some(row(3, 2))]).unwrap();
        assert_eq!((copy, current.payload[0]), (1, 2));
    }
}
