//! Image generation.
//!
//! Test images are just deterministic noise: the swap code never looks
//! inside them, tests only need to tell two images apart after a swap.

use rand::{RngCore, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;

pub struct GeneratedImage {
    pub data: Vec<u8>,
}

impl GeneratedImage {
    /// The bytes of one sector, given the sector size.
    pub fn sector(&self, sector: usize, sector_size: usize) -> &[u8] {
        let start = (sector * sector_size).min(self.data.len());
        let end = (start + sector_size).min(self.data.len());
        &self.data[start..end]
    }

    pub fn sectors(&self, sector_size: usize) -> usize {
        self.data.len().div_ceil(sector_size)
    }
}

pub struct GenBuilder {
    /// Total size of the image.
    size: usize,
    /// Seed for the PRNG
    seed: usize,
}

impl Default for GenBuilder {
    fn default() -> Self {
        GenBuilder {
            size: 76_137,
            seed: 1,
        }
    }
}

impl GenBuilder {
    pub fn size(&mut self, size: usize) -> &mut Self {
        self.size = size;
        self
    }

    pub fn seed(&mut self, seed: usize) -> &mut Self {
        self.seed = seed;
        self
    }

    pub fn build(&self) -> GeneratedImage {
        let mut rng = Xoshiro256Plus::seed_from_u64(self.seed as u64);
        let mut data = vec![0u8; self.size];
        rng.fill_bytes(&mut data);
        GeneratedImage { data }
    }
}
