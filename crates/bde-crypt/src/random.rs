//! Random source for subkeys and secure delete

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use zeroize::Zeroizing;

/// A cryptographically secure byte source that can be told to reseed.
pub trait RandomSource {
    fn fill_bytes(&mut self, buf: &mut [u8]);

    /// Stop using the current pool for anything sensitive.
    fn force_reseed(&mut self);
}

/// ChaCha-based `StdRng` seeded from OS entropy, reseeded on demand.
pub struct ReseedingRandom {
    rng: StdRng,
    reseeds: u64,
}

impl ReseedingRandom {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
            reseeds: 0,
        }
    }

    /// Number of forced reseeds so far.
    pub fn reseeds(&self) -> u64 {
        self.reseeds
    }
}

impl Default for ReseedingRandom {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ReseedingRandom {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReseedingRandom")
            .field("reseeds", &self.reseeds)
            .finish_non_exhaustive()
    }
}

impl RandomSource for ReseedingRandom {
    fn fill_bytes(&mut self, buf: &mut [u8]) {
        self.rng.fill_bytes(buf);
    }

    fn force_reseed(&mut self) {
        // Draw from the old pool before it is replaced
        let mut scratch = Zeroizing::new([0u8; 16]);
        self.rng.fill_bytes(&mut scratch[..]);
        self.rng = StdRng::from_entropy();
        self.reseeds += 1;
        tracing::trace!(reseeds = self.reseeds, "random source reseeded");
    }
}
