//! Per-volume key parameters: zone geometry plus the master key pool

use bde_core::{BdeResult, Geometry};
use rand::RngCore;
use zeroize::Zeroize;

use crate::map::{map_sector, max_sector, SectorMap};
use crate::MKEYLEN;

/// The volume's master key pool. Only ever fed to kkey derivation.
///
/// Zeroized on drop to prevent secrets lingering in memory.
#[derive(Clone)]
pub struct MasterKey {
    bytes: [u8; MKEYLEN],
}

impl MasterKey {
    pub fn from_bytes(bytes: [u8; MKEYLEN]) -> Self {
        Self { bytes }
    }

    /// Draw a fresh master key from the thread RNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; MKEYLEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; MKEYLEN] {
        &self.bytes
    }
}

impl Drop for MasterKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Key parameters of an attached volume. Read-only once built, so one
/// instance can be shared by every request in flight.
#[derive(Debug, Clone)]
pub struct KeyParams {
    geometry: Geometry,
    master: MasterKey,
}

impl KeyParams {
    /// Validate `geometry` and bind it to `master`.
    pub fn new(geometry: Geometry, master: MasterKey) -> BdeResult<Self> {
        geometry.validate()?;
        tracing::debug!(
            sectorsize = geometry.sectorsize,
            zones = geometry.zones(),
            capacity = max_sector(&geometry),
            "key parameters ready"
        );
        Ok(Self { geometry, master })
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn master(&self) -> &MasterKey {
        &self.master
    }

    pub fn sectorsize(&self) -> u64 {
        self.geometry.sectorsize
    }

    /// See [`map_sector`].
    pub fn map_sector(&self, isector: u64) -> SectorMap {
        map_sector(&self.geometry, isector)
    }

    /// See [`max_sector`].
    pub fn max_sector(&self) -> u64 {
        max_sector(&self.geometry)
    }
}
