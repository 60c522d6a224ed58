use serde::{Deserialize, Serialize};

use crate::error::{BdeError, BdeResult};

/// Number of lock sectors reserved on every volume
pub const MAXKEYS: usize = 4;

/// Size of the master key pool in bytes (2048-bit)
pub const MKEYLEN: usize = 2048 / 8;

/// Size of one stored per-sector subkey in bytes (128-bit)
pub const SKEYLEN: usize = 16;

/// Zone geometry of an encrypted volume.
///
/// Every address and length here is in bytes and sector aligned. The media is
/// cut into zones of `zone_width` bytes; the first `zone_cont` bytes of a zone
/// carry logical data, the last sector of the zone holds the encrypted subkeys
/// of the zone's data sectors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Geometry {
    /// Sector size (power of two)
    pub sectorsize: u64,
    /// Physical span available to zones and lock sectors
    pub media_width: u64,
    /// Physical offset of the first byte of the span
    pub sector0: u64,
    /// Physical stride of one zone
    pub zone_width: u64,
    /// Logical bytes held by one zone
    pub zone_cont: u64,
    /// Rotation applied to every physical address (not secret)
    pub keyoffset: u64,
    /// Physical offsets of the lock sectors
    pub lsector: [u64; MAXKEYS],
}

impl Default for Geometry {
    fn default() -> Self {
        let sectorsize = 512;
        let zone_cont = 32 * sectorsize;
        let zone_width = zone_cont + sectorsize;
        Self {
            sectorsize,
            media_width: 64 * zone_width + MAXKEYS as u64 * sectorsize,
            sector0: 0,
            zone_width,
            zone_cont,
            keyoffset: 0,
            lsector: [0, sectorsize, 2 * sectorsize, 3 * sectorsize],
        }
    }
}

impl Geometry {
    /// Span the mapper wraps addresses into, leaving room for the lock sectors.
    pub fn usable_width(&self) -> u64 {
        self.media_width - MAXKEYS as u64 * self.sectorsize
    }

    /// Number of whole zones on the media.
    pub fn zones(&self) -> u64 {
        self.media_width / self.zone_width
    }

    /// Data sectors per zone, i.e. subkeys stored in each key sector.
    pub fn sectors_per_zone(&self) -> u64 {
        self.zone_cont / self.sectorsize
    }

    /// Bytes of encrypted subkeys at the start of each key sector.
    pub fn key_sector_len(&self) -> u64 {
        self.sectors_per_zone() * SKEYLEN as u64
    }

    /// Check the invariants the mapper and the sector transform rely on.
    pub fn validate(&self) -> BdeResult<()> {
        let ss = self.sectorsize;
        if ss < 16 || !ss.is_power_of_two() {
            return Err(geometry(format!(
                "sectorsize {ss} must be a power of two of at least 16"
            )));
        }

        for (name, value) in [
            ("media_width", self.media_width),
            ("sector0", self.sector0),
            ("zone_width", self.zone_width),
            ("zone_cont", self.zone_cont),
            ("keyoffset", self.keyoffset),
        ] {
            if value % ss != 0 {
                return Err(geometry(format!(
                    "{name} {value} is not a multiple of sectorsize {ss}"
                )));
            }
        }

        if self.zone_cont == 0 || self.zone_cont + ss > self.zone_width {
            return Err(geometry(format!(
                "zone_cont {} leaves no key sector in zone_width {}",
                self.zone_cont, self.zone_width
            )));
        }

        let key_bytes = self.key_sector_len();
        if key_bytes > ss {
            return Err(geometry(format!(
                "{} subkeys per zone need {key_bytes} bytes, key sector holds {ss}",
                self.sectors_per_zone()
            )));
        }

        let reserved = MAXKEYS as u64 * ss;
        if self.media_width <= reserved {
            return Err(geometry(format!(
                "media_width {} does not exceed the {reserved} bytes of lock sectors",
                self.media_width
            )));
        }
        if self.zones() == 0 || self.zones() * self.zone_width > self.usable_width() {
            return Err(geometry(format!(
                "{} zones of {} bytes do not fit in the usable width {}",
                self.zones(),
                self.zone_width,
                self.usable_width()
            )));
        }

        let end = self.sector0 + self.media_width;
        for (i, &lsec) in self.lsector.iter().enumerate() {
            if lsec % ss != 0 {
                return Err(geometry(format!("lock sector {i} at {lsec} is not aligned")));
            }
            if lsec < self.sector0 || lsec >= end {
                return Err(geometry(format!(
                    "lock sector {i} at {lsec} is outside [{}, {end})",
                    self.sector0
                )));
            }
            if self.lsector[..i].contains(&lsec) {
                return Err(geometry(format!("lock sector {i} at {lsec} is a duplicate")));
            }
        }

        Ok(())
    }
}

fn geometry(msg: String) -> BdeError {
    BdeError::Geometry(msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_rejected(g: &Geometry, needle: &str) {
        match g.validate() {
            Err(BdeError::Geometry(msg)) => {
                assert!(msg.contains(needle), "unexpected message: {msg}")
            }
            other => panic!("expected geometry error containing {needle:?}, got {other:?}"),
        }
    }

    #[test]
    fn test_default_geometry_is_valid() {
        let g = Geometry::default();
        g.validate().unwrap();
        assert_eq!(g.zones(), 64);
        assert_eq!(g.sectors_per_zone(), 32);
        assert_eq!(g.key_sector_len(), 512);
        assert_eq!(g.usable_width(), 64 * g.zone_width);
    }

    #[test]
    fn test_key_sector_len_tracks_zone_size() {
        let g = Geometry {
            zone_cont: 8 * 512,
            zone_width: 9 * 512,
            ..Geometry::default()
        };
        assert_eq!(g.key_sector_len(), 8 * SKEYLEN as u64);
        assert!(g.key_sector_len() <= g.sectorsize);
    }

    #[test]
    fn test_rejects_bad_sectorsize() {
        let g = Geometry {
            sectorsize: 500,
            ..Geometry::default()
        };
        assert_rejected(&g, "power of two");

        let g = Geometry {
            sectorsize: 8,
            ..Geometry::default()
        };
        assert_rejected(&g, "power of two");
    }

    #[test]
    fn test_rejects_unaligned_keyoffset() {
        let g = Geometry {
            keyoffset: 100,
            ..Geometry::default()
        };
        assert_rejected(&g, "keyoffset");
    }

    #[test]
    fn test_rejects_zone_without_key_sector() {
        let g = Geometry::default();
        let g = Geometry {
            zone_cont: g.zone_width,
            ..g
        };
        assert_rejected(&g, "no key sector");
    }

    #[test]
    fn test_rejects_overfull_key_sector() {
        // 64 subkeys of 16 bytes do not fit a 512-byte key sector
        let g = Geometry {
            zone_cont: 64 * 512,
            zone_width: 65 * 512,
            media_width: 8 * 65 * 512 + 4 * 512,
            ..Geometry::default()
        };
        assert_rejected(&g, "subkeys per zone");
    }

    #[test]
    fn test_rejects_zones_overlapping_after_wrap() {
        let g = Geometry {
            media_width: 64 * 16896,
            ..Geometry::default()
        };
        assert_rejected(&g, "do not fit");
    }

    #[test]
    fn test_rejects_lock_sector_outside_media() {
        let mut g = Geometry::default();
        g.lsector[2] = g.sector0 + g.media_width;
        assert_rejected(&g, "outside");
    }

    #[test]
    fn test_rejects_duplicate_lock_sector() {
        let mut g = Geometry::default();
        g.lsector[3] = g.lsector[1];
        assert_rejected(&g, "duplicate");
    }

    #[test]
    fn test_rejects_unaligned_lock_sector() {
        let mut g = Geometry::default();
        g.lsector[0] = 7;
        assert_rejected(&g, "not aligned");
    }
}
