//! Logical-to-physical address mapping
//!
//! Logical byte `x` lives in zone `x / zone_cont`. The physical position is the
//! zone's stride plus the offset in the zone, rotated by `keyoffset`, wrapped
//! into the usable width and then pushed forward by one sector for every lock
//! sector at or below it. The key sector of a zone is the last sector of its
//! stride and goes through the same rotation, wrap and lock-sector skip.
//!
//! Lock sectors are skipped in ascending address order, not table order. With
//! an unsorted table, a table-order walk can push an address onto a lock
//! sector it already passed.

use bde_core::Geometry;

use crate::{MAXKEYS, SKEYLEN};

/// Physical placement of one logical sector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectorMap {
    /// Physical byte offset of the encrypted data sector
    pub osector: u64,
    /// Physical byte offset of the zone's key sector
    pub ksector: u64,
    /// Byte offset of this sector's subkey inside the key sector
    pub koffset: usize,
}

/// Physical placement of a run of logical sectors that is contiguous on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestMap {
    /// Logical byte offset of the run
    pub offset: u64,
    /// Length of the run in bytes, never crossing a zone, the wrap point or a lock sector
    pub length: u64,
    /// Physical byte offset of the first data sector
    pub so: u64,
    /// Physical byte offset of the key sector
    pub kso: u64,
    /// Offset of the first subkey inside the key sector
    pub ko: usize,
}

/// Logical capacity of the volume in bytes.
pub fn max_sector(g: &Geometry) -> u64 {
    g.media_width / g.zone_width * g.zone_cont
}

/// Map the logical sector at byte offset `isector`.
///
/// `isector` must be sector aligned and below [`max_sector`]; nothing is
/// checked here.
pub fn map_sector(g: &Geometry, isector: u64) -> SectorMap {
    let zone = isector / g.zone_cont;
    let zoff = isector % g.zone_cont;
    let zidx = zoff / g.sectorsize;

    let osector = skip_lock_sectors(g, wrap(g, zone * g.zone_width + zoff));
    let ksector = key_sector(g, zone);

    SectorMap {
        osector,
        ksector,
        koffset: zidx as usize * SKEYLEN,
    }
}

/// Map as much of `[offset, offset + length)` as is contiguous on disk.
pub fn map_request(g: &Geometry, offset: u64, length: u64) -> RequestMap {
    let ss = g.sectorsize;
    let zone = offset / g.zone_cont;
    let zoff = offset % g.zone_cont;

    // restrict to this zone
    let mut len = length.min(g.zone_cont - zoff);

    let rel = (zone * g.zone_width + zoff + g.keyoffset) % g.usable_width();
    // and to the wrap point
    len = len.min(g.usable_width() - rel);

    let mut so = rel + g.sector0;
    for lsec in lock_sectors(g) {
        if so >= lsec {
            so += ss;
        } else if so + len > lsec {
            // lock sector inside the run, truncate
            len = lsec - so;
        }
    }
    debug_assert!(length == 0 || len > 0, "unaligned request at {offset}");

    RequestMap {
        offset,
        length: len,
        so,
        kso: key_sector(g, zone),
        ko: (zoff / ss) as usize * SKEYLEN,
    }
}

/// Split `[offset, offset + length)` into runs that are contiguous on disk.
pub fn split_request(
    g: &Geometry,
    offset: u64,
    length: u64,
) -> impl Iterator<Item = RequestMap> + '_ {
    let end = offset + length;
    let mut next = offset;
    std::iter::from_fn(move || {
        if next >= end {
            return None;
        }
        let run = map_request(g, next, end - next);
        next += run.length;
        Some(run)
    })
}

fn key_sector(g: &Geometry, zone: u64) -> u64 {
    skip_lock_sectors(g, wrap(g, (zone + 1) * g.zone_width - g.sectorsize))
}

fn wrap(g: &Geometry, pos: u64) -> u64 {
    (pos + g.keyoffset) % g.usable_width() + g.sector0
}

/// Lock sector starts in ascending order.
fn lock_sectors(g: &Geometry) -> [u64; MAXKEYS] {
    let mut lsec = g.lsector.map(|l| l & !(g.sectorsize - 1));
    lsec.sort_unstable();
    lsec
}

fn skip_lock_sectors(g: &Geometry, mut os: u64) -> u64 {
    for lsec in lock_sectors(g) {
        if os >= lsec {
            os += g.sectorsize;
        }
    }
    os
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::HashSet;

    /// 512-byte sectors, two data sectors and a key sector per zone, four zones.
    /// Lock sectors sit past the end so they never shift anything.
    fn small_geometry() -> Geometry {
        Geometry {
            sectorsize: 512,
            media_width: 1536 * 4,
            sector0: 0,
            zone_width: 1536,
            zone_cont: 1024,
            keyoffset: 0,
            lsector: [6144, 6656, 7168, 7680],
        }
    }

    #[test]
    fn test_max_sector_floors() {
        let g = small_geometry();
        assert_eq!(max_sector(&g), 4096);

        let g = Geometry {
            media_width: 1536 * 4 + 1024,
            ..small_geometry()
        };
        assert_eq!(max_sector(&g), 4096);
    }

    #[test]
    fn test_first_sector_of_zone_zero() {
        let m = map_sector(&small_geometry(), 0);
        assert_eq!(m.osector, 0);
        assert_eq!(m.ksector, 1024, "last sector of zone 0 (sector 2)");
        assert_eq!(m.koffset, 0);
    }

    #[test]
    fn test_first_sector_of_zone_one() {
        let m = map_sector(&small_geometry(), 1024);
        assert_eq!(m.osector, 1536);
        assert_eq!(m.ksector, 2560, "last sector of zone 1 (sector 5)");
        assert_eq!(m.koffset, 0);
    }

    #[test]
    fn test_second_sector_shares_key_sector() {
        let g = small_geometry();
        let a = map_sector(&g, 0);
        let b = map_sector(&g, 512);
        assert_eq!(b.osector, 512);
        assert_eq!(b.ksector, a.ksector);
        assert_eq!(b.koffset, SKEYLEN);
    }

    #[test]
    fn test_keyoffset_rotates_addresses() {
        let g = Geometry {
            keyoffset: 512,
            ..small_geometry()
        };
        let m = map_sector(&g, 0);
        assert_eq!(m.osector, 512);
        assert_eq!(m.ksector, 1536);
    }

    #[test]
    fn test_sector0_offsets_addresses() {
        let g = Geometry {
            sector0: 8192,
            lsector: [14336, 14848, 15360, 15872],
            ..small_geometry()
        };
        let m = map_sector(&g, 1024);
        assert_eq!(m.osector, 8192 + 1536);
        assert_eq!(m.ksector, 8192 + 2560);
    }

    #[test]
    fn test_lock_sector_pushes_addresses_forward() {
        let g = Geometry {
            lsector: [0, 6656, 7168, 7680],
            ..small_geometry()
        };
        let m = map_sector(&g, 0);
        assert_eq!(m.osector, 512);
        assert_eq!(m.ksector, 1536);
        assert_eq!(map_sector(&g, 512).osector, 1024);
    }

    #[test]
    fn test_unsorted_lock_sectors_never_hit() {
        // Walked in table order, sector 512 would be pushed onto the lock at 1024
        let g = Geometry {
            lsector: [1024, 0, 7168, 7680],
            ..small_geometry()
        };
        assert_eq!(map_sector(&g, 0).osector, 512);
        assert_eq!(map_sector(&g, 512).osector, 1536);
    }

    #[test]
    fn test_map_request_truncates_at_zone_end() {
        let g = small_geometry();
        let run = map_request(&g, 512, 4096);
        assert_eq!(run.length, 512);
        assert_eq!(run.so, 512);
        assert_eq!(run.kso, 1024);
        assert_eq!(run.ko, SKEYLEN);
    }

    #[test]
    fn test_map_request_truncates_at_lock_sector() {
        let g = Geometry {
            lsector: [512, 6656, 7168, 7680],
            ..small_geometry()
        };
        let run = map_request(&g, 0, 1024);
        assert_eq!(run.so, 0);
        assert_eq!(run.length, 512);

        let rest = map_request(&g, 512, 512);
        assert_eq!(rest.so, 1024);
        assert_eq!(rest.length, 512);
    }

    #[test]
    fn test_split_request_covers_range() {
        let g = Geometry::default();
        let runs: Vec<_> = split_request(&g, 3 * 512, 100 * 512).collect();

        assert_eq!(runs.first().unwrap().offset, 3 * 512);
        let total: u64 = runs.iter().map(|r| r.length).sum();
        assert_eq!(total, 100 * 512);
        for pair in runs.windows(2) {
            assert_eq!(pair[0].offset + pair[0].length, pair[1].offset);
        }
    }

    #[test]
    fn test_split_request_empty() {
        let g = Geometry::default();
        assert_eq!(split_request(&g, 0, 0).count(), 0);
    }

    #[test]
    fn test_default_geometry_zone_properties() {
        let g = Geometry::default();
        let zone = 5;
        let start = zone * g.zone_cont;
        let maps: Vec<_> = (0..g.sectors_per_zone())
            .map(|i| map_sector(&g, start + i * g.sectorsize))
            .collect();

        let osectors: HashSet<_> = maps.iter().map(|m| m.osector).collect();
        assert_eq!(osectors.len(), maps.len(), "data sectors must be distinct");
        assert!(maps.iter().all(|m| m.ksector == maps[0].ksector));
        for (i, m) in maps.iter().enumerate() {
            assert_eq!(m.koffset, i * SKEYLEN);
        }
    }

    fn arb_geometry() -> impl Strategy<Value = Geometry> {
        (
            prop_oneof![Just(128u64), Just(256), Just(512)],
            4u64..=8,
            0u64..3,
            1u64..6,
            0u64..4,
        )
            .prop_flat_map(|(ss, per_zone, spare, zones, sector0)| {
                let zone_cont = per_zone * ss;
                let zone_width = zone_cont + (1 + spare) * ss;
                let media_width = zones * zone_width + MAXKEYS as u64 * ss;
                let sectors = media_width / ss;
                let locks = proptest::sample::subsequence((0..sectors).collect::<Vec<_>>(), MAXKEYS)
                    .prop_shuffle();
                (locks, 0..sectors * 2).prop_map(move |(locks, rot)| {
                    let base = sector0 * ss;
                    Geometry {
                        sectorsize: ss,
                        media_width,
                        sector0: base,
                        zone_width,
                        zone_cont,
                        keyoffset: rot * ss,
                        lsector: [
                            base + locks[0] * ss,
                            base + locks[1] * ss,
                            base + locks[2] * ss,
                            base + locks[3] * ss,
                        ],
                    }
                })
            })
    }

    proptest! {
        #[test]
        fn mapped_addresses_are_distinct_and_in_span(g in arb_geometry()) {
            prop_assert!(g.validate().is_ok());
            let end = g.sector0 + g.media_width;
            let mut seen = HashSet::new();
            let mut key_sectors = HashSet::new();

            let mut isector = 0;
            while isector < max_sector(&g) {
                let m = map_sector(&g, isector);
                prop_assert!(m.osector >= g.sector0 && m.osector < end);
                prop_assert!(m.ksector >= g.sector0 && m.ksector < end);
                prop_assert!(!g.lsector.contains(&m.osector));
                prop_assert!(!g.lsector.contains(&m.ksector));
                prop_assert!(seen.insert(m.osector), "data sector reused at {}", isector);
                key_sectors.insert(m.ksector);
                isector += g.sectorsize;
            }

            prop_assert_eq!(key_sectors.len() as u64, g.zones());
            prop_assert!(seen.is_disjoint(&key_sectors));
        }

        #[test]
        fn zone_sectors_share_key_sector(g in arb_geometry(), zone_pick in 0u64..8) {
            let zone = zone_pick % g.zones();
            let start = zone * g.zone_cont;
            let first = map_sector(&g, start);
            for i in 0..g.sectors_per_zone() {
                let m = map_sector(&g, start + i * g.sectorsize);
                prop_assert_eq!(m.ksector, first.ksector);
                prop_assert_eq!(m.koffset, i as usize * SKEYLEN);
            }
        }

        #[test]
        fn split_runs_agree_with_map_sector(g in arb_geometry()) {
            for run in split_request(&g, 0, max_sector(&g)) {
                let mut i = 0;
                while i * g.sectorsize < run.length {
                    let m = map_sector(&g, run.offset + i * g.sectorsize);
                    prop_assert_eq!(m.osector, run.so + i * g.sectorsize);
                    prop_assert_eq!(m.ksector, run.kso);
                    prop_assert_eq!(m.koffset, run.ko + i as usize * SKEYLEN);
                    i += 1;
                }
            }
        }
    }
}
