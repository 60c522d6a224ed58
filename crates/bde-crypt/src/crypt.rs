//! Sector read, write and delete drivers
//!
//! Write: a fresh random subkey per sector encrypts the payload from `data`
//! into `sp`; the subkey itself is encrypted under the sector's kkey into the
//! key sector buffer. Read reverses this in place on `data`. Delete fills `sp`
//! with random bytes and never touches a cipher or digest.
//!
//! Plaintext subkeys only ever live in a `Zeroizing` buffer local to the call.

use tracing::trace;
use zeroize::{Zeroize, Zeroizing};

use crate::cipher::{Direction, SectorCipher};
use crate::key::KeyParams;
use crate::kkey::derive_kkey;
use crate::random::RandomSource;
use crate::work::Work;
use crate::SKEYLEN;

fn check_work(kp: &KeyParams, wp: &Work<'_>) {
    let ss = kp.sectorsize();
    debug_assert_eq!(wp.offset % ss, 0, "unaligned offset");
    debug_assert_eq!(wp.length as u64 % ss, 0, "unaligned length");
    let key_end = wp.ko + wp.sectors(ss) * SKEYLEN;
    debug_assert!(key_end as u64 <= kp.geometry().key_sector_len(), "subkeys cross the zone");
    debug_assert!(key_end <= wp.ksp.len(), "key sector too short");
}

/// Decrypt `wp.data` in place, using the encrypted subkeys in `wp.ksp`.
pub fn crypt_read<C: SectorCipher>(cipher: &C, kp: &KeyParams, wp: &mut Work<'_>) {
    check_work(kp, wp);
    let ss = kp.sectorsize() as usize;
    trace!(offset = wp.offset, length = wp.length, "crypt_read");

    let mut skey = Zeroizing::new([0u8; SKEYLEN]);
    for (n, o) in (0..wp.length).step_by(ss).enumerate() {
        let ks = wp.ko + n * SKEYLEN;
        let kkey = derive_kkey(cipher, kp, Direction::Decrypt, wp.offset + o as u64);
        cipher.decrypt(&kkey, &wp.ksp[ks..ks + SKEYLEN], &mut skey[..]);

        let sk = cipher.make_key(&skey, Direction::Decrypt);
        cipher.decrypt_in_place(&sk, &mut wp.data[o..o + ss]);
        skey.zeroize();
    }
}

/// Encrypt `wp.data` into `wp.sp` under fresh subkeys, storing each subkey
/// encrypted in `wp.ksp`. `wp.data` is left untouched.
pub fn crypt_write<C: SectorCipher, R: RandomSource + ?Sized>(
    cipher: &C,
    kp: &KeyParams,
    rng: &mut R,
    wp: &mut Work<'_>,
) {
    check_work(kp, wp);
    let ss = kp.sectorsize() as usize;
    trace!(offset = wp.offset, length = wp.length, "crypt_write");

    let mut skey = Zeroizing::new([0u8; SKEYLEN]);
    for (n, o) in (0..wp.length).step_by(ss).enumerate() {
        rng.fill_bytes(&mut skey[..]);
        let sk = cipher.make_key(&skey, Direction::Encrypt);
        cipher.encrypt(&sk, &wp.data[o..o + ss], &mut wp.sp[o..o + ss]);

        let ks = wp.ko + n * SKEYLEN;
        let kkey = derive_kkey(cipher, kp, Direction::Encrypt, wp.offset + o as u64);
        cipher.encrypt(&kkey, &skey[..], &mut wp.ksp[ks..ks + SKEYLEN]);
        skey.zeroize();
    }
}

/// Overwrite `wp.sp` with random bytes, then force the random source to reseed.
///
/// Each sector is filled by its own call; the source may reseed internally at
/// a granularity smaller than a whole request.
pub fn crypt_delete<R: RandomSource + ?Sized>(kp: &KeyParams, rng: &mut R, wp: &mut Work<'_>) {
    check_work(kp, wp);
    let ss = kp.sectorsize() as usize;
    trace!(offset = wp.offset, length = wp.length, "crypt_delete");

    for o in (0..wp.length).step_by(ss) {
        rng.fill_bytes(&mut wp.sp[o..o + ss]);
    }
    rng.force_reseed();
}
