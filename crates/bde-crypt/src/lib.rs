//! bde-crypt: the sector transform of a GBDE-style encrypted volume
//!
//! Architecture: every data sector is encrypted with its own random subkey,
//! and the subkey is stored, encrypted, in the key sector that ends its zone.
//!
//! Key hierarchy:
//! ```text
//! Master Key (2048-bit entropy pool, never used as a cipher key)
//!   └── kkey (per logical sector, MD5 walk over the master key, AES-128)
//!       └── Subkey (per write, 128-bit random, stored under the kkey)
//!           └── Sector payload: AES-128, one block at a time
//! ```
//!
//! Physical layout of one zone:
//! ```text
//! [ zone_cont bytes of data sectors ][ ... ][ key sector: N x 16-byte subkeys ]
//! |<-------------------------- zone_width -------------------------------->|
//! ```

pub mod cipher;
pub mod crypt;
pub mod key;
pub mod kkey;
pub mod map;
pub mod random;
pub mod work;

pub use bde_core::{Geometry, MAXKEYS, MKEYLEN, SKEYLEN};
pub use cipher::{Aes128Ecb, Direction, SectorCipher};
pub use crypt::{crypt_delete, crypt_read, crypt_write};
pub use key::{KeyParams, MasterKey};
pub use kkey::{derive_kkey, kkey_material};
pub use map::{map_request, map_sector, max_sector, split_request, RequestMap, SectorMap};
pub use random::{RandomSource, ReseedingRandom};
pub use work::Work;

/// Cipher block size in bytes
pub const BLOCK_SIZE: usize = 16;

/// Key length of the kkey schedule in bits
pub const KKEYBITS: usize = 128;

/// Key length of the per-sector subkey schedule in bits
pub const SKEYBITS: usize = SKEYLEN * 8;
