//! Gift Code Generation
//!
//! Produces codes in the form `KWP-XXXXXX-YYYY` (uppercase hex) from the
//! OS CSPRNG. Uniqueness is not guaranteed here: the ledger rejects
//! collisions and the caller regenerates.

use rand::RngCore;
use rand::rngs::OsRng;

/// Generate a redeemable gift code: `KWP-` + 3 random bytes + `-` +
/// 2 random bytes, hex-encoded uppercase.
pub fn generate() -> String {
    let mut head = [0u8; 3];
    let mut tail = [0u8; 2];
    OsRng.fill_bytes(&mut head);
    OsRng.fill_bytes(&mut tail);
    format!(
        "KWP-{}-{}",
        hex::encode_upper(head),
        hex::encode_upper(tail)
    )
}
