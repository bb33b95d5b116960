//! Cache of derived SCRAM secrets, keyed by the presecrets that produced
//! them.
//!
//! Key derivation runs thousands of HMAC rounds, so a driver that
//! re-authenticates with the same credentials against the same server wants
//! to skip it. The presecret triple (prepared password, salt, iteration
//! count) plus the hash family fully determines the derived secrets; when
//! all of them match, the cached secrets are valid for the new
//! conversation.
//!
//! Entries are value-copied between sessions, never shared; the caller is
//! responsible for locking around any registry that hands them out.

use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::algorithm::{Algorithm, HASH_MAX_SIZE};

/// Presecrets and derived secrets from one successful conversation.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ScramCache {
    #[zeroize(skip)]
    pub(crate) algorithm: Algorithm,
    pub(crate) hashed_password: Zeroizing<String>,
    pub(crate) decoded_salt: [u8; HASH_MAX_SIZE - 4],
    pub(crate) iterations: u32,
    pub(crate) salted_password: [u8; HASH_MAX_SIZE],
    pub(crate) client_key: [u8; HASH_MAX_SIZE],
    pub(crate) server_key: [u8; HASH_MAX_SIZE],
}

impl ScramCache {
    /// Hash family the cached secrets were derived under.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Iteration count of the cached derivation.
    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Whether this entry was derived from the given presecrets.
    ///
    /// Matching presecrets imply the derived secrets may be reused. The
    /// hash family is part of the identity: the same password, salt and
    /// iteration count derive different keys under SHA-1 and SHA-256.
    pub(crate) fn has_presecrets(
        &self,
        algorithm: Algorithm,
        hashed_password: &str,
        iterations: u32,
        decoded_salt: &[u8],
    ) -> bool {
        self.algorithm == algorithm
            && bool::from(
                self.hashed_password
                    .as_bytes()
                    .ct_eq(hashed_password.as_bytes()),
            )
            && self.iterations == iterations
            && self.decoded_salt.len() >= decoded_salt.len()
            && bool::from(self.decoded_salt[..decoded_salt.len()].ct_eq(decoded_salt))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> ScramCache {
        ScramCache {
            algorithm: Algorithm::Sha256,
            hashed_password: Zeroizing::new("pencil".to_owned()),
            decoded_salt: [7u8; HASH_MAX_SIZE - 4],
            iterations: 4096,
            salted_password: [1u8; HASH_MAX_SIZE],
            client_key: [2u8; HASH_MAX_SIZE],
            server_key: [3u8; HASH_MAX_SIZE],
        }
    }

    #[test]
    fn matching_presecrets() {
        let cache = entry();
        let salt = [7u8; 28];
        assert!(cache.has_presecrets(Algorithm::Sha256, "pencil", 4096, &salt));
    }

    #[test]
    fn mismatched_presecrets() {
        let cache = entry();
        let salt = [7u8; 28];
        assert!(!cache.has_presecrets(Algorithm::Sha256, "pancil", 4096, &salt));
        assert!(!cache.has_presecrets(Algorithm::Sha256, "pencil", 8192, &salt));
        assert!(!cache.has_presecrets(Algorithm::Sha256, "pencil", 4096, &[8u8; 28]));
    }

    #[test]
    fn algorithm_is_part_of_identity() {
        let cache = entry();
        let salt = [7u8; 28];
        assert!(!cache.has_presecrets(Algorithm::Sha1, "pencil", 4096, &salt[..16]));
    }

    #[test]
    fn deep_copy_is_independent() {
        let cache = entry();
        let mut copy = cache.clone();
        copy.client_key[0] = 0xff;
        assert_eq!(cache.client_key[0], 2);
    }
}
