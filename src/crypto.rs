//! Capability traits for the primitives the SCRAM core consumes.
//!
//! The conversation never calls a hash function or an RNG directly; it goes
//! through these traits so a driver can substitute hardware-backed crypto,
//! and so tests can inject deterministic nonces or count invocations.

use hmac::{Hmac, Mac};
use md5::{Digest, Md5};
use rand::TryRngCore;
use sha1::Sha1;
use sha2::Sha256;

use crate::algorithm::Algorithm;

/// Provider of the keyed and unkeyed hash primitives.
///
/// Implementations write exactly [`Algorithm::hash_size`] bytes into `out`.
pub trait CryptoProvider {
    /// HMAC over `data` with `key`, using the hash family of `algorithm`.
    fn hmac(&self, algorithm: Algorithm, key: &[u8], data: &[u8], out: &mut [u8]);

    /// Plain digest of `data` using the hash family of `algorithm`.
    fn hash(&self, algorithm: Algorithm, data: &[u8], out: &mut [u8]);
}

/// Source of cryptographically strong random bytes for the client nonce.
pub trait NonceSource {
    /// Fill `buf` with random bytes. Returns `false` if the source failed.
    fn fill(&mut self, buf: &mut [u8]) -> bool;
}

/// Default [`CryptoProvider`] backed by the RustCrypto `sha1`/`sha2` crates.
#[derive(Debug, Default, Clone, Copy)]
pub struct RustCryptoProvider;

impl CryptoProvider for RustCryptoProvider {
    fn hmac(&self, algorithm: Algorithm, key: &[u8], data: &[u8], out: &mut [u8]) {
        match algorithm {
            Algorithm::Sha1 => {
                let mut mac =
                    <Hmac<Sha1> as Mac>::new_from_slice(key).expect("HMAC accepts any key length");
                mac.update(data);
                out.copy_from_slice(&mac.finalize().into_bytes());
            }
            Algorithm::Sha256 => {
                let mut mac = <Hmac<Sha256> as Mac>::new_from_slice(key)
                    .expect("HMAC accepts any key length");
                mac.update(data);
                out.copy_from_slice(&mac.finalize().into_bytes());
            }
        }
    }

    fn hash(&self, algorithm: Algorithm, data: &[u8], out: &mut [u8]) {
        match algorithm {
            Algorithm::Sha1 => out.copy_from_slice(&Sha1::digest(data)),
            Algorithm::Sha256 => out.copy_from_slice(&Sha256::digest(data)),
        }
    }
}

/// Default [`NonceSource`] reading from the operating system RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsNonceSource;

impl NonceSource for OsNonceSource {
    fn fill(&mut self, buf: &mut [u8]) -> bool {
        rand::rngs::OsRng.try_fill_bytes(buf).is_ok()
    }
}

/// Lowercase hex MD5 digest, used by the SCRAM-SHA-1 password variant.
pub(crate) fn hex_md5(data: &[u8]) -> String {
    format!("{:x}", Md5::digest(data))
}
