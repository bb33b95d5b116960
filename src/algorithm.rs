//! Hash families supported by the SCRAM conversation.

use std::fmt;

/// Largest digest size across supported algorithms (SHA-256).
pub(crate) const HASH_MAX_SIZE: usize = 32;

/// Hash family negotiated for one SCRAM conversation.
///
/// Chosen at construction and immutable for the lifetime of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    /// SCRAM-SHA-1 (RFC 5802). 20-byte digests.
    Sha1,
    /// SCRAM-SHA-256 (RFC 7677). 32-byte digests.
    Sha256,
}

impl Algorithm {
    /// Digest size in bytes of the underlying hash function.
    pub const fn hash_size(self) -> usize {
        match self {
            Algorithm::Sha1 => 20,
            Algorithm::Sha256 => 32,
        }
    }

    /// SASL mechanism name sent by the driver in the start command.
    pub const fn mechanism_name(self) -> &'static str {
        match self {
            Algorithm::Sha1 => "SCRAM-SHA-1",
            Algorithm::Sha256 => "SCRAM-SHA-256",
        }
    }

    /// Expected decoded length of the server salt.
    ///
    /// The decoded salt leaves four trailing bytes in the derivation block
    /// for the big-endian int32 0x00000001.
    pub(crate) const fn salt_len(self) -> usize {
        self.hash_size() - 4
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mechanism_name())
    }
}
