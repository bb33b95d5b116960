//! Error types for scram-client.

use thiserror::Error;

/// Result type for scram-client operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Error type for scram-client.
///
/// All failures surface at the [`step`](crate::ScramClient::step) boundary
/// and are fatal to the current conversation; there is no local recovery.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or policy-violating input (missing attribute, bad base64,
    /// wrong salt length, low iteration count, nonce mismatch, server-side
    /// authentication error, signature mismatch, buffer overflow, SASLprep
    /// rejection, random source failure).
    #[error("SCRAM failure: {0}")]
    Protocol(String),

    /// The caller invoked `step()` past the third turn.
    #[error("SCRAM failure: maximum steps detected")]
    NotDone,
}

impl Error {
    /// Shorthand for building a protocol error.
    pub(crate) fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol(msg.into())
    }
}
