//! A sans-I/O SCRAM client authentication library for database drivers.
//!
//! # Features
//!
//! - **Sans-I/O state machine**: the conversation produces and consumes
//!   SASL payloads; the caller owns the transport and command framing
//! - **SCRAM-SHA-1 and SCRAM-SHA-256** (RFC 5802 / RFC 7677), chosen at
//!   construction
//! - **Secret caching**: derived keys can be carried between sessions so
//!   repeated authentications skip the key-derivation loop
//! - **SASLprep password preparation** (RFC 4013) behind the `unicode`
//!   feature, with a printable-ASCII fallback without it
//!
//! # Example
//!
//! ```no_run
//! use scram_client::{Algorithm, ScramClient};
//!
//! fn main() -> scram_client::Result<()> {
//!     let mut scram = ScramClient::new(Algorithm::Sha256);
//!     scram.set_user("app");
//!     scram.set_pass("secret");
//!
//!     let mut buf = [0u8; 4096];
//!
//!     // turn 1: send client-first under the mechanism name
//!     let n = scram.step(b"", &mut buf)?;
//!     let server_first = send_sasl_start(scram.algorithm().mechanism_name(), &buf[..n]);
//!
//!     // turn 2: answer the server challenge with the client proof
//!     let n = scram.step(&server_first, &mut buf)?;
//!     let server_final = send_sasl_continue(&buf[..n]);
//!
//!     // turn 3: verify the server signature
//!     scram.step(&server_final, &mut buf)?;
//!     Ok(())
//! }
//! # fn send_sasl_start(_mechanism: &str, _payload: &[u8]) -> Vec<u8> { Vec::new() }
//! # fn send_sasl_continue(_payload: &[u8]) -> Vec<u8> { Vec::new() }
//! ```

// private
mod b64;
mod error;
mod saslprep;

// pub
pub mod algorithm;
pub mod cache;
pub mod conversation;
pub mod crypto;

pub use algorithm::Algorithm;
pub use cache::ScramCache;
pub use conversation::ScramClient;
pub use crypto::{CryptoProvider, NonceSource, OsNonceSource, RustCryptoProvider};
pub use error::{Error, Result};
