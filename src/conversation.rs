//! The SCRAM conversation state machine.
//!
//! One [`ScramClient`] drives a single authentication attempt in three
//! turns. The caller owns the transport; this type only produces and
//! consumes the SASL payloads:
//!
//! 1. client-first: `n,,n=<escaped-user>,r=<client-nonce>`
//! 2. server-first in (`r=`, `s=`, `i=`), client-final out
//!    (`c=biws,r=<combined-nonce>,p=<client-proof>`)
//! 3. server-final in (`v=<server-signature>` or `e=<error>`), empty out
//!
//! Key derivation runs during the second turn, or is skipped entirely when
//! an attached [`ScramCache`] entry matches the server's parameters. On a
//! verified third turn the freshly derived secrets replace the session's
//! cache entry so the caller can carry them to the next attempt.

use std::fmt;

use subtle::ConstantTimeEq;
use zeroize::{Zeroize, Zeroizing};

use crate::algorithm::{Algorithm, HASH_MAX_SIZE};
use crate::b64;
use crate::cache::ScramCache;
use crate::crypto::{self, CryptoProvider, NonceSource, OsNonceSource, RustCryptoProvider};
use crate::error::{Error, Result};
use crate::saslprep;

const CLIENT_KEY: &[u8] = b"Client Key";
const SERVER_KEY: &[u8] = b"Server Key";

/// The server uses a 24 byte random nonce, so the client does as well.
const NONCE_LEN: usize = 24;

/// SCRAM client conversation for one authentication attempt.
pub struct ScramClient {
    algorithm: Algorithm,
    crypto: Box<dyn CryptoProvider>,
    nonce_source: Box<dyn NonceSource>,
    user: Option<String>,
    pass: Option<Zeroizing<String>>,
    step: u8,
    encoded_nonce: String,
    /// Running concatenation of client-first-bare, server-first and
    /// client-final-without-proof, comma separated. Input to the proof and
    /// signature HMACs.
    auth_message: Vec<u8>,
    auth_message_max: usize,
    hashed_password: Option<Zeroizing<String>>,
    iterations: u32,
    decoded_salt: [u8; HASH_MAX_SIZE - 4],
    salted_password: [u8; HASH_MAX_SIZE],
    client_key: [u8; HASH_MAX_SIZE],
    server_key: [u8; HASH_MAX_SIZE],
    cache: Option<ScramCache>,
}

impl ScramClient {
    /// New session using the OS random source and the built-in RustCrypto
    /// primitives.
    pub fn new(algorithm: Algorithm) -> Self {
        Self::with_providers(
            algorithm,
            Box::new(RustCryptoProvider),
            Box::new(OsNonceSource),
        )
    }

    /// New session with injected crypto and nonce capabilities.
    pub fn with_providers(
        algorithm: Algorithm,
        crypto: Box<dyn CryptoProvider>,
        nonce_source: Box<dyn NonceSource>,
    ) -> Self {
        ScramClient {
            algorithm,
            crypto,
            nonce_source,
            user: None,
            pass: None,
            step: 0,
            encoded_nonce: String::new(),
            auth_message: Vec::new(),
            auth_message_max: 0,
            hashed_password: None,
            iterations: 0,
            decoded_salt: [0; HASH_MAX_SIZE - 4],
            salted_password: [0; HASH_MAX_SIZE],
            client_key: [0; HASH_MAX_SIZE],
            server_key: [0; HASH_MAX_SIZE],
            cache: None,
        }
    }

    /// Hash family of this conversation.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Set the authentication username. An empty value clears the field.
    pub fn set_user(&mut self, user: &str) {
        self.user = if user.is_empty() {
            None
        } else {
            Some(user.to_owned())
        };
    }

    /// Set the password. Any previous password is zeroized before release.
    /// An empty value clears the field.
    pub fn set_pass(&mut self, pass: &str) {
        self.pass = if pass.is_empty() {
            None
        } else {
            Some(Zeroizing::new(pass.to_owned()))
        };
    }

    /// Attach a cache entry from an earlier conversation.
    pub fn set_cache(&mut self, cache: ScramCache) {
        self.cache = Some(cache);
    }

    /// Independent copy of the session's cache entry, if any.
    pub fn get_cache(&self) -> Option<ScramCache> {
        self.cache.clone()
    }

    /// Whether the conversation has consumed all three turns.
    pub fn is_done(&self) -> bool {
        self.step >= 3
    }

    /// Advance the conversation by one turn.
    ///
    /// `inbuf` is the server's previous message (ignored on the first
    /// call). The next client message is written into `outbuf` and its
    /// length returned; the final turn writes nothing. Any parse or policy
    /// violation fails with [`Error::Protocol`] and is fatal to the
    /// conversation; calls past the third turn fail with
    /// [`Error::NotDone`].
    pub fn step(&mut self, inbuf: &[u8], outbuf: &mut [u8]) -> Result<usize> {
        self.step = self.step.saturating_add(1);
        tracing::trace!(step = self.step, "sasl step");

        match self.step {
            1 => self.start(outbuf),
            2 => self.step2(inbuf, outbuf),
            3 => self.step3(inbuf, outbuf),
            _ => Err(Error::NotDone),
        }
    }

    /// Generate client-first: `n,,n=<escaped-user>,r=<client-nonce>`.
    ///
    /// The `a=` authzid of the gs2 header is never sent.
    fn start(&mut self, outbuf: &mut [u8]) -> Result<usize> {
        let user = self
            .user
            .as_deref()
            .ok_or_else(|| Error::protocol("username is not set"))?;

        // The auth message tracks the conversation for the later proof and
        // signature computations; its capacity is fixed to the caller's
        // output cap for the rest of the conversation.
        self.auth_message.clear();
        self.auth_message_max = outbuf.len();

        let mut nonce = [0u8; NONCE_LEN];
        if !self.nonce_source.fill(&mut nonce) {
            return Err(Error::protocol(
                "could not generate a cryptographically secure nonce in sasl step 1",
            ));
        }
        self.encoded_nonce = b64::encode(&nonce);

        let mut outlen = 0;
        let mut ok = buf_write(b"n,,n=", outbuf, &mut outlen);
        for &byte in user.as_bytes() {
            if !ok {
                break;
            }
            // RFC 5802: ',' and '=' in the username are encoded as '=2C'
            // and '=3D' respectively
            ok = match byte {
                b',' => buf_write(b"=2C", outbuf, &mut outlen),
                b'=' => buf_write(b"=3D", outbuf, &mut outlen),
                _ => buf_write(&[byte], outbuf, &mut outlen),
            };
        }
        ok = ok
            && buf_write(b",r=", outbuf, &mut outlen)
            && buf_write(self.encoded_nonce.as_bytes(), outbuf, &mut outlen);
        if !ok {
            return Err(Error::protocol("could not buffer sasl step1"));
        }

        // Keep the message from the 'n=' portion onwards: the auth message
        // starts with client-first-bare, not the gs2 header.
        if !auth_write(
            &outbuf[3..outlen],
            &mut self.auth_message,
            self.auth_message_max,
        ) || !auth_write(b",", &mut self.auth_message, self.auth_message_max)
        {
            return Err(Error::protocol(
                "could not buffer auth message in sasl step1",
            ));
        }

        Ok(outlen)
    }

    /// Parse server-first (`r=`, `s=`, `i=` in any order) and generate
    /// client-final: `c=biws,r=<combined-nonce>,p=<client-proof>`.
    fn step2(&mut self, inbuf: &[u8], outbuf: &mut [u8]) -> Result<usize> {
        let user = self
            .user
            .as_deref()
            .ok_or_else(|| Error::protocol("username is not set"))?;
        let pass = self
            .pass
            .as_deref()
            .ok_or_else(|| Error::protocol("password is not set"))?;

        let hashed_password: Zeroizing<String> = match self.algorithm {
            Algorithm::Sha1 => {
                // SCRAM-SHA-1 servers authenticate the hashed credential
                // variant, hex(MD5(user ":mongo:" password)), not the plain
                // password.
                let mut credential =
                    Zeroizing::new(Vec::with_capacity(user.len() + pass.len() + 7));
                credential.extend_from_slice(user.as_bytes());
                credential.extend_from_slice(b":mongo:");
                credential.extend_from_slice(pass.as_bytes());
                Zeroizing::new(crypto::hex_md5(&credential))
            }
            // SCRAM-SHA-256 passwords feed key derivation directly and are
            // prepared with SASLprep instead of being digested.
            Algorithm::Sha256 => Zeroizing::new(saslprep::sasl_prep(pass)?),
        };

        // The entire inbound message participates in the final proof.
        if !auth_write(inbuf, &mut self.auth_message, self.auth_message_max)
            || !auth_write(b",", &mut self.auth_message, self.auth_message_max)
        {
            return Err(Error::protocol(
                "could not buffer auth message in sasl step2",
            ));
        }

        let mut val_r: Option<&[u8]> = None;
        let mut val_s: Option<&[u8]> = None;
        let mut val_i: Option<&[u8]> = None;
        scan_attributes(
            inbuf,
            2,
            &mut [
                (b'r', &mut val_r),
                (b's', &mut val_s),
                (b'i', &mut val_i),
            ],
        )?;

        let val_r = val_r.ok_or_else(|| Error::protocol("no r param in sasl step 2"))?;
        let val_s = val_s.ok_or_else(|| Error::protocol("no s param in sasl step 2"))?;
        let val_i = val_i.ok_or_else(|| Error::protocol("no i param in sasl step 2"))?;

        // The combined nonce must begin with our nonce, byte for byte.
        let nonce = self.encoded_nonce.as_bytes();
        if val_r.len() < nonce.len() || !bool::from(val_r[..nonce.len()].ct_eq(nonce)) {
            return Err(Error::protocol("client nonce not repeated in sasl step 2"));
        }

        let mut outlen = 0;
        if !buf_write(b"c=biws,r=", outbuf, &mut outlen) || !buf_write(val_r, outbuf, &mut outlen)
        {
            return Err(Error::protocol("could not buffer sasl step2"));
        }
        if !auth_write(
            &outbuf[..outlen],
            &mut self.auth_message,
            self.auth_message_max,
        ) {
            return Err(Error::protocol(
                "could not buffer auth message in sasl step2",
            ));
        }
        if !buf_write(b",p=", outbuf, &mut outlen) {
            return Err(Error::protocol("could not buffer sasl step2"));
        }

        let decoded_salt = b64::decode(val_s)
            .ok_or_else(|| Error::protocol("unable to decode salt in sasl step2"))?;
        let expected_salt_len = self.algorithm.salt_len();
        if decoded_salt.len() != expected_salt_len {
            return Err(Error::Protocol(format!(
                "invalid salt length of {} in sasl step2",
                decoded_salt.len()
            )));
        }

        let iterations_text = std::str::from_utf8(val_i)
            .map_err(|_| Error::protocol("unable to parse iterations in sasl step2"))?;
        let iterations: i64 = iterations_text
            .parse()
            .map_err(|_| Error::protocol("unable to parse iterations in sasl step2"))?;
        if iterations < 0 {
            return Err(Error::protocol("iterations is negative in sasl step2"));
        }
        // Drivers MUST enforce a minimum iteration count of 4096; a lower
        // count is a downgrade attack by a man in the middle.
        if iterations < 4096 {
            return Err(Error::protocol("iterations must be at least 4096"));
        }
        let iterations = u32::try_from(iterations)
            .map_err(|_| Error::protocol("unable to parse iterations in sasl step2"))?;

        // Record the presecrets for caching.
        self.iterations = iterations;
        self.decoded_salt[..expected_salt_len].copy_from_slice(&decoded_salt);
        self.hashed_password = Some(hashed_password.clone());

        let cache_hit = self.cache.as_ref().is_some_and(|cache| {
            cache.has_presecrets(self.algorithm, &hashed_password, iterations, &decoded_salt)
        });
        if cache_hit {
            self.apply_cached_secrets();
        }

        let hash_size = self.algorithm.hash_size();
        if self.salted_password[..hash_size].iter().all(|&b| b == 0) {
            self.salt_password(hashed_password.as_bytes(), &decoded_salt, iterations);
        }

        self.generate_client_proof(outbuf, &mut outlen)?;
        Ok(outlen)
    }

    /// Parse server-final and verify the server signature. The outbound
    /// message on this turn is empty.
    fn step3(&mut self, inbuf: &[u8], _outbuf: &mut [u8]) -> Result<usize> {
        let mut val_e: Option<&[u8]> = None;
        let mut val_v: Option<&[u8]> = None;
        scan_attributes(inbuf, 3, &mut [(b'e', &mut val_e), (b'v', &mut val_v)])?;

        if let Some(e) = val_e {
            return Err(Error::Protocol(format!(
                "authentication failure in sasl step 3 : {}",
                String::from_utf8_lossy(e)
            )));
        }

        let val_v = val_v.ok_or_else(|| Error::protocol("no v param in sasl step 3"))?;

        if !self.verify_server_signature(val_v) {
            return Err(Error::protocol(
                "could not verify server signature in sasl step 3",
            ));
        }

        // Authentication succeeded: make the derived material available to
        // future conversations.
        self.update_cache();

        Ok(0)
    }

    /// Copy the cached secrets into the session, skipping derivation.
    fn apply_cached_secrets(&mut self) {
        if let Some(cache) = &self.cache {
            self.salted_password.copy_from_slice(&cache.salted_password);
            self.client_key.copy_from_slice(&cache.client_key);
            self.server_key.copy_from_slice(&cache.server_key);
            tracing::debug!("reusing cached SCRAM secrets");
        }
    }

    /// Hi() from RFC 5802: a PBKDF2 round where the derived key is exactly
    /// one hash output, so only block index 1 is ever computed.
    fn salt_password(&mut self, password: &[u8], salt: &[u8], iterations: u32) {
        let hash_size = self.algorithm.hash_size();

        let mut start_key = Zeroizing::new(Vec::with_capacity(salt.len() + 4));
        start_key.extend_from_slice(salt);
        start_key.extend_from_slice(&[0, 0, 0, 1]);

        // U1 seeds both the accumulator and the intermediate digest.
        let mut intermediate = [0u8; HASH_MAX_SIZE];
        self.crypto.hmac(
            self.algorithm,
            password,
            &start_key,
            &mut intermediate[..hash_size],
        );
        self.salted_password[..hash_size].copy_from_slice(&intermediate[..hash_size]);

        for _ in 2..=iterations {
            let previous = intermediate;
            self.crypto.hmac(
                self.algorithm,
                password,
                &previous[..hash_size],
                &mut intermediate[..hash_size],
            );
            for (acc, byte) in self.salted_password[..hash_size]
                .iter_mut()
                .zip(&intermediate[..hash_size])
            {
                *acc ^= *byte;
            }
        }
        intermediate.zeroize();
    }

    /// Append the base64 client proof to `outbuf`.
    ///
    /// `ClientProof := ClientKey XOR HMAC(H(ClientKey), AuthMessage)`
    fn generate_client_proof(&mut self, outbuf: &mut [u8], outlen: &mut usize) -> Result<()> {
        let hash_size = self.algorithm.hash_size();

        if self.client_key[..hash_size].iter().all(|&b| b == 0) {
            // ClientKey := HMAC(SaltedPassword, "Client Key")
            let salted = self.salted_password;
            self.crypto.hmac(
                self.algorithm,
                &salted[..hash_size],
                CLIENT_KEY,
                &mut self.client_key[..hash_size],
            );
        }

        // StoredKey := H(ClientKey)
        let client_key = self.client_key;
        let mut stored_key = [0u8; HASH_MAX_SIZE];
        self.crypto
            .hash(self.algorithm, &client_key[..hash_size], &mut stored_key[..hash_size]);

        // ClientSignature := HMAC(StoredKey, AuthMessage)
        let mut client_signature = [0u8; HASH_MAX_SIZE];
        self.crypto.hmac(
            self.algorithm,
            &stored_key[..hash_size],
            &self.auth_message,
            &mut client_signature[..hash_size],
        );

        // ClientProof := ClientKey XOR ClientSignature
        let mut client_proof = [0u8; HASH_MAX_SIZE];
        for ((proof, key), signature) in client_proof[..hash_size]
            .iter_mut()
            .zip(&client_key[..hash_size])
            .zip(&client_signature[..hash_size])
        {
            *proof = key ^ signature;
        }

        let encoded = b64::encode(&client_proof[..hash_size]);
        let ok = buf_write(encoded.as_bytes(), outbuf, outlen);

        stored_key.zeroize();
        client_signature.zeroize();
        client_proof.zeroize();

        if !ok {
            return Err(Error::protocol("could not buffer sasl step2"));
        }
        Ok(())
    }

    /// Constant-time check of the server's `v=` value against
    /// `HMAC(ServerKey, AuthMessage)`.
    fn verify_server_signature(&mut self, verification: &[u8]) -> bool {
        let hash_size = self.algorithm.hash_size();

        if self.server_key[..hash_size].iter().all(|&b| b == 0) {
            // ServerKey := HMAC(SaltedPassword, "Server Key")
            let salted = self.salted_password;
            self.crypto.hmac(
                self.algorithm,
                &salted[..hash_size],
                SERVER_KEY,
                &mut self.server_key[..hash_size],
            );
        }

        // ServerSignature := HMAC(ServerKey, AuthMessage)
        let server_key = self.server_key;
        let mut server_signature = [0u8; HASH_MAX_SIZE];
        self.crypto.hmac(
            self.algorithm,
            &server_key[..hash_size],
            &self.auth_message,
            &mut server_signature[..hash_size],
        );

        let encoded = b64::encode(&server_signature[..hash_size]);
        server_signature.zeroize();

        verification.len() == encoded.len()
            && bool::from(verification.ct_eq(encoded.as_bytes()))
    }

    /// Replace the session's cache entry with the presecrets and secrets
    /// that just authenticated.
    fn update_cache(&mut self) {
        let Some(hashed_password) = self.hashed_password.clone() else {
            return;
        };
        self.cache = Some(ScramCache {
            algorithm: self.algorithm,
            hashed_password,
            decoded_salt: self.decoded_salt,
            iterations: self.iterations,
            salted_password: self.salted_password,
            client_key: self.client_key,
            server_key: self.server_key,
        });
    }
}

impl fmt::Debug for ScramClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScramClient")
            .field("algorithm", &self.algorithm)
            .field("step", &self.step)
            .finish_non_exhaustive()
    }
}

impl Drop for ScramClient {
    fn drop(&mut self) {
        self.decoded_salt.zeroize();
        self.salted_password.zeroize();
        self.client_key.zeroize();
        self.server_key.zeroize();
        self.auth_message.zeroize();
    }
}

/// Append `src` to `outbuf` at `*outlen`, failing when the cap would be
/// exceeded.
fn buf_write(src: &[u8], outbuf: &mut [u8], outlen: &mut usize) -> bool {
    let end = *outlen + src.len();
    if end > outbuf.len() {
        return false;
    }
    outbuf[*outlen..end].copy_from_slice(src);
    *outlen = end;
    true
}

/// Append `src` to the auth message, failing past the capacity fixed in
/// step 1.
fn auth_write(src: &[u8], auth_message: &mut Vec<u8>, max: usize) -> bool {
    if auth_message.len() + src.len() > max {
        return false;
    }
    auth_message.extend_from_slice(src);
    true
}

/// Walk a comma separated `k=v` attribute list, filling the slot for each
/// recognized key. Unknown keys and malformed pairs are protocol errors.
fn scan_attributes<'a>(
    inbuf: &'a [u8],
    step: u8,
    fields: &mut [(u8, &mut Option<&'a [u8]>)],
) -> Result<()> {
    let mut pos = 0;
    while pos < inbuf.len() {
        let key = inbuf[pos];
        let Some(slot) = fields.iter_mut().find(|(k, _)| *k == key) else {
            return Err(Error::Protocol(format!(
                "unknown key ({}) in sasl step {step}",
                key as char
            )));
        };

        pos += 1;
        if inbuf.get(pos) != Some(&b'=') {
            return Err(Error::Protocol(format!(
                "invalid parse state in sasl step {step}"
            )));
        }
        pos += 1;

        let end = memchr::memchr(b',', &inbuf[pos..]).map_or(inbuf.len(), |i| pos + i);
        *slot.1 = Some(&inbuf[pos..end]);
        pos = end + 1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Nonce source returning a fixed byte pattern.
    struct FixedNonce([u8; NONCE_LEN]);

    impl NonceSource for FixedNonce {
        fn fill(&mut self, buf: &mut [u8]) -> bool {
            buf.copy_from_slice(&self.0);
            true
        }
    }

    /// Nonce source simulating an exhausted entropy pool.
    struct FailingNonce;

    impl NonceSource for FailingNonce {
        fn fill(&mut self, _buf: &mut [u8]) -> bool {
            false
        }
    }

    fn client_with_nonce(algorithm: Algorithm, nonce: [u8; NONCE_LEN]) -> ScramClient {
        let mut scram = ScramClient::with_providers(
            algorithm,
            Box::new(RustCryptoProvider),
            Box::new(FixedNonce(nonce)),
        );
        scram.set_user("user");
        scram.set_pass("pencil");
        scram
    }

    fn protocol_message(err: Error) -> String {
        match err {
            Error::Protocol(msg) => msg,
            Error::NotDone => panic!("expected protocol error"),
        }
    }

    #[test]
    fn step1_requires_username() {
        let mut scram = ScramClient::new(Algorithm::Sha256);
        scram.set_pass("pencil");
        let mut out = [0u8; 4096];
        let err = scram.step(b"", &mut out).unwrap_err();
        assert_eq!(protocol_message(err), "username is not set");
    }

    #[test]
    fn step1_produces_client_first() {
        let mut scram = client_with_nonce(Algorithm::Sha256, [0u8; NONCE_LEN]);
        let mut out = [0u8; 4096];
        let n = scram.step(b"", &mut out).unwrap();

        // base64 of 24 zero bytes is 32 'A's
        let expected = b"n,,n=user,r=AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";
        assert_eq!(&out[..n], expected.as_slice());
        assert_eq!(scram.encoded_nonce.len(), 32);

        // auth message holds client-first-bare plus a trailing comma
        assert_eq!(scram.auth_message, b"n=user,r=AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA,");
    }

    #[test]
    fn step1_escapes_username() {
        let mut scram = client_with_nonce(Algorithm::Sha256, [1u8; NONCE_LEN]);
        scram.set_user("a,b=c");
        let mut out = [0u8; 4096];
        let n = scram.step(b"", &mut out).unwrap();
        assert!(out[..n].starts_with(b"n,,n=a=2Cb=3Dc,r="));
    }

    #[test]
    fn step1_nonce_failure_is_protocol_error() {
        let mut scram = ScramClient::with_providers(
            Algorithm::Sha256,
            Box::new(RustCryptoProvider),
            Box::new(FailingNonce),
        );
        scram.set_user("user");
        let mut out = [0u8; 4096];
        let err = scram.step(b"", &mut out).unwrap_err();
        assert!(protocol_message(err).contains("could not generate"));
    }

    #[test]
    fn step1_output_cap_is_enforced() {
        let mut scram = client_with_nonce(Algorithm::Sha256, [0u8; NONCE_LEN]);
        let mut out = [0u8; 16];
        let err = scram.step(b"", &mut out).unwrap_err();
        assert_eq!(protocol_message(err), "could not buffer sasl step1");
    }

    #[test]
    fn auth_message_cap_is_enforced_in_step2() {
        let mut scram = client_with_nonce(Algorithm::Sha256, [0u8; NONCE_LEN]);
        // large enough for client-first, too small once server-first lands
        let mut out = [0u8; 48];
        scram.step(b"", &mut out).unwrap();

        let server_first =
            b"r=AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAserver,s=c2FsdA==,i=4096";
        let err = scram.step(server_first, &mut out).unwrap_err();
        assert_eq!(
            protocol_message(err),
            "could not buffer auth message in sasl step2"
        );
    }

    #[test]
    fn step2_requires_password() {
        let mut scram = client_with_nonce(Algorithm::Sha256, [0u8; NONCE_LEN]);
        scram.set_pass("");
        let mut out = [0u8; 4096];
        scram.step(b"", &mut out).unwrap();
        let err = scram.step(b"r=x,s=y,i=4096", &mut out).unwrap_err();
        assert_eq!(protocol_message(err), "password is not set");
    }

    fn stepped_client() -> (ScramClient, [u8; 4096]) {
        let mut scram = client_with_nonce(Algorithm::Sha256, [0u8; NONCE_LEN]);
        let mut out = [0u8; 4096];
        scram.step(b"", &mut out).unwrap();
        (scram, out)
    }

    /// Server-first message whose combined nonce repeats the fixed client
    /// nonce and whose salt has the right length for SHA-256.
    fn valid_server_first() -> Vec<u8> {
        let salt = b64::encode(&[7u8; 28]);
        format!(
            "r=AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAsrvnonce,s={salt},i=4096"
        )
        .into_bytes()
    }

    #[test]
    fn step2_rejects_unknown_key() {
        let (mut scram, mut out) = stepped_client();
        let err = scram.step(b"z=1", &mut out).unwrap_err();
        assert_eq!(protocol_message(err), "unknown key (z) in sasl step 2");
    }

    #[test]
    fn step2_rejects_missing_equals() {
        let (mut scram, mut out) = stepped_client();
        let err = scram.step(b"r", &mut out).unwrap_err();
        assert_eq!(protocol_message(err), "invalid parse state in sasl step 2");
    }

    #[test]
    fn step2_requires_all_params() {
        for (input, missing) in [
            (&b"s=c2FsdA==,i=4096"[..], "no r param in sasl step 2"),
            (&b"r=AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA,i=4096"[..], "no s param in sasl step 2"),
            (
                &b"r=AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA,s=c2FsdA=="[..],
                "no i param in sasl step 2",
            ),
        ] {
            let (mut scram, mut out) = stepped_client();
            let err = scram.step(input, &mut out).unwrap_err();
            assert_eq!(protocol_message(err), missing);
        }
    }

    #[test]
    fn step2_aborts_on_nonce_mismatch() {
        let (mut scram, mut out) = stepped_client();
        let salt = b64::encode(&[7u8; 28]);
        let input = format!("r=BBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBsrvnonce,s={salt},i=4096");
        let err = scram.step(input.as_bytes(), &mut out).unwrap_err();
        assert_eq!(
            protocol_message(err),
            "client nonce not repeated in sasl step 2"
        );
    }

    #[test]
    fn step2_rejects_bad_salt_base64() {
        let (mut scram, mut out) = stepped_client();
        let err = scram
            .step(
                b"r=AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAx,s=!!!,i=4096",
                &mut out,
            )
            .unwrap_err();
        assert_eq!(protocol_message(err), "unable to decode salt in sasl step2");
    }

    #[test]
    fn step2_rejects_wrong_salt_length() {
        let (mut scram, mut out) = stepped_client();
        let salt = b64::encode(&[7u8; 16]);
        let input = format!("r=AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAx,s={salt},i=4096");
        let err = scram.step(input.as_bytes(), &mut out).unwrap_err();
        assert_eq!(
            protocol_message(err),
            "invalid salt length of 16 in sasl step2"
        );
    }

    #[test]
    fn step2_rejects_unparseable_iterations() {
        let (mut scram, mut out) = stepped_client();
        let salt = b64::encode(&[7u8; 28]);
        let input = format!("r=AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAx,s={salt},i=40x96");
        let err = scram.step(input.as_bytes(), &mut out).unwrap_err();
        assert_eq!(
            protocol_message(err),
            "unable to parse iterations in sasl step2"
        );
    }

    #[test]
    fn step2_rejects_negative_iterations() {
        let (mut scram, mut out) = stepped_client();
        let salt = b64::encode(&[7u8; 28]);
        let input = format!("r=AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAx,s={salt},i=-1");
        let err = scram.step(input.as_bytes(), &mut out).unwrap_err();
        assert_eq!(
            protocol_message(err),
            "iterations is negative in sasl step2"
        );
    }

    #[test]
    fn step2_rejects_low_iteration_count() {
        let (mut scram, mut out) = stepped_client();
        let salt = b64::encode(&[7u8; 28]);
        let input = format!("r=AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAx,s={salt},i=2048");
        let err = scram.step(input.as_bytes(), &mut out).unwrap_err();
        assert_eq!(
            protocol_message(err),
            "iterations must be at least 4096"
        );
    }

    #[test]
    fn step2_emits_client_final_shape() {
        let (mut scram, mut out) = stepped_client();
        let n = scram.step(&valid_server_first(), &mut out).unwrap();
        let text = std::str::from_utf8(&out[..n]).unwrap();
        assert!(text.starts_with("c=biws,r=AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAsrvnonce,p="));
        // SHA-256 proof is 32 bytes -> 44 base64 chars
        let marker = text.find(",p=").unwrap();
        assert_eq!(text.len() - (marker + 3), 44);
    }

    #[test]
    fn step3_surfaces_server_error() {
        let (mut scram, mut out) = stepped_client();
        scram.step(&valid_server_first(), &mut out).unwrap();
        let err = scram.step(b"e=invalid-proof", &mut out).unwrap_err();
        assert_eq!(
            protocol_message(err),
            "authentication failure in sasl step 3 : invalid-proof"
        );
    }

    #[test]
    fn step3_requires_verifier() {
        let (mut scram, mut out) = stepped_client();
        scram.step(&valid_server_first(), &mut out).unwrap();
        let err = scram.step(b"", &mut out).unwrap_err();
        assert_eq!(protocol_message(err), "no v param in sasl step 3");
    }

    #[test]
    fn step3_rejects_unknown_key() {
        let (mut scram, mut out) = stepped_client();
        scram.step(&valid_server_first(), &mut out).unwrap();
        let err = scram.step(b"q=1", &mut out).unwrap_err();
        assert_eq!(protocol_message(err), "unknown key (q) in sasl step 3");
    }

    #[test]
    fn step3_rejects_bad_signature() {
        let (mut scram, mut out) = stepped_client();
        scram.step(&valid_server_first(), &mut out).unwrap();
        let forged = b64::encode(&[9u8; 32]);
        let input = format!("v={forged}");
        let err = scram.step(input.as_bytes(), &mut out).unwrap_err();
        assert_eq!(
            protocol_message(err),
            "could not verify server signature in sasl step 3"
        );
    }

    #[test]
    fn step_past_three_is_not_done() {
        let mut scram = ScramClient::new(Algorithm::Sha256);
        scram.step = 3;
        let mut out = [0u8; 64];
        assert!(matches!(scram.step(b"", &mut out), Err(Error::NotDone)));
    }

    // RFC 5802 section 5 example, with the password fed to the kernel
    // directly (the conversation itself would first hash the credential).
    #[test]
    fn rfc5802_sha1_reference_vector() {
        let mut scram = ScramClient::new(Algorithm::Sha1);
        scram.auth_message = b"n=user,r=fyko+d2lbbFgONRv9qkxdawL,\
            r=fyko+d2lbbFgONRv9qkxdawL3rfcNHYJY1ZVvWVs7j,s=QSXCR+Q6sek8bf92,i=4096,\
            c=biws,r=fyko+d2lbbFgONRv9qkxdawL3rfcNHYJY1ZVvWVs7j"
            .to_vec();
        scram.auth_message_max = 4096;

        let salt = b64::decode(b"QSXCR+Q6sek8bf92").unwrap();
        scram.salt_password(b"pencil", &salt, 4096);

        let mut out = [0u8; 64];
        let mut outlen = 0;
        scram.generate_client_proof(&mut out, &mut outlen).unwrap();
        assert_eq!(&out[..outlen], b"v0X8v3Bz2T0CJGbJQyF0X+HI4Ts=");

        assert!(scram.verify_server_signature(b"rmF9pqV8S7suAoZWja4dJRkFsKQ="));
        assert!(!scram.verify_server_signature(b"rmF9pqV8S7suAoZWja4dJRkFsKM="));
    }

    // RFC 7677 section 3 example.
    #[test]
    fn rfc7677_sha256_reference_vector() {
        let mut scram = ScramClient::new(Algorithm::Sha256);
        scram.auth_message = b"n=user,r=rOprNGfwEbeRWgbNEkqO,\
            r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,\
            s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096,\
            c=biws,r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0"
            .to_vec();
        scram.auth_message_max = 4096;

        let salt = b64::decode(b"W22ZaJ0SNY7soEsUEjb6gQ==").unwrap();
        scram.salt_password(b"pencil", &salt, 4096);

        let mut out = [0u8; 64];
        let mut outlen = 0;
        scram.generate_client_proof(&mut out, &mut outlen).unwrap();
        assert_eq!(
            &out[..outlen],
            b"dHzbZapWIk4jUhN+Ute9ytag9zjfMHgsqmmiz7AndVQ="
        );

        assert!(
            scram.verify_server_signature(b"6rriTRBi23WpRR/wtup+mMhUZUn/dB5nLTJRsjl95G4=")
        );
    }

    #[test]
    fn empty_setters_clear_fields() {
        let mut scram = ScramClient::new(Algorithm::Sha256);
        scram.set_user("user");
        scram.set_user("");
        let mut out = [0u8; 4096];
        let err = scram.step(b"", &mut out).unwrap_err();
        assert_eq!(protocol_message(err), "username is not set");
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let mut scram = ScramClient::new(Algorithm::Sha1);
        scram.set_pass("hunter2");
        let rendered = format!("{scram:?}");
        assert!(rendered.contains("SCRAM-SHA-1") || rendered.contains("Sha1"));
        assert!(!rendered.contains("hunter2"));
    }
}
