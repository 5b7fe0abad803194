//! Cryptographic operations the handshake needs.
//!
//! The handshake never touches a primitive directly. Everything goes through
//! a [`CryptoProvider`], which makes it possible to swap implementations or
//! run against a hardware backed one. [`rust_crypto::default_provider`] is
//! the built-in implementation.
//!
//! Record protection (the AEAD itself) is not part of this crate. The derived
//! [`KeyBlock`] is handed to the [`Transport`][crate::Transport] which owns
//! the record layer.

use std::fmt;

use zeroize::Zeroizing;

use crate::message::{CipherSuite, HashAlgorithm, NamedGroup, Random};
use crate::Error;

pub(crate) mod prf;
pub mod rust_crypto;

/// Length of a TLS 1.2 master secret.
pub const MASTER_SECRET_LEN: usize = 48;

/// Provider of hashing, key exchange and TLS 1.2 key derivation.
pub trait CryptoProvider: Send + Sync + fmt::Debug {
    /// Groups we can do ECDHE with, in preference order.
    fn supported_groups(&self) -> &[NamedGroup];

    /// Generate an ephemeral key pair for `group`.
    fn start_key_exchange(&self, group: NamedGroup) -> Result<Box<dyn ActiveKeyExchange>, Error>;

    /// One-shot hash of `data`.
    fn hash(&self, algorithm: HashAlgorithm, data: &[u8]) -> Result<Vec<u8>, Error>;

    /// Derive the master secret from the pre-master secret.
    fn derive_master_secret(
        &self,
        suite: CipherSuite,
        pre_master_secret: &[u8],
        seed: MasterSecretSeed<'_>,
    ) -> Result<MasterSecret, Error>;

    /// `verify_data` for a Finished message over the transcript so far.
    fn compute_finished_mac(
        &self,
        suite: CipherSuite,
        sender: Sender,
        master_secret: &MasterSecret,
        transcript: &[u8],
    ) -> Result<Vec<u8>, Error>;

    /// Expand the master secret into traffic keys.
    fn derive_key_block(
        &self,
        suite: CipherSuite,
        master_secret: &MasterSecret,
        client_random: &Random,
        server_random: &Random,
    ) -> Result<KeyBlock, Error>;
}

/// An ephemeral key pair waiting for the peer's public key.
pub trait ActiveKeyExchange: Send {
    fn group(&self) -> NamedGroup;

    /// Our public key, in the encoding that goes on the wire.
    fn public_key(&self) -> &[u8];

    /// Compute the shared secret. Consumes the private key.
    fn complete(self: Box<Self>, peer_public_key: &[u8]) -> Result<Zeroizing<Vec<u8>>, Error>;
}

/// Seed input for master secret derivation.
#[derive(Debug, Clone, Copy)]
pub enum MasterSecretSeed<'a> {
    /// RFC 5246: `client_random + server_random`.
    Standard {
        client_random: &'a Random,
        server_random: &'a Random,
    },
    /// RFC 7627: hash of the transcript up to and including ClientKeyExchange.
    Extended { session_hash: &'a [u8] },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    Client,
    Server,
}

impl Sender {
    pub fn finished_label(&self) -> &'static str {
        match self {
            Sender::Client => "client finished",
            Sender::Server => "server finished",
        }
    }
}

/// The 48 byte master secret. Zeroized on drop and never printed.
#[derive(Clone)]
pub struct MasterSecret(Zeroizing<[u8; MASTER_SECRET_LEN]>);

impl MasterSecret {
    pub fn try_new(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() != MASTER_SECRET_LEN {
            return Err(Error::CryptoError(format!(
                "master secret must be {} bytes, got {}",
                MASTER_SECRET_LEN,
                bytes.len()
            )));
        }
        let mut secret = Zeroizing::new([0u8; MASTER_SECRET_LEN]);
        secret.copy_from_slice(bytes);
        Ok(MasterSecret(secret))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0[..]
    }
}

impl fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterSecret(..)")
    }
}

/// Traffic keys for an AEAD suite.
#[derive(Clone)]
pub struct KeyBlock {
    pub client_write_key: Zeroizing<Vec<u8>>,
    pub server_write_key: Zeroizing<Vec<u8>>,
    pub client_write_iv: Zeroizing<Vec<u8>>,
    pub server_write_iv: Zeroizing<Vec<u8>>,
}

impl KeyBlock {
    /// Split an expanded key block. AEAD suites have no MAC keys.
    pub fn from_expansion(suite: CipherSuite, block: &[u8]) -> Result<Self, Error> {
        let key_len = suite.key_len();
        let iv_len = suite.fixed_iv_len();
        if key_len == 0 || block.len() < 2 * (key_len + iv_len) {
            return Err(Error::CryptoError("key block too short".to_string()));
        }

        let (client_write_key, rest) = block.split_at(key_len);
        let (server_write_key, rest) = rest.split_at(key_len);
        let (client_write_iv, rest) = rest.split_at(iv_len);
        let server_write_iv = &rest[..iv_len];

        Ok(KeyBlock {
            client_write_key: Zeroizing::new(client_write_key.to_vec()),
            server_write_key: Zeroizing::new(server_write_key.to_vec()),
            client_write_iv: Zeroizing::new(client_write_iv.to_vec()),
            server_write_iv: Zeroizing::new(server_write_iv.to_vec()),
        })
    }

    pub fn expansion_len(suite: CipherSuite) -> usize {
        2 * (suite.key_len() + suite.fixed_iv_len())
    }
}

impl fmt::Debug for KeyBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyBlock")
            .field("key_len", &self.client_write_key.len())
            .field("iv_len", &self.client_write_iv.len())
            .finish_non_exhaustive()
    }
}

/// Compare without early exit.
pub(crate) fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
