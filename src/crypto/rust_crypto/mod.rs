//! RustCrypto cryptographic provider.
//!
//! A pure Rust backend built on crates from the
//! [RustCrypto](https://github.com/RustCrypto) organization.
//!
//! ```
//! use std::sync::Arc;
//! use dconnect::crypto::rust_crypto;
//! # use dconnect::{CertVerifier, Error, PeerIdentity};
//! # use dconnect::message::DigitallySigned;
//! # #[derive(Debug)]
//! # struct Trusting;
//! # impl CertVerifier for Trusting {
//! #     fn verify_chain(&self, chain: &[Vec<u8>]) -> Result<PeerIdentity, Error> {
//! #         Ok(PeerIdentity::new(chain[0].clone(), None))
//! #     }
//! #     fn verify_signature(&self, _: &PeerIdentity, _: &[u8], _: &DigitallySigned) -> Result<(), Error> {
//! #         Ok(())
//! #     }
//! # }
//! use dconnect::Config;
//!
//! let config = Config::builder()
//!     .with_crypto_provider(rust_crypto::default_provider())
//!     .cert_verifier(Arc::new(Trusting))
//!     .build()
//!     .unwrap();
//! ```
//!
//! # Supported Key Exchange Groups
//!
//! - `x25519`
//! - `secp256r1` (P-256)
//! - `secp384r1` (P-384)
//!
//! # TLS 1.2 PRF
//!
//! HMAC-SHA256 and HMAC-SHA384, including the extended master secret
//! (RFC 7627).

mod hash;
mod kx_group;

use std::sync::Arc;

use crate::crypto::prf::prf_tls12;
use crate::crypto::{ActiveKeyExchange, CryptoProvider, KeyBlock, MasterSecret};
use crate::crypto::{MasterSecretSeed, Sender, MASTER_SECRET_LEN};
use crate::message::{CipherSuite, HashAlgorithm, NamedGroup, Random};
use crate::Error;

/// Get the default RustCrypto-based crypto provider.
pub fn default_provider() -> Arc<dyn CryptoProvider> {
    Arc::new(RustCrypto)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RustCrypto;

impl CryptoProvider for RustCrypto {
    fn supported_groups(&self) -> &[NamedGroup] {
        kx_group::ALL_KX_GROUPS
    }

    fn start_key_exchange(&self, group: NamedGroup) -> Result<Box<dyn ActiveKeyExchange>, Error> {
        kx_group::start(group)
    }

    fn hash(&self, algorithm: HashAlgorithm, data: &[u8]) -> Result<Vec<u8>, Error> {
        hash::digest(algorithm, data)
    }

    fn derive_master_secret(
        &self,
        suite: CipherSuite,
        pre_master_secret: &[u8],
        seed: MasterSecretSeed<'_>,
    ) -> Result<MasterSecret, Error> {
        let hash = suite.hash_algorithm();
        let out = match seed {
            MasterSecretSeed::Standard {
                client_random,
                server_random,
            } => {
                let mut seed = Vec::with_capacity(64);
                seed.extend_from_slice(client_random.as_bytes());
                seed.extend_from_slice(server_random.as_bytes());
                prf_tls12(pre_master_secret, "master secret", &seed, MASTER_SECRET_LEN, hash)?
            }
            MasterSecretSeed::Extended { session_hash } => prf_tls12(
                pre_master_secret,
                "extended master secret",
                session_hash,
                MASTER_SECRET_LEN,
                hash,
            )?,
        };
        MasterSecret::try_new(&out)
    }

    fn compute_finished_mac(
        &self,
        suite: CipherSuite,
        sender: Sender,
        master_secret: &MasterSecret,
        transcript: &[u8],
    ) -> Result<Vec<u8>, Error> {
        let hash = suite.hash_algorithm();
        let handshake_hash = hash::digest(hash, transcript)?;
        let out = prf_tls12(
            master_secret.as_bytes(),
            sender.finished_label(),
            &handshake_hash,
            suite.verify_data_length(),
            hash,
        )?;
        Ok(out.to_vec())
    }

    fn derive_key_block(
        &self,
        suite: CipherSuite,
        master_secret: &MasterSecret,
        client_random: &Random,
        server_random: &Random,
    ) -> Result<KeyBlock, Error> {
        // Note the order: server random first for key expansion.
        let mut seed = Vec::with_capacity(64);
        seed.extend_from_slice(server_random.as_bytes());
        seed.extend_from_slice(client_random.as_bytes());

        let block = prf_tls12(
            master_secret.as_bytes(),
            "key expansion",
            &seed,
            KeyBlock::expansion_len(suite),
            suite.hash_algorithm(),
        )?;
        KeyBlock::from_expansion(suite, &block)
    }
}
