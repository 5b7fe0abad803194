//! Certificate verification and client authentication hooks.
//!
//! X.509 parsing and trust decisions are not made by this crate. The
//! handshake hands the server's chain to a [`CertVerifier`] and, when the
//! server asks for client authentication, uses a [`ClientCredential`].

use std::fmt;

use crate::message::{DigitallySigned, SignatureAndHashAlgorithm};
use crate::Error;

/// The authenticated server, as established by the [`CertVerifier`].
#[derive(Clone, PartialEq, Eq)]
pub struct PeerIdentity {
    end_entity: Vec<u8>,
    name: Option<String>,
}

impl PeerIdentity {
    pub fn new(end_entity: Vec<u8>, name: Option<String>) -> Self {
        PeerIdentity { end_entity, name }
    }

    /// DER of the end-entity certificate.
    #[inline(always)]
    pub fn end_entity(&self) -> &[u8] {
        &self.end_entity
    }

    /// Verified subject name, if the verifier extracted one.
    #[inline(always)]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

impl fmt::Debug for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerIdentity")
            .field("end_entity_len", &self.end_entity.len())
            .field("name", &self.name)
            .finish()
    }
}

/// Decides whether the server is who it claims to be.
pub trait CertVerifier: Send + Sync + fmt::Debug {
    /// Verify a DER chain, end-entity first. Called once per full handshake.
    ///
    /// Return [`Error::CertificateError`] to reject.
    fn verify_chain(&self, chain: &[Vec<u8>]) -> Result<PeerIdentity, Error>;

    /// Verify the ServerKeyExchange signature made with the end-entity key.
    fn verify_signature(
        &self,
        peer: &PeerIdentity,
        message: &[u8],
        signature: &DigitallySigned,
    ) -> Result<(), Error>;
}

/// A certificate and private key for client authentication.
pub trait ClientCredential: Send + Sync + fmt::Debug {
    /// DER chain, end-entity first.
    fn certificate_chain(&self) -> &[Vec<u8>];

    /// Sign `message` with one of the `offered` algorithms.
    fn sign(
        &self,
        message: &[u8],
        offered: &[SignatureAndHashAlgorithm],
    ) -> Result<DigitallySigned, Error>;
}
