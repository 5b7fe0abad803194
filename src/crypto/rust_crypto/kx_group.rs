//! Key exchange group implementations using RustCrypto.

use p256::{ecdh::EphemeralSecret, PublicKey as P256PublicKey};
use p384::{ecdh::EphemeralSecret as P384EphemeralSecret, PublicKey as P384PublicKey};
use rand::rngs::OsRng;
use zeroize::Zeroizing;

use crate::crypto::ActiveKeyExchange;
use crate::message::NamedGroup;
use crate::Error;

/// ECDHE key exchange implementation.
enum EcdhKeyExchange {
    P256 {
        secret: EphemeralSecret,
        public_key: Vec<u8>,
    },
    P384 {
        secret: P384EphemeralSecret,
        public_key: Vec<u8>,
    },
    X25519 {
        secret: x25519_dalek::EphemeralSecret,
        public_key: Vec<u8>,
    },
}

impl std::fmt::Debug for EcdhKeyExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EcdhKeyExchange")
            .field("group", &self.group())
            .field("public_key_len", &self.public_key().len())
            .finish_non_exhaustive()
    }
}

impl EcdhKeyExchange {
    pub(super) fn new(group: NamedGroup) -> Result<Self, Error> {
        match group {
            NamedGroup::Secp256r1 => {
                let secret = EphemeralSecret::random(&mut OsRng);
                let public_key = P256PublicKey::from(&secret).to_sec1_bytes().to_vec();
                Ok(EcdhKeyExchange::P256 { secret, public_key })
            }
            NamedGroup::Secp384r1 => {
                let secret = P384EphemeralSecret::random(&mut OsRng);
                let public_key = P384PublicKey::from(&secret).to_sec1_bytes().to_vec();
                Ok(EcdhKeyExchange::P384 { secret, public_key })
            }
            NamedGroup::X25519 => {
                let secret = x25519_dalek::EphemeralSecret::random_from_rng(OsRng);
                let public_key = x25519_dalek::PublicKey::from(&secret).as_bytes().to_vec();
                Ok(EcdhKeyExchange::X25519 { secret, public_key })
            }
            NamedGroup::Unknown(_) => Err(Error::CryptoError(format!(
                "Unsupported group: {:?}",
                group
            ))),
        }
    }
}

impl ActiveKeyExchange for EcdhKeyExchange {
    fn group(&self) -> NamedGroup {
        match self {
            EcdhKeyExchange::P256 { .. } => NamedGroup::Secp256r1,
            EcdhKeyExchange::P384 { .. } => NamedGroup::Secp384r1,
            EcdhKeyExchange::X25519 { .. } => NamedGroup::X25519,
        }
    }

    fn public_key(&self) -> &[u8] {
        match self {
            EcdhKeyExchange::P256 { public_key, .. }
            | EcdhKeyExchange::P384 { public_key, .. }
            | EcdhKeyExchange::X25519 { public_key, .. } => public_key,
        }
    }

    fn complete(self: Box<Self>, peer_pub: &[u8]) -> Result<Zeroizing<Vec<u8>>, Error> {
        match *self {
            EcdhKeyExchange::P256 { secret, .. } => {
                let peer_key = P256PublicKey::from_sec1_bytes(peer_pub)
                    .map_err(|_| Error::IllegalParameter("Invalid P-256 public key".into()))?;
                let shared = secret.diffie_hellman(&peer_key);
                Ok(Zeroizing::new(shared.raw_secret_bytes().to_vec()))
            }
            EcdhKeyExchange::P384 { secret, .. } => {
                let peer_key = P384PublicKey::from_sec1_bytes(peer_pub)
                    .map_err(|_| Error::IllegalParameter("Invalid P-384 public key".into()))?;
                let shared = secret.diffie_hellman(&peer_key);
                Ok(Zeroizing::new(shared.raw_secret_bytes().to_vec()))
            }
            EcdhKeyExchange::X25519 { secret, .. } => {
                let bytes: [u8; 32] = peer_pub
                    .try_into()
                    .map_err(|_| Error::IllegalParameter("Invalid X25519 public key".into()))?;
                let shared = secret.diffie_hellman(&x25519_dalek::PublicKey::from(bytes));
                if !shared.was_contributory() {
                    return Err(Error::IllegalParameter(
                        "X25519 shared secret is all zero".into(),
                    ));
                }
                Ok(Zeroizing::new(shared.as_bytes().to_vec()))
            }
        }
    }
}

pub(super) fn start(group: NamedGroup) -> Result<Box<dyn ActiveKeyExchange>, Error> {
    Ok(Box::new(EcdhKeyExchange::new(group)?))
}

/// All supported key exchange groups, in preference order.
pub(super) static ALL_KX_GROUPS: &[NamedGroup] = &[
    NamedGroup::X25519,
    NamedGroup::Secp256r1,
    NamedGroup::Secp384r1,
];
