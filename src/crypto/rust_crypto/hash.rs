//! Hash implementations using RustCrypto.

use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::message::HashAlgorithm;
use crate::Error;

pub(super) fn digest(algorithm: HashAlgorithm, data: &[u8]) -> Result<Vec<u8>, Error> {
    let out = match algorithm {
        HashAlgorithm::SHA256 => Sha256::digest(data).to_vec(),
        HashAlgorithm::SHA384 => Sha384::digest(data).to_vec(),
        HashAlgorithm::SHA512 => Sha512::digest(data).to_vec(),
        _ => {
            return Err(Error::CryptoError(format!(
                "Unsupported hash algorithm: {:?}",
                algorithm
            )))
        }
    };
    Ok(out)
}
