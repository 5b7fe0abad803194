use hmac::digest::KeyInit;
use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha384};
use zeroize::Zeroizing;

use crate::message::HashAlgorithm;
use crate::Error;

/// PRF for TLS 1.2 as specified in RFC 5246 Section 5.
///
/// PRF(secret, label, seed) = P_<hash>(secret, label + seed)
///
/// The seed parameter is the seed data WITHOUT the label.
pub fn prf_tls12(
    secret: &[u8],
    label: &str,
    seed: &[u8],
    output_len: usize,
    hash: HashAlgorithm,
) -> Result<Zeroizing<Vec<u8>>, Error> {
    let mut full_seed = Vec::with_capacity(label.len() + seed.len());
    full_seed.extend_from_slice(label.as_bytes());
    full_seed.extend_from_slice(seed);

    let mut out = Zeroizing::new(vec![0; output_len]);

    match hash {
        HashAlgorithm::SHA256 => p_hash::<Hmac<Sha256>>(secret, &full_seed, &mut out)?,
        HashAlgorithm::SHA384 => p_hash::<Hmac<Sha384>>(secret, &full_seed, &mut out)?,
        _ => {
            return Err(Error::CryptoError(format!(
                "Unsupported PRF hash for TLS1.2: {:?}",
                hash
            )))
        }
    }

    Ok(out)
}

fn p_hash<M>(secret: &[u8], full_seed: &[u8], out: &mut [u8]) -> Result<(), Error>
where
    M: Mac + KeyInit + Clone,
{
    let key = <M as KeyInit>::new_from_slice(secret)
        .map_err(|_| Error::CryptoError("bad HMAC key".to_string()))?;

    // A(1) = HMAC_hash(secret, A(0)) where A(0) = seed
    let mut a = {
        let mut mac = key.clone();
        mac.update(full_seed);
        mac.finalize().into_bytes()
    };

    let mut written = 0;
    while written < out.len() {
        // HMAC_hash(secret, A(i) + seed)
        let mut mac = key.clone();
        mac.update(&a);
        mac.update(full_seed);
        let block = mac.finalize().into_bytes();

        let n = (out.len() - written).min(block.len());
        out[written..written + n].copy_from_slice(&block[..n]);
        written += n;

        if written < out.len() {
            // A(i+1) = HMAC_hash(secret, A(i))
            let mut mac = key.clone();
            mac.update(&a);
            a = mac.finalize().into_bytes();
        }
    }

    Ok(())
}
