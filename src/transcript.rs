use crate::crypto::CryptoProvider;
use crate::message::{Handshake, HashAlgorithm, Variant};
use crate::Error;

/// Every handshake message sent and received, in wire order.
///
/// DTLS messages are recorded with their full 12 byte header as if
/// unfragmented, TLS ones with the 4 byte header.
#[derive(Debug)]
pub(crate) struct Transcript {
    variant: Variant,
    buf: Vec<u8>,
}

impl Transcript {
    pub fn new(variant: Variant) -> Self {
        Transcript {
            variant,
            buf: Vec::new(),
        }
    }

    /// Forget everything. A new ClientHello restarts the Finished MAC.
    pub fn reset(&mut self) {
        self.buf.clear();
    }

    pub fn push(&mut self, handshake: &Handshake) {
        handshake.serialize(&mut self.buf, self.variant);
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn hash(&self, provider: &dyn CryptoProvider, algorithm: HashAlgorithm) -> Result<Vec<u8>, Error> {
        provider.hash(algorithm, &self.buf)
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}
