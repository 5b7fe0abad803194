//! The byte transport the handshake runs over.

use std::io;

use crate::crypto::KeyBlock;

/// Which half of the connection a cipher state change applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

/// Non-blocking transport.
///
/// "Would block" is reported as [`io::ErrorKind::WouldBlock`] and makes the
/// handshake return [`Step::WouldBlock`][crate::Step]. Any other error is
/// fatal, except [`io::ErrorKind::Interrupted`] which is retried.
///
/// For DTLS every `try_read` yields one datagram and every `try_write` takes
/// one datagram. For TLS both are plain byte streams.
///
/// The client writes and reads plaintext records. Record protection is the
/// transport's business: once told about a new cipher state through
/// [`set_cipher_state`][Transport::set_cipher_state], the transport is
/// expected to protect (or unprotect) records of that epoch and later.
pub trait Transport {
    /// Read into `buf`. `Ok(0)` means the peer closed.
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write from `buf`, returning how much was taken.
    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Push out anything the transport buffers internally.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// Negotiated keys are in effect for `direction` from `epoch` on.
    ///
    /// Writes switch right before the first bytes needing the keys are
    /// handed to [`try_write`][Transport::try_write]. Reads switch once the
    /// peer's ChangeCipherSpec has been consumed; a stream transport must
    /// hold back any bytes following that record until then.
    ///
    /// For TLS the epoch is 1 after the first ChangeCipherSpec.
    fn set_cipher_state(
        &mut self,
        direction: Direction,
        epoch: u16,
        keys: &KeyBlock,
    ) -> io::Result<()> {
        let _ = (direction, epoch, keys);
        Ok(())
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn try_read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).try_read(buf)
    }

    fn try_write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (**self).try_write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }

    fn set_cipher_state(
        &mut self,
        direction: Direction,
        epoch: u16,
        keys: &KeyBlock,
    ) -> io::Result<()> {
        (**self).set_cipher_state(direction, epoch, keys)
    }
}
