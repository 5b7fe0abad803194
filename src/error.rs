use std::io;

use thiserror::Error;

use crate::message::{AlertDescription, CipherSuite, ExtensionType, ProtocolVersion};

/// Errors surfaced by the handshake.
///
/// Every error is fatal for the [`Client`][crate::Client] that produced it.
/// "Would block" is not an error, see [`Step::WouldBlock`][crate::Step].
#[derive(Debug, Error)]
pub enum Error {
    #[error("Unexpected message: {0}")]
    UnexpectedMessage(String),

    #[error("Decode error: {0}")]
    DecodeError(String),

    #[error("Illegal parameter: {0}")]
    IllegalParameter(String),

    #[error("Unsupported protocol version: {0:?}")]
    UnsupportedVersion(ProtocolVersion),

    #[error("Cipher suite not offered: {0:?}")]
    UnsupportedCipherSuite(CipherSuite),

    #[error("Unsolicited extension: {0:?}")]
    UnsupportedExtension(ExtensionType),

    #[error("Handshake failure: {0}")]
    HandshakeFailure(String),

    #[error("Finished verify data mismatch")]
    BadFinished,

    #[error("Peer sent fatal alert: {0:?}")]
    AlertReceived(AlertDescription),

    #[error("Connection closed by peer")]
    ConnectionClosed,

    #[error("Receive queue full")]
    ReceiveQueueFull,

    #[error("Timeout: {0}")]
    Timeout(&'static str),

    #[error("Crypto error: {0}")]
    CryptoError(String),

    #[error("Certificate error: {0}")]
    CertificateError(String),

    #[error("Transport error: {0}")]
    Io(#[from] io::Error),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Connection failed earlier and cannot be reused")]
    Poisoned,

    #[error("Invalid state: {0}")]
    InvalidState(&'static str),
}

/// Coarse grouping of [`Error`] variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The peer violated the protocol, or sent an alert.
    Protocol,
    /// Retransmissions were exhausted without a response.
    Timeout,
    /// A crypto provider or certificate verifier refused.
    Collaborator,
    /// The transport failed with a non-retriable error.
    Transport,
    /// The API was misused.
    Usage,
}

impl Error {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::UnexpectedMessage(_)
            | Error::DecodeError(_)
            | Error::IllegalParameter(_)
            | Error::UnsupportedVersion(_)
            | Error::UnsupportedCipherSuite(_)
            | Error::UnsupportedExtension(_)
            | Error::HandshakeFailure(_)
            | Error::BadFinished
            | Error::AlertReceived(_)
            | Error::ConnectionClosed
            | Error::ReceiveQueueFull => ErrorCategory::Protocol,
            Error::Timeout(_) => ErrorCategory::Timeout,
            Error::CryptoError(_) | Error::CertificateError(_) => ErrorCategory::Collaborator,
            Error::Io(_) => ErrorCategory::Transport,
            Error::ConfigError(_) | Error::Poisoned | Error::InvalidState(_) => {
                ErrorCategory::Usage
            }
        }
    }

    /// The alert we send to the peer when failing with this error.
    ///
    /// `None` when the peer should not be told, or can't be.
    pub(crate) fn alert(&self) -> Option<AlertDescription> {
        let desc = match self {
            Error::UnexpectedMessage(_) => AlertDescription::UnexpectedMessage,
            Error::DecodeError(_) => AlertDescription::DecodeError,
            Error::IllegalParameter(_) | Error::UnsupportedCipherSuite(_) => {
                AlertDescription::IllegalParameter
            }
            Error::UnsupportedVersion(_) => AlertDescription::ProtocolVersion,
            Error::UnsupportedExtension(_) => AlertDescription::UnsupportedExtension,
            Error::HandshakeFailure(_) => AlertDescription::HandshakeFailure,
            Error::BadFinished => AlertDescription::DecryptError,
            Error::CertificateError(_) => AlertDescription::BadCertificate,
            Error::CryptoError(_) | Error::ReceiveQueueFull => AlertDescription::InternalError,
            _ => return None,
        };
        Some(desc)
    }
}

impl<'a> From<nom::Err<nom::error::Error<&'a [u8]>>> for Error {
    fn from(value: nom::Err<nom::error::Error<&'a [u8]>>) -> Self {
        match value {
            nom::Err::Incomplete(_) => Error::DecodeError("incomplete".to_string()),
            nom::Err::Error(e) | nom::Err::Failure(e) => {
                Error::DecodeError(format!("{:?} ({} bytes left)", e.code, e.input.len()))
            }
        }
    }
}
