use std::fmt;

use nom::bytes::complete::take;
use nom::error::{Error, ErrorKind};
use nom::number::complete::{be_u16, be_u8};
use nom::{Err, IResult};

use super::{ProtocolVersion, Variant};
use crate::util::be_u48;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentType {
    ChangeCipherSpec,
    Alert,
    #[default]
    Handshake,
    ApplicationData,
    Unknown(u8),
}

impl ContentType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            20 => ContentType::ChangeCipherSpec,
            21 => ContentType::Alert,
            22 => ContentType::Handshake,
            23 => ContentType::ApplicationData,
            _ => ContentType::Unknown(value),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            ContentType::ChangeCipherSpec => 20,
            ContentType::Alert => 21,
            ContentType::Handshake => 22,
            ContentType::ApplicationData => 23,
            ContentType::Unknown(value) => *value,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], ContentType> {
        let (input, byte) = be_u8(input)?;
        Ok((input, Self::from_u8(byte)))
    }
}

/// DTLS epoch and 48 bit sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Sequence {
    pub epoch: u16,
    pub sequence_number: u64,
}

impl Sequence {
    pub fn new(epoch: u16) -> Self {
        Self {
            epoch,
            sequence_number: 0,
        }
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[epoch: {}, sequence_number: {}]", self.epoch, self.sequence_number)
    }
}

/// A plaintext record. Protection is the transport's business.
#[derive(PartialEq, Eq)]
pub struct Record<'a> {
    pub content_type: ContentType,
    pub version: ProtocolVersion,
    /// Always zero for TLS, which has implicit sequence numbers.
    pub sequence: Sequence,
    pub fragment: &'a [u8],
}

impl<'a> Record<'a> {
    pub const DTLS_HEADER_LEN: usize = 13;
    pub const TLS_HEADER_LEN: usize = 5;

    /// Largest fragment we accept. RFC 5246 allows 2^14 plaintext plus
    /// 2048 bytes of expansion.
    pub const MAX_FRAGMENT_LEN: usize = 16_384 + 2048;

    pub fn header_len(variant: Variant) -> usize {
        match variant {
            Variant::Tls => Self::TLS_HEADER_LEN,
            Variant::Dtls => Self::DTLS_HEADER_LEN,
        }
    }

    pub fn parse(input: &'a [u8], variant: Variant) -> IResult<&'a [u8], Record<'a>> {
        let (input, content_type) = ContentType::parse(input)?;
        let (input, version) = ProtocolVersion::parse(input)?;

        if version.variant() != Some(variant) {
            return Err(Err::Failure(Error::new(input, ErrorKind::Tag)));
        }

        let (input, sequence) = match variant {
            Variant::Tls => (input, Sequence::default()),
            Variant::Dtls => {
                let (input, epoch) = be_u16(input)?;
                let (input, sequence_number) = be_u48(input)?;
                (
                    input,
                    Sequence {
                        epoch,
                        sequence_number,
                    },
                )
            }
        };

        let (input, length) = be_u16(input)?;
        if length as usize > Self::MAX_FRAGMENT_LEN {
            return Err(Err::Failure(Error::new(input, ErrorKind::TooLarge)));
        }

        let (input, fragment) = take(length as usize)(input)?;

        Ok((
            input,
            Record {
                content_type,
                version,
                sequence,
                fragment,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Vec<u8>, variant: Variant) {
        output.push(self.content_type.as_u8());
        self.version.serialize(output);
        if variant == Variant::Dtls {
            output.extend_from_slice(&self.sequence.epoch.to_be_bytes());
            output.extend_from_slice(&self.sequence.sequence_number.to_be_bytes()[2..]);
        }
        output.extend_from_slice(&(self.fragment.len() as u16).to_be_bytes());
        output.extend_from_slice(self.fragment);
    }

    /// For a stream, the full length of the record at the start of `input`
    /// once its header is available.
    pub fn peek_len(input: &[u8]) -> Option<usize> {
        if input.len() < Self::TLS_HEADER_LEN {
            return None;
        }
        let len = u16::from_be_bytes([input[3], input[4]]) as usize;
        Some(Self::TLS_HEADER_LEN + len)
    }
}

impl fmt::Debug for Record<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("content_type", &self.content_type)
            .field("version", &self.version)
            .field("sequence", &self.sequence)
            .field("length", &self.fragment.len())
            .finish()
    }
}
