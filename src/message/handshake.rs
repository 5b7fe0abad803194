use nom::number::complete::{be_u16, be_u24, be_u8};
use nom::IResult;

use super::{put_u24, Variant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageType {
    HelloRequest,
    ClientHello,
    ServerHello,
    HelloVerifyRequest,
    NewSessionTicket,
    Certificate,
    ServerKeyExchange,
    CertificateRequest,
    ServerHelloDone,
    CertificateVerify,
    ClientKeyExchange,
    Finished,
    CertificateStatus,
    #[default]
    Unknown,
}

impl MessageType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => MessageType::HelloRequest,
            1 => MessageType::ClientHello,
            2 => MessageType::ServerHello,
            3 => MessageType::HelloVerifyRequest,
            4 => MessageType::NewSessionTicket,
            11 => MessageType::Certificate,
            12 => MessageType::ServerKeyExchange,
            13 => MessageType::CertificateRequest,
            14 => MessageType::ServerHelloDone,
            15 => MessageType::CertificateVerify,
            16 => MessageType::ClientKeyExchange,
            20 => MessageType::Finished,
            22 => MessageType::CertificateStatus,
            _ => MessageType::Unknown,
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            MessageType::HelloRequest => 0,
            MessageType::ClientHello => 1,
            MessageType::ServerHello => 2,
            MessageType::HelloVerifyRequest => 3,
            MessageType::NewSessionTicket => 4,
            MessageType::Certificate => 11,
            MessageType::ServerKeyExchange => 12,
            MessageType::CertificateRequest => 13,
            MessageType::ServerHelloDone => 14,
            MessageType::CertificateVerify => 15,
            MessageType::ClientKeyExchange => 16,
            MessageType::Finished => 20,
            MessageType::CertificateStatus => 22,
            MessageType::Unknown => 255,
        }
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], MessageType> {
        let (input, byte) = be_u8(input)?;
        Ok((input, Self::from_u8(byte)))
    }

    /// Last message of a server flight. Seeing it again means the server
    /// did not get our answer, so we resend without waiting for the timer.
    pub fn dupe_triggers_resend(&self) -> bool {
        matches!(
            self,
            MessageType::HelloVerifyRequest | MessageType::ServerHelloDone | MessageType::Finished
        )
    }
}

/// Handshake header. TLS has no sequence or fragment fields on the wire;
/// for TLS those are always a single unfragmented message.
#[derive(Debug, PartialEq, Eq, Default, Clone, Copy)]
pub struct Header {
    pub msg_type: MessageType,
    pub length: u32,
    pub message_seq: u16,
    pub fragment_offset: u32,
    pub fragment_length: u32,
}

impl Header {
    pub const DTLS_LEN: usize = 12;
    pub const TLS_LEN: usize = 4;

    pub fn len(variant: Variant) -> usize {
        match variant {
            Variant::Tls => Self::TLS_LEN,
            Variant::Dtls => Self::DTLS_LEN,
        }
    }

    pub fn parse(input: &[u8], variant: Variant) -> IResult<&[u8], Header> {
        let (input, msg_type) = MessageType::parse(input)?;
        let (input, length) = be_u24(input)?;

        if variant == Variant::Tls {
            let header = Header {
                msg_type,
                length,
                message_seq: 0,
                fragment_offset: 0,
                fragment_length: length,
            };
            return Ok((input, header));
        }

        let (input, message_seq) = be_u16(input)?;
        let (input, fragment_offset) = be_u24(input)?;
        let (input, fragment_length) = be_u24(input)?;

        Ok((
            input,
            Header {
                msg_type,
                length,
                message_seq,
                fragment_offset,
                fragment_length,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Vec<u8>, variant: Variant) {
        output.push(self.msg_type.as_u8());
        put_u24(output, self.length);
        if variant == Variant::Dtls {
            output.extend_from_slice(&self.message_seq.to_be_bytes());
            put_u24(output, self.fragment_offset);
            put_u24(output, self.fragment_length);
        }
    }

    pub fn is_fragment(&self) -> bool {
        self.fragment_offset > 0 || self.fragment_length < self.length
    }
}

/// A complete (reassembled) handshake message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub msg_type: MessageType,
    pub message_seq: u16,
    pub body: Vec<u8>,
}

impl Handshake {
    pub fn new(msg_type: MessageType, message_seq: u16, body: Vec<u8>) -> Self {
        Handshake {
            msg_type,
            message_seq,
            body,
        }
    }

    pub fn header(&self) -> Header {
        Header {
            msg_type: self.msg_type,
            length: self.body.len() as u32,
            message_seq: self.message_seq,
            fragment_offset: 0,
            fragment_length: self.body.len() as u32,
        }
    }

    /// Unfragmented wire form, which is also the transcript form.
    pub fn serialize(&self, output: &mut Vec<u8>, variant: Variant) {
        self.header().serialize(output, variant);
        output.extend_from_slice(&self.body);
    }
}
