use nom::bytes::complete::take;
use nom::error::{Error, ErrorKind};
use nom::number::complete::{be_u16, be_u8};
use nom::{Err, IResult};
use tinyvec::ArrayVec;

use super::{CipherSuite, CompressionMethod, Cookie, Extension, ProtocolVersion};
use super::{Random, SessionId, Variant};
use crate::util::many0;

#[derive(Debug, PartialEq, Eq)]
pub struct ClientHello<'a> {
    pub client_version: ProtocolVersion,
    pub random: Random,
    pub session_id: SessionId,
    /// Only on the wire for DTLS.
    pub cookie: Cookie,
    pub cipher_suites: ArrayVec<[CipherSuite; 32]>,
    pub compression_methods: ArrayVec<[CompressionMethod; 4]>,
    pub extensions: ArrayVec<[Extension<'a>; 32]>,
}

impl<'a> ClientHello<'a> {
    pub fn parse(input: &'a [u8], variant: Variant) -> IResult<&'a [u8], ClientHello<'a>> {
        let (input, client_version) = ProtocolVersion::parse(input)?;
        let (input, random) = Random::parse(input)?;
        let (input, session_id) = SessionId::parse(input)?;

        let (input, cookie) = match variant {
            Variant::Dtls => Cookie::parse(input)?,
            Variant::Tls => (input, Cookie::empty()),
        };

        let (input, cipher_suites_len) = be_u16(input)?;
        if cipher_suites_len % 2 != 0 {
            return Err(Err::Failure(Error::new(input, ErrorKind::LengthValue)));
        }
        let (input, input_suites) = take(cipher_suites_len)(input)?;
        let (_, cipher_suites) = many0(CipherSuite::parse)(input_suites)?;

        let (input, compression_methods_len) = be_u8(input)?;
        let (input, input_methods) = take(compression_methods_len)(input)?;
        let (_, compression_methods) = many0(CompressionMethod::parse)(input_methods)?;

        let (input, extensions) = if input.is_empty() {
            (input, ArrayVec::default())
        } else {
            let (input, extensions_len) = be_u16(input)?;
            let (input, input_ext) = take(extensions_len)(input)?;
            let (rest, extensions) = many0(Extension::parse)(input_ext)?;
            if !rest.is_empty() {
                return Err(Err::Failure(Error::new(rest, ErrorKind::LengthValue)));
            }
            (input, extensions)
        };

        Ok((
            input,
            ClientHello {
                client_version,
                random,
                session_id,
                cookie,
                cipher_suites,
                compression_methods,
                extensions,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Vec<u8>, variant: Variant) {
        self.client_version.serialize(output);
        self.random.serialize(output);
        self.session_id.serialize(output);

        if variant == Variant::Dtls {
            self.cookie.serialize(output);
        }

        output.extend_from_slice(&((self.cipher_suites.len() * 2) as u16).to_be_bytes());
        for suite in &self.cipher_suites {
            output.extend_from_slice(&suite.as_u16().to_be_bytes());
        }

        output.push(self.compression_methods.len() as u8);
        for method in &self.compression_methods {
            output.push(method.as_u8());
        }

        if !self.extensions.is_empty() {
            Extension::serialize_all(&self.extensions, output);
        }
    }

    pub fn find_extension(&self, t: super::ExtensionType) -> Option<&Extension<'a>> {
        self.extensions.iter().find(|e| e.extension_type == t)
    }
}
