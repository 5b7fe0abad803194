use nom::bytes::complete::take;
use nom::error::{Error, ErrorKind};
use nom::number::complete::be_u16;
use nom::{Err, IResult};
use tinyvec::ArrayVec;

use super::{CipherSuite, CompressionMethod, Extension, ExtensionType, ProtocolVersion};
use super::{Random, SessionId};
use crate::util::many0;

#[derive(Debug, PartialEq, Eq)]
pub struct ServerHello<'a> {
    pub server_version: ProtocolVersion,
    pub random: Random,
    pub session_id: SessionId,
    pub cipher_suite: CipherSuite,
    pub compression_method: CompressionMethod,
    pub extensions: ArrayVec<[Extension<'a>; 32]>,
}

impl<'a> ServerHello<'a> {
    pub fn parse(input: &'a [u8]) -> IResult<&'a [u8], ServerHello<'a>> {
        let (input, server_version) = ProtocolVersion::parse(input)?;
        let (input, random) = Random::parse(input)?;
        let (input, session_id) = SessionId::parse(input)?;
        let (input, cipher_suite) = CipherSuite::parse(input)?;
        let (input, compression_method) = CompressionMethod::parse(input)?;

        // Extensions are optional in a ServerHello.
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
            ServerHello {
                server_version,
                random,
                session_id,
                cipher_suite,
                compression_method,
                extensions,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        self.server_version.serialize(output);
        self.random.serialize(output);
        self.session_id.serialize(output);
        output.extend_from_slice(&self.cipher_suite.as_u16().to_be_bytes());
        output.push(self.compression_method.as_u8());
        if !self.extensions.is_empty() {
            Extension::serialize_all(&self.extensions, output);
        }
    }

    pub fn find_extension(&self, t: ExtensionType) -> Option<&Extension<'a>> {
        self.extensions.iter().find(|e| e.extension_type == t)
    }
}
