use nom::bytes::complete::take;
use nom::number::complete::be_u8;
use nom::IResult;

use super::ProtocolVersion;

/// DTLS stateless cookie challenge.
///
/// The cookie is kept borrowed so the caller can bound its length before
/// copying it anywhere.
#[derive(Debug, PartialEq, Eq)]
pub struct HelloVerifyRequest<'a> {
    pub server_version: ProtocolVersion,
    pub cookie: &'a [u8],
}

impl<'a> HelloVerifyRequest<'a> {
    pub fn new(server_version: ProtocolVersion, cookie: &'a [u8]) -> Self {
        HelloVerifyRequest {
            server_version,
            cookie,
        }
    }

    pub fn parse(input: &'a [u8]) -> IResult<&'a [u8], HelloVerifyRequest<'a>> {
        let (input, server_version) = ProtocolVersion::parse(input)?;
        let (input, cookie_len) = be_u8(input)?;
        let (input, cookie) = take(cookie_len as usize)(input)?;

        Ok((
            input,
            HelloVerifyRequest {
                server_version,
                cookie,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        self.server_version.serialize(output);
        output.push(self.cookie.len() as u8);
        output.extend_from_slice(self.cookie);
    }
}
