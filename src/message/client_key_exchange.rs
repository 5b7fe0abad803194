use nom::bytes::complete::take;
use nom::error::{Error, ErrorKind};
use nom::number::complete::be_u8;
use nom::{Err, IResult};

/// ClientKeyExchange carrying an explicit ECDH public point.
#[derive(Debug, PartialEq, Eq)]
pub struct ClientKeyExchange<'a> {
    pub public_key: &'a [u8],
}

impl<'a> ClientKeyExchange<'a> {
    pub fn new(public_key: &'a [u8]) -> Self {
        ClientKeyExchange { public_key }
    }

    pub fn parse(input: &'a [u8]) -> IResult<&'a [u8], ClientKeyExchange<'a>> {
        let (input, len) = be_u8(input)?;
        if len == 0 {
            return Err(Err::Failure(Error::new(input, ErrorKind::LengthValue)));
        }
        let (input, public_key) = take(len as usize)(input)?;
        Ok((input, ClientKeyExchange { public_key }))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        output.push(self.public_key.len() as u8);
        output.extend_from_slice(self.public_key);
    }
}
