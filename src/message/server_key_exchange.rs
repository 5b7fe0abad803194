use nom::bytes::complete::take;
use nom::error::{Error, ErrorKind};
use nom::number::complete::be_u8;
use nom::{Err, IResult};

use super::{DigitallySigned, NamedGroup};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurveType {
    ExplicitPrime,
    ExplicitChar2,
    NamedCurve,
    Unknown(u8),
}

impl CurveType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => CurveType::ExplicitPrime,
            2 => CurveType::ExplicitChar2,
            3 => CurveType::NamedCurve,
            _ => CurveType::Unknown(value),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            CurveType::ExplicitPrime => 1,
            CurveType::ExplicitChar2 => 2,
            CurveType::NamedCurve => 3,
            CurveType::Unknown(value) => *value,
        }
    }
}

/// Signed ECDHE parameters from the server.
#[derive(Debug, PartialEq, Eq)]
pub struct ServerKeyExchange<'a> {
    pub group: NamedGroup,
    pub public_key: &'a [u8],
    /// The raw `ServerECDHParams` bytes, as covered by the signature.
    pub params: &'a [u8],
    pub signature: DigitallySigned,
}

impl<'a> ServerKeyExchange<'a> {
    pub fn parse(input: &'a [u8]) -> IResult<&'a [u8], ServerKeyExchange<'a>> {
        let original = input;

        let (input, curve_type) = be_u8(input)?;
        if CurveType::from_u8(curve_type) != CurveType::NamedCurve {
            return Err(Err::Failure(Error::new(input, ErrorKind::Tag)));
        }

        let (input, group) = NamedGroup::parse(input)?;
        let (input, public_key_len) = be_u8(input)?;
        if public_key_len == 0 {
            return Err(Err::Failure(Error::new(input, ErrorKind::LengthValue)));
        }
        let (input, public_key) = take(public_key_len as usize)(input)?;

        let params = &original[..original.len() - input.len()];

        let (input, signature) = DigitallySigned::parse(input)?;

        Ok((
            input,
            ServerKeyExchange {
                group,
                public_key,
                params,
                signature,
            },
        ))
    }

    /// Build the params block for a given group and point.
    pub fn encode_params(group: NamedGroup, public_key: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + public_key.len());
        out.push(CurveType::NamedCurve.as_u8());
        out.extend_from_slice(&group.as_u16().to_be_bytes());
        out.push(public_key.len() as u8);
        out.extend_from_slice(public_key);
        out
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        output.extend_from_slice(self.params);
        self.signature.serialize(output);
    }
}
