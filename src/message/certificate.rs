use nom::bytes::complete::take;
use nom::error::{Error, ErrorKind};
use nom::number::complete::be_u24;
use nom::{Err, IResult};

use super::put_u24;
use crate::util::many0_vec;

/// Longest chain we accept from a peer.
const MAX_CHAIN_LEN: usize = 16;

/// A chain of DER certificates, end entity first.
#[derive(Debug, PartialEq, Eq, Default)]
pub struct Certificate<'a> {
    pub certificate_list: Vec<&'a [u8]>,
}

impl<'a> Certificate<'a> {
    pub fn new(certificate_list: Vec<&'a [u8]>) -> Self {
        Certificate { certificate_list }
    }

    pub fn parse(input: &'a [u8]) -> IResult<&'a [u8], Certificate<'a>> {
        let (input, total_len) = be_u24(input)?;
        let (input, certs_data) = take(total_len as usize)(input)?;

        let (rest, certificate_list) = many0_vec(MAX_CHAIN_LEN, parse_cert)(certs_data)?;
        if !rest.is_empty() {
            return Err(Err::Failure(Error::new(rest, ErrorKind::LengthValue)));
        }

        Ok((input, Certificate { certificate_list }))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        let total: usize = self.certificate_list.iter().map(|c| 3 + c.len()).sum();
        put_u24(output, total as u32);
        for cert in &self.certificate_list {
            put_u24(output, cert.len() as u32);
            output.extend_from_slice(cert);
        }
    }
}

fn parse_cert(input: &[u8]) -> IResult<&[u8], &[u8]> {
    let (input, len) = be_u24(input)?;
    take(len as usize)(input)
}
