use nom::bytes::complete::take;
use nom::error::{Error, ErrorKind};
use nom::number::complete::{be_u24, be_u8};
use nom::{Err, IResult};

use super::put_u24;

const STATUS_TYPE_OCSP: u8 = 1;

/// Stapled OCSP response (RFC 6066, section 8).
#[derive(Debug, PartialEq, Eq)]
pub struct CertificateStatus<'a> {
    pub ocsp_response: &'a [u8],
}

impl<'a> CertificateStatus<'a> {
    pub fn new(ocsp_response: &'a [u8]) -> Self {
        CertificateStatus { ocsp_response }
    }

    pub fn parse(input: &'a [u8]) -> IResult<&'a [u8], CertificateStatus<'a>> {
        let (input, status_type) = be_u8(input)?;
        if status_type != STATUS_TYPE_OCSP {
            return Err(Err::Failure(Error::new(input, ErrorKind::Tag)));
        }

        let (input, len) = be_u24(input)?;
        if len == 0 {
            return Err(Err::Failure(Error::new(input, ErrorKind::LengthValue)));
        }
        let (input, ocsp_response) = take(len as usize)(input)?;

        Ok((input, CertificateStatus { ocsp_response }))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        output.push(STATUS_TYPE_OCSP);
        put_u24(output, self.ocsp_response.len() as u32);
        output.extend_from_slice(self.ocsp_response);
    }
}
