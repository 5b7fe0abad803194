use nom::bytes::complete::take;
use nom::IResult;

use crate::SeededRng;

/// The 32 byte hello random.
///
/// All bytes are random. The legacy gmt_unix_time prefix is not used to leak
/// the local clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Random(pub [u8; 32]);

impl Random {
    pub fn new(rng: &mut SeededRng) -> Self {
        let mut bytes = [0u8; 32];
        rng.fill(&mut bytes);
        Random(bytes)
    }

    pub fn parse(input: &[u8]) -> IResult<&[u8], Random> {
        let (input, data) = take(32_usize)(input)?;
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(data);
        Ok((input, Random(bytes)))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        output.extend_from_slice(&self.0);
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}
