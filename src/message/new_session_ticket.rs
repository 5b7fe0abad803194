use nom::bytes::complete::take;
use nom::number::complete::{be_u16, be_u32};
use nom::IResult;

/// RFC 5077 NewSessionTicket. An empty ticket means the server
/// decided not to issue one after all.
#[derive(Debug, PartialEq, Eq)]
pub struct NewSessionTicket<'a> {
    pub lifetime_hint: u32,
    pub ticket: &'a [u8],
}

impl<'a> NewSessionTicket<'a> {
    pub fn new(lifetime_hint: u32, ticket: &'a [u8]) -> Self {
        NewSessionTicket {
            lifetime_hint,
            ticket,
        }
    }

    pub fn parse(input: &'a [u8]) -> IResult<&'a [u8], NewSessionTicket<'a>> {
        let (input, lifetime_hint) = be_u32(input)?;
        let (input, ticket_len) = be_u16(input)?;
        let (input, ticket) = take(ticket_len)(input)?;

        Ok((
            input,
            NewSessionTicket {
                lifetime_hint,
                ticket,
            },
        ))
    }

    pub fn serialize(&self, output: &mut Vec<u8>) {
        output.extend_from_slice(&self.lifetime_hint.to_be_bytes());
        output.extend_from_slice(&(self.ticket.len() as u16).to_be_bytes());
        output.extend_from_slice(self.ticket);
    }
}
