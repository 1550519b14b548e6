//! Minimal DNS message codec (RFC 1035)
//!
//! Just enough of the wire format to send one question and read back
//! A, AAAA, PTR and TXT answers, including compressed names.

use std::net::{Ipv4Addr, Ipv6Addr};
use thiserror::Error;

use linkwatch_core::ProbeError;

pub const TYPE_A: u16 = 1;
pub const TYPE_PTR: u16 = 12;
pub const TYPE_TXT: u16 = 16;
pub const TYPE_AAAA: u16 = 28;
pub const CLASS_IN: u16 = 1;

const HEADER_LEN: usize = 12;
const FLAG_QR: u16 = 0x8000;
const FLAG_TC: u16 = 0x0200;
const FLAG_RD: u16 = 0x0100;
const RCODE_MASK: u16 = 0x000f;

const MAX_LABEL_LEN: usize = 63;
const MAX_NAME_LEN: usize = 255;
const MAX_POINTER_JUMPS: usize = 32;

/// DNS wire format errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("message too short at offset {0}")]
    ShortMessage(usize),

    #[error("transaction ID mismatch: got {got}, expected {expected}")]
    IdMismatch { expected: u16, got: u16 },

    #[error("message is not a response")]
    NotAResponse,

    #[error("response truncated (TC bit set)")]
    Truncated,

    #[error("DNS error RCODE: {0}")]
    Rcode(u8),

    #[error("invalid name: {0}")]
    BadName(String),

    #[error("invalid record data: {0}")]
    BadRecord(String),
}

impl From<WireError> for ProbeError {
    fn from(err: WireError) -> Self {
        match err {
            WireError::Rcode(_) | WireError::Truncated => ProbeError::Network(err.to_string()),
            _ => ProbeError::Malformed(err.to_string()),
        }
    }
}

/// A single-question query with recursion desired
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub id: u16,
    pub name: String,
    pub qtype: u16,
}

impl Query {
    /// Create a query with a random transaction ID
    pub fn new(name: impl Into<String>, qtype: u16) -> Self {
        Self {
            id: rand::random(),
            name: name.into(),
            qtype,
        }
    }

    /// Encode the query message
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let mut packet = Vec::with_capacity(HEADER_LEN + self.name.len() + 6);
        packet.extend_from_slice(&self.id.to_be_bytes());
        packet.extend_from_slice(&FLAG_RD.to_be_bytes());
        packet.extend_from_slice(&1u16.to_be_bytes()); // QDCOUNT
        packet.extend_from_slice(&[0; 6]); // ANCOUNT, NSCOUNT, ARCOUNT

        encode_name(&self.name, &mut packet)?;
        packet.extend_from_slice(&self.qtype.to_be_bytes());
        packet.extend_from_slice(&CLASS_IN.to_be_bytes());

        Ok(packet)
    }
}

/// Append a name as length-prefixed labels
pub fn encode_name(name: &str, out: &mut Vec<u8>) -> Result<(), WireError> {
    let name = name.trim_end_matches('.');
    if name.len() + 2 > MAX_NAME_LEN {
        return Err(WireError::BadName(format!("{} is too long", name)));
    }

    if !name.is_empty() {
        for label in name.split('.') {
            if label.is_empty() || label.len() > MAX_LABEL_LEN {
                return Err(WireError::BadName(format!("bad label {:?} in {}", label, name)));
            }
            out.push(label.len() as u8);
            out.extend_from_slice(label.as_bytes());
        }
    }
    out.push(0);

    Ok(())
}

/// Decoded answer data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RData {
    A(Ipv4Addr),
    Aaaa(Ipv6Addr),
    Ptr(String),
    Txt(Vec<String>),
    Other { rtype: u16, len: usize },
}

/// One answer record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub name: String,
    pub rdata: RData,
}

/// Parse a response to the query with transaction ID `expected_id`
///
/// Returns the answer section. Authority and additional sections are ignored.
pub fn parse_response(buf: &[u8], expected_id: u16) -> Result<Vec<Record>, WireError> {
    let mut reader = Reader::new(buf, 0);

    let id = reader.u16()?;
    if id != expected_id {
        return Err(WireError::IdMismatch {
            expected: expected_id,
            got: id,
        });
    }

    let flags = reader.u16()?;
    if flags & FLAG_QR == 0 {
        return Err(WireError::NotAResponse);
    }
    if flags & FLAG_TC != 0 {
        return Err(WireError::Truncated);
    }
    let rcode = (flags & RCODE_MASK) as u8;
    if rcode != 0 {
        return Err(WireError::Rcode(rcode));
    }

    let qdcount = reader.u16()?;
    let ancount = reader.u16()?;
    reader.skip(4)?;

    for _ in 0..qdcount {
        reader.name()?;
        reader.skip(4)?;
    }

    let mut records = Vec::with_capacity(ancount as usize);
    for _ in 0..ancount {
        let name = reader.name()?;
        let rtype = reader.u16()?;
        let _class = reader.u16()?;
        let _ttl = reader.u32()?;
        let rdlen = reader.u16()? as usize;
        let rdata_start = reader.pos;
        let rdata = reader.take(rdlen)?;

        let rdata = match rtype {
            TYPE_A => {
                let octets: [u8; 4] = rdata.try_into().map_err(|_| {
                    WireError::BadRecord(format!("A record of {} bytes", rdlen))
                })?;
                RData::A(Ipv4Addr::from(octets))
            }
            TYPE_AAAA => {
                let octets: [u8; 16] = rdata.try_into().map_err(|_| {
                    WireError::BadRecord(format!("AAAA record of {} bytes", rdlen))
                })?;
                RData::Aaaa(Ipv6Addr::from(octets))
            }
            // PTR names may point back into the message
            TYPE_PTR => RData::Ptr(Reader::new(buf, rdata_start).name()?),
            TYPE_TXT => RData::Txt(decode_txt(rdata)?),
            rtype => RData::Other { rtype, len: rdlen },
        };

        records.push(Record { name, rdata });
    }

    Ok(records)
}

/// Split TXT rdata into its character-strings
fn decode_txt(mut rdata: &[u8]) -> Result<Vec<String>, WireError> {
    let mut strings = Vec::new();
    while let Some((&len, rest)) = rdata.split_first() {
        let len = len as usize;
        if rest.len() < len {
            return Err(WireError::BadRecord("TXT string overruns record".to_string()));
        }
        strings.push(String::from_utf8_lossy(&rest[..len]).into_owned());
        rdata = &rest[len..];
    }
    Ok(strings)
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8], pos: usize) -> Self {
        Self { buf, pos }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or(WireError::ShortMessage(self.pos))?;
        let bytes = &self.buf[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    fn skip(&mut self, n: usize) -> Result<(), WireError> {
        self.take(n).map(|_| ())
    }

    fn u16(&mut self) -> Result<u16, WireError> {
        let bytes = self.take(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn u32(&mut self) -> Result<u32, WireError> {
        let bytes = self.take(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read a possibly compressed name, leaving `pos` after its first encoding
    fn name(&mut self) -> Result<String, WireError> {
        let mut labels: Vec<String> = Vec::new();
        let mut pos = self.pos;
        let mut resume_at = None;
        let mut jumps = 0;
        let mut total_len = 0;

        loop {
            let len = *self.buf.get(pos).ok_or(WireError::ShortMessage(pos))?;
            match len & 0xc0 {
                0x00 if len == 0 => {
                    pos += 1;
                    break;
                }
                0x00 => {
                    let start = pos + 1;
                    let end = start + len as usize;
                    let label = self
                        .buf
                        .get(start..end)
                        .ok_or(WireError::ShortMessage(start))?;

                    total_len += label.len() + 1;
                    if total_len > MAX_NAME_LEN {
                        return Err(WireError::BadName("name too long".to_string()));
                    }
                    labels.push(String::from_utf8_lossy(label).into_owned());
                    pos = end;
                }
                0xc0 => {
                    let low = *self.buf.get(pos + 1).ok_or(WireError::ShortMessage(pos + 1))?;
                    jumps += 1;
                    if jumps > MAX_POINTER_JUMPS {
                        return Err(WireError::BadName("compression pointer loop".to_string()));
                    }
                    resume_at.get_or_insert(pos + 2);
                    pos = (((len & 0x3f) as usize) << 8) | low as usize;
                }
                _ => {
                    return Err(WireError::BadName(format!(
                        "unsupported label type {:#04x}",
                        len
                    )));
                }
            }
        }

        self.pos = resume_at.unwrap_or(pos);
        Ok(labels.join("."))
    }
}
