//! ICMP echo packets (RFC 792, RFC 4443)

pub const ECHO_REQUEST_V4: u8 = 8;
pub const ECHO_REPLY_V4: u8 = 0;
pub const ECHO_REQUEST_V6: u8 = 128;
pub const ECHO_REPLY_V6: u8 = 129;

const HEADER_LEN: usize = 8;
const PAYLOAD: &[u8] = b"linkwatch-echo";

/// Build an echo request
///
/// The ICMPv6 checksum covers a pseudo-header only the kernel knows, so it
/// is left zero for the kernel to fill in.
pub fn echo_request(v6: bool, identifier: u16, sequence: u16) -> Vec<u8> {
    let mut packet = Vec::with_capacity(HEADER_LEN + PAYLOAD.len());
    packet.push(if v6 { ECHO_REQUEST_V6 } else { ECHO_REQUEST_V4 });
    packet.push(0);
    packet.extend_from_slice(&[0, 0]);
    packet.extend_from_slice(&identifier.to_be_bytes());
    packet.extend_from_slice(&sequence.to_be_bytes());
    packet.extend_from_slice(PAYLOAD);

    if !v6 {
        let checksum = checksum(&packet);
        packet[2..4].copy_from_slice(&checksum.to_be_bytes());
    }
    packet
}

/// Internet checksum (RFC 1071)
pub fn checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = data
        .chunks(2)
        .map(|pair| match *pair {
            [hi, lo] => u16::from_be_bytes([hi, lo]) as u32,
            [hi] => (hi as u32) << 8,
            _ => 0,
        })
        .sum();

    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

/// Echo reply header fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EchoReply {
    pub identifier: u16,
    pub sequence: u16,
}

/// Decode an echo reply, skipping an IPv4 header when present
///
/// Raw IPv4 sockets deliver the IP header, datagram sockets and all
/// ICMPv6 sockets do not. Anything other than an echo reply yields `None`.
pub fn parse_echo_reply(v6: bool, buf: &[u8]) -> Option<EchoReply> {
    let icmp = if !v6 && buf.first().is_some_and(|b| b >> 4 == 4) {
        let ihl = (buf[0] & 0x0f) as usize * 4;
        buf.get(ihl..)?
    } else {
        buf
    };

    if icmp.len() < HEADER_LEN {
        return None;
    }
    let expected = if v6 { ECHO_REPLY_V6 } else { ECHO_REPLY_V4 };
    if icmp[0] != expected {
        return None;
    }

    Some(EchoReply {
        identifier: u16::from_be_bytes([icmp[4], icmp[5]]),
        sequence: u16::from_be_bytes([icmp[6], icmp[7]]),
    })
}
