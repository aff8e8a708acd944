//! Header Decoders and Schemas
//!
//! Turns raw packets into [`PacketDescriptor`]s for the ruler, and exposes
//! the field layout of each supported header so provisioned rules can be
//! checked against it.
//!
//! Supported headers: IPv6 (RFC 8200, fixed header only) and UDP.

use pnet::packet::ipv6::Ipv6Packet;
use pnet::packet::udp::UdpPacket;
use std::str::FromStr;

use crate::error::{Result, SchcError};
use crate::packet::{Direction, FieldDescriptor, HeaderDescriptor, PacketDescriptor, split_qualified_id};
use crate::value::Value;

pub const IPV6_HEADER_ID: &str = "IPv6";
pub const UDP_HEADER_ID: &str = "UDP";

const IPV6_HEADER_BITS: usize = 320;
const UDP_HEADER_BITS: usize = 64;
const NEXT_HEADER_UDP: u8 = 17;

/// Field name and length in bits, in wire order
pub type HeaderSchema = &'static [(&'static str, usize)];

const IPV6_SCHEMA: HeaderSchema = &[
    ("Version", 4),
    ("Traffic Class", 8),
    ("Flow Label", 20),
    ("Payload Length", 16),
    ("Next Header", 8),
    ("Hop Limit", 8),
    ("Source Address", 128),
    ("Destination Address", 128),
];

const UDP_SCHEMA: HeaderSchema = &[
    ("Source Port", 16),
    ("Destination Port", 16),
    ("Length", 16),
    ("Checksum", 16),
];

/// Field layout of a known header.
pub fn schema(header_id: &str) -> Option<HeaderSchema> {
    match header_id {
        IPV6_HEADER_ID => Some(IPV6_SCHEMA),
        UDP_HEADER_ID => Some(UDP_SCHEMA),
        _ => None,
    }
}

/// Wire-order index of a qualified field id inside its header schema.
pub fn schema_index(field_id: &str) -> Option<usize> {
    let (header, name) = split_qualified_id(field_id)?;
    schema(header)?.iter().position(|(n, _)| *n == name)
}

/// Default length in bits of a qualified field id, if the header is known.
pub fn field_length(field_id: &str) -> Option<usize> {
    let (header, name) = split_qualified_id(field_id)?;
    schema(header)?
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, length)| *length)
}

// =============================================================================
// Link Layer Configuration
// =============================================================================

/// Link layer type for packet decoding
///
/// Specifies how much of the packet prefix to skip before the IP header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkLayer {
    /// No link layer header (raw IP packets)
    None,
    /// Standard Ethernet header (14 bytes: 6 dst + 6 src + 2 ethertype)
    #[default]
    Ethernet,
    /// Custom link layer with specified header length in bytes
    Custom(usize),
}

impl LinkLayer {
    pub fn header_len(&self) -> usize {
        match self {
            LinkLayer::None => 0,
            LinkLayer::Ethernet => 14,
            LinkLayer::Custom(len) => *len,
        }
    }
}

impl FromStr for LinkLayer {
    type Err = SchcError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" | "raw" => Ok(LinkLayer::None),
            "ethernet" | "eth" => Ok(LinkLayer::Ethernet),
            other => other.parse::<usize>().map(LinkLayer::Custom).map_err(|_| {
                SchcError::PacketParse(format!("unknown link layer '{}'", s))
            }),
        }
    }
}

// =============================================================================
// Decoders
// =============================================================================

/// Decode a raw packet into a packet descriptor.
///
/// Skips the link layer, decodes the IPv6 header, then UDP when the next
/// header says so. Anything past the last known header is payload and is
/// not described.
pub fn decode(raw: &[u8], direction: Direction, link_layer: LinkLayer) -> Result<PacketDescriptor> {
    let ip_start = link_layer.header_len();
    if raw.len() <= ip_start {
        return Err(SchcError::PacketParse(format!(
            "packet of {} bytes has no room after a {}-byte link layer",
            raw.len(),
            ip_start
        )));
    }
    let ip_data = &raw[ip_start..];

    let ipv6 = parse_ipv6(ip_data)?;
    let next_header = ipv6
        .fields
        .iter()
        .find(|f| f.id == "Next Header")
        .and_then(|f| f.value.as_integer());

    let mut headers = vec![ipv6];

    if next_header == Some(NEXT_HEADER_UDP as u64) {
        headers.push(parse_udp(&ip_data[IPV6_HEADER_BITS / 8..])?);
    }

    Ok(PacketDescriptor::new(direction, headers))
}

/// Decode the fixed IPv6 header.
///
/// ```text
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |Version| Traffic Class |           Flow Label                  |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |         Payload Length        |  Next Header  |   Hop Limit   |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                       Source Address (128)                    |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                    Destination Address (128)                  |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
pub fn parse_ipv6(data: &[u8]) -> Result<HeaderDescriptor> {
    let ipv6 = Ipv6Packet::new(data).ok_or_else(|| {
        SchcError::PacketParse(format!(
            "length too short: {} < {}",
            data.len() * 8,
            IPV6_HEADER_BITS
        ))
    })?;

    if ipv6.get_version() != 6 {
        return Err(SchcError::PacketParse(format!(
            "version mismatch: {} != 6",
            ipv6.get_version()
        )));
    }

    let values = [
        Value::Integer(ipv6.get_version() as u64),
        Value::Integer(ipv6.get_traffic_class() as u64),
        Value::Integer(ipv6.get_flow_label() as u64),
        Value::Integer(ipv6.get_payload_length() as u64),
        Value::Integer(ipv6.get_next_header().0 as u64),
        Value::Integer(ipv6.get_hop_limit() as u64),
        Value::Bytes(ipv6.get_source().octets().to_vec()),
        Value::Bytes(ipv6.get_destination().octets().to_vec()),
    ];

    Ok(build_header(IPV6_HEADER_ID, IPV6_HEADER_BITS, IPV6_SCHEMA, values))
}

pub fn parse_udp(data: &[u8]) -> Result<HeaderDescriptor> {
    let udp = UdpPacket::new(data).ok_or_else(|| {
        SchcError::PacketParse(format!(
            "UDP length too short: {} < {}",
            data.len() * 8,
            UDP_HEADER_BITS
        ))
    })?;

    let values = [
        Value::Integer(udp.get_source() as u64),
        Value::Integer(udp.get_destination() as u64),
        Value::Integer(udp.get_length() as u64),
        Value::Integer(udp.get_checksum() as u64),
    ];

    Ok(build_header(UDP_HEADER_ID, UDP_HEADER_BITS, UDP_SCHEMA, values))
}

fn build_header(
    id: &str,
    length: usize,
    schema: HeaderSchema,
    values: impl IntoIterator<Item = Value>,
) -> HeaderDescriptor {
    let fields = schema
        .iter()
        .zip(values)
        .map(|((name, bits), value)| FieldDescriptor::new(*name, *bits, 1, value))
        .collect();
    HeaderDescriptor::new(id, length, fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ipv6_udp_packet() -> Vec<u8> {
        let mut packet = Vec::with_capacity(48);
        packet.extend_from_slice(&[
            0x61, 0x2A, 0xBC, 0xDE, // Version 6, TC 0x12, Flow Label 0xABCDE
            0x00, 0x08, // Payload Length 8
            0x11, // Next Header UDP
            0x40, // Hop Limit 64
        ]);
        // Source: 2001:db8::1
        packet.extend_from_slice(&[0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x01]);
        // Destination: 2001:db8::2
        packet.extend_from_slice(&[0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0x02]);
        packet.extend_from_slice(&[
            0x16, 0x33, // Src Port 5683
            0x16, 0x34, // Dst Port 5684
            0x00, 0x08, // Length
            0xBE, 0xEF, // Checksum
        ]);
        packet
    }

    fn value_of<'a>(header: &'a HeaderDescriptor, name: &str) -> &'a Value {
        &header.fields.iter().find(|f| f.id == name).unwrap().value
    }

    #[test]
    fn test_parse_ipv6_fields() {
        let header = parse_ipv6(&ipv6_udp_packet()).unwrap();
        assert_eq!(header.id, "IPv6");
        assert_eq!(header.length, 320);
        assert_eq!(header.fields.len(), 8);

        assert_eq!(value_of(&header, "Version"), &Value::Integer(6));
        assert_eq!(value_of(&header, "Traffic Class"), &Value::Integer(0x12));
        assert_eq!(value_of(&header, "Flow Label"), &Value::Integer(0xABCDE));
        assert_eq!(value_of(&header, "Payload Length"), &Value::Integer(8));
        assert_eq!(value_of(&header, "Next Header"), &Value::Integer(17));
        assert_eq!(value_of(&header, "Hop Limit"), &Value::Integer(64));

        match value_of(&header, "Destination Address") {
            Value::Bytes(bytes) => assert_eq!(bytes[15], 0x02),
            other => panic!("unexpected {:?}", other),
        }

        let lengths: Vec<usize> = header.fields.iter().map(|f| f.length).collect();
        assert_eq!(lengths, vec![4, 8, 20, 16, 8, 8, 128, 128]);
    }

    #[test]
    fn test_parse_ipv6_too_short() {
        let result = parse_ipv6(&[0x60; 39]);
        assert!(matches!(result, Err(SchcError::PacketParse(_))));
    }

    #[test]
    fn test_parse_ipv6_version_mismatch() {
        let mut packet = ipv6_udp_packet();
        packet[0] = 0x45;
        let err = parse_ipv6(&packet).unwrap_err();
        assert!(err.to_string().contains("version mismatch"));
    }

    #[test]
    fn test_parse_udp_fields() {
        let header = parse_udp(&ipv6_udp_packet()[40..]).unwrap();
        assert_eq!(header.id, "UDP");
        assert_eq!(value_of(&header, "Source Port"), &Value::Integer(5683));
        assert_eq!(value_of(&header, "Destination Port"), &Value::Integer(5684));
        assert_eq!(value_of(&header, "Checksum"), &Value::Integer(0xBEEF));
    }

    #[test]
    fn test_decode_raw_ipv6_udp() {
        let packet = decode(&ipv6_udp_packet(), Direction::Up, LinkLayer::None).unwrap();
        assert_eq!(packet.direction, Direction::Up);
        assert_eq!(packet.headers.len(), 2);
        assert_eq!(packet.flatten().len(), 12);
    }

    #[test]
    fn test_decode_skips_ethernet() {
        let mut frame = vec![0u8; 12];
        frame.extend_from_slice(&[0x86, 0xDD]);
        frame.extend(ipv6_udp_packet());
        let packet = decode(&frame, Direction::Down, LinkLayer::Ethernet).unwrap();
        assert_eq!(packet.headers[0].id, "IPv6");
        assert_eq!(packet.headers[1].id, "UDP");
    }

    #[test]
    fn test_decode_non_udp_stops_after_ipv6() {
        let mut packet = ipv6_udp_packet();
        packet[6] = 58; // ICMPv6
        let decoded = decode(&packet, Direction::Up, LinkLayer::None).unwrap();
        assert_eq!(decoded.headers.len(), 1);
    }

    #[test]
    fn test_decode_truncated_udp_error() {
        let packet = &ipv6_udp_packet()[..44];
        assert!(decode(packet, Direction::Up, LinkLayer::None).is_err());
    }

    #[test]
    fn test_decode_empty_after_link_layer() {
        assert!(decode(&[0u8; 14], Direction::Up, LinkLayer::Ethernet).is_err());
    }

    #[test]
    fn test_schema_lookup() {
        assert_eq!(field_length("IPv6:Flow Label"), Some(20));
        assert_eq!(field_length("UDP:Checksum"), Some(16));
        assert_eq!(field_length("CoAP:Token"), None);
        assert_eq!(field_length("IPv6:Bogus"), None);
        assert_eq!(schema_index("IPv6:Hop Limit"), Some(5));
        assert_eq!(schema_index("UDP:Source Port"), Some(0));
    }

    #[test]
    fn test_link_layer_from_str() {
        assert_eq!("none".parse::<LinkLayer>().unwrap(), LinkLayer::None);
        assert_eq!("Ethernet".parse::<LinkLayer>().unwrap(), LinkLayer::Ethernet);
        assert_eq!("4".parse::<LinkLayer>().unwrap(), LinkLayer::Custom(4));
        assert!("token-ring".parse::<LinkLayer>().is_err());
    }
}
