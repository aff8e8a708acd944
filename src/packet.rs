//! Packet descriptors
//!
//! A decoded packet as the matcher sees it: a direction plus an ordered list
//! of headers, each an ordered list of fields. Descriptors are built per
//! packet by a decoder (see [`crate::protocol`]) and consumed once.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::value::Value;

// =============================================================================
// Direction
// =============================================================================

/// Packet direction, also used as the direction indicator of rule fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// DEV -> APP
    #[serde(rename = "Up")]
    Up,
    /// APP -> DEV
    #[serde(rename = "Dw", alias = "Down")]
    Down,
    #[serde(rename = "Bi", alias = "Bidirectional")]
    Bidirectional,
}

impl Direction {
    /// Whether a rule field declared with `self` applies to a packet
    /// travelling in `packet_direction`.
    pub fn applies_to(self, packet_direction: Direction) -> bool {
        self == packet_direction || self == Direction::Bidirectional
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Up => "Up",
            Direction::Down => "Dw",
            Direction::Bidirectional => "Bi",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Descriptors
// =============================================================================

/// One observed field of a real packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub id: String,
    /// Length in bits
    pub length: usize,
    pub position: usize,
    pub value: Value,
}

impl FieldDescriptor {
    pub fn new(id: impl Into<String>, length: usize, position: usize, value: impl Into<Value>) -> Self {
        Self {
            id: id.into(),
            length,
            position,
            value: value.into(),
        }
    }
}

/// The fields of one protocol header, in wire order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderDescriptor {
    pub id: String,
    /// Total header length in bits
    pub length: usize,
    pub fields: Vec<FieldDescriptor>,
}

impl HeaderDescriptor {
    pub fn new(id: impl Into<String>, length: usize, fields: Vec<FieldDescriptor>) -> Self {
        Self {
            id: id.into(),
            length,
            fields,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketDescriptor {
    pub direction: Direction,
    pub headers: Vec<HeaderDescriptor>,
}

impl PacketDescriptor {
    pub fn new(direction: Direction, headers: Vec<HeaderDescriptor>) -> Self {
        Self { direction, headers }
    }

    /// Flatten every header into one field sequence, qualifying each field id
    /// as `"{header_id}:{field_id}"`. Order is preserved.
    pub fn flatten(&self) -> Vec<FieldDescriptor> {
        self.headers
            .iter()
            .flat_map(|header| {
                header.fields.iter().map(move |field| FieldDescriptor {
                    id: qualified_id(&header.id, &field.id),
                    length: field.length,
                    position: field.position,
                    value: field.value.clone(),
                })
            })
            .collect()
    }
}

pub fn qualified_id(header_id: &str, field_id: &str) -> String {
    format!("{}:{}", header_id, field_id)
}

/// Split a qualified `"header:field"` id. The header part never contains `:`.
pub fn split_qualified_id(id: &str) -> Option<(&str, &str)> {
    id.split_once(':')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_packet() -> PacketDescriptor {
        PacketDescriptor::new(
            Direction::Up,
            vec![
                HeaderDescriptor::new(
                    "IPv6",
                    12,
                    vec![
                        FieldDescriptor::new("Version", 4, 1, 6u64),
                        FieldDescriptor::new("Traffic Class", 8, 1, 0u64),
                    ],
                ),
                HeaderDescriptor::new(
                    "UDP",
                    16,
                    vec![FieldDescriptor::new("Source Port", 16, 1, 5683u64)],
                ),
            ],
        )
    }

    #[test]
    fn test_flatten_qualifies_ids_in_order() {
        let fields = sample_packet().flatten();
        let ids: Vec<&str> = fields.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["IPv6:Version", "IPv6:Traffic Class", "UDP:Source Port"]);
        assert_eq!(fields[2].value, Value::Integer(5683));
        assert_eq!(fields[0].length, 4);
    }

    #[test]
    fn test_flatten_does_not_mutate_headers() {
        let packet = sample_packet();
        let _ = packet.flatten();
        assert_eq!(packet.headers[0].fields[0].id, "Version");
        assert_eq!(packet.flatten().len(), 3);
    }

    #[test]
    fn test_direction_applies_to() {
        assert!(Direction::Up.applies_to(Direction::Up));
        assert!(!Direction::Up.applies_to(Direction::Down));
        assert!(Direction::Bidirectional.applies_to(Direction::Up));
        assert!(Direction::Bidirectional.applies_to(Direction::Down));
    }

    #[test]
    fn test_direction_serde_names() {
        assert_eq!(serde_json::to_string(&Direction::Down).unwrap(), "\"Dw\"");
        let d: Direction = serde_json::from_str("\"Bidirectional\"").unwrap();
        assert_eq!(d, Direction::Bidirectional);
        let d: Direction = serde_json::from_str("\"Bi\"").unwrap();
        assert_eq!(d, Direction::Bidirectional);
    }

    #[test]
    fn test_split_qualified_id() {
        assert_eq!(split_qualified_id("IPv6:Flow Label"), Some(("IPv6", "Flow Label")));
        assert_eq!(split_qualified_id("nocolon"), None);
    }
}
