//! # SCHC Ruler - Static Context Header Compression rule matching
//!
//! Selects which statically provisioned rule (RFC 8724) applies to a
//! decoded packet, using direction-aware, position-ordered field matching.
//!
//! ```
//! use schc_ruler::{Direction, FieldDescriptor, HeaderDescriptor, PacketDescriptor, RuleSet, RulerConfig};
//!
//! let rules = RuleSet::from_json(r#"[{
//!     "RuleID": 0,
//!     "Compression": [
//!         {"FID": "IPv6:Version", "FL": 4, "TV": 6, "MO": "equal", "CDA": "not-sent"}
//!     ]
//! }]"#)?;
//! let ruler = rules.into_ruler(RulerConfig::default())?;
//!
//! let packet = PacketDescriptor::new(
//!     Direction::Up,
//!     vec![HeaderDescriptor::new("IPv6", 4, vec![FieldDescriptor::new("Version", 4, 1, 6u64)])],
//! );
//! assert_eq!(ruler.match_packet(&packet)?.id, 0);
//! # Ok::<(), schc_ruler::SchcError>(())
//! ```

pub mod bit_buffer;
pub mod error;
pub mod packet;
pub mod rule;
pub mod value;

// Core functional modules
pub mod matcher;
pub mod ruler;

// Decoding and display
pub mod display;
pub mod protocol;

// Core error/result types
pub use error::{Result, SchcError};

pub use packet::{Direction, FieldDescriptor, HeaderDescriptor, PacketDescriptor};
pub use rule::{CompressionAction, MatchingOperator, RuleDescriptor, RuleFieldDescriptor, RuleSet};
pub use value::{FieldResidue, MatchMapping, Pattern, TargetValue, Value};

pub use matcher::{equal, field_match, ignore, match_mapping, most_significant_bits};
pub use ruler::{Ruler, RulerConfig, ScanMode};

pub use display::{display_rules, format_rule};
pub use protocol::{LinkLayer, decode};
