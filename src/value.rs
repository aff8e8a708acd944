//! Field values and rule target values
//!
//! A [`Value`] is what a decoded packet field carries. A rule field compares
//! against a [`TargetValue`], whose valid variant depends on the matching
//! operator declared alongside it.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::bit_buffer::BitBuffer;
use crate::error::{Result, SchcError};

// =============================================================================
// Value
// =============================================================================

/// Atomic unit compared by the matching operators.
///
/// Equality is variant-strict: `Integer(6)` never equals `Bytes(vec![6])`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Value {
    Integer(u64),
    Bytes(Vec<u8>),
}

impl Value {
    /// Bit view of this value over `length` bits.
    ///
    /// Integers contribute their low bits; byte strings are right-aligned.
    pub fn bits(&self, length: usize) -> BitBuffer {
        match self {
            Value::Integer(n) => BitBuffer::from_u64(*n, length),
            Value::Bytes(bytes) => BitBuffer::from_right_aligned(bytes, length),
        }
    }

    pub fn as_integer(&self) -> Option<u64> {
        match self {
            Value::Integer(n) => Some(*n),
            Value::Bytes(_) => None,
        }
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Integer(n)
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Value::Bytes(bytes)
    }
}

impl From<&[u8]> for Value {
    fn from(bytes: &[u8]) -> Self {
        Value::Bytes(bytes.to_vec())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{}", n),
            Value::Bytes(bytes) => write!(f, "0x{}", hex::encode(bytes)),
        }
    }
}

// =============================================================================
// Pattern
// =============================================================================

/// Prefix target for most-significant-bits matching.
///
/// `pattern` is right-aligned: `Pattern::new(vec![0b1010], 4)` is `1010`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    pub pattern: Vec<u8>,
    pub length: usize,
}

impl Pattern {
    pub fn new(pattern: Vec<u8>, length: usize) -> Self {
        Self { pattern, length }
    }

    /// The top `prefix_length` bits of `value` taken over `field_length` bits.
    pub fn from_value_prefix(value: &Value, field_length: usize, prefix_length: usize) -> Option<Self> {
        let pattern = value.bits(field_length).leading_bytes(prefix_length)?;
        Some(Self::new(pattern, prefix_length))
    }

    pub fn bits(&self) -> BitBuffer {
        BitBuffer::from_right_aligned(&self.pattern, self.length)
    }
}

// =============================================================================
// MatchMapping
// =============================================================================

/// Bidirectional mapping between values and `index_length`-bit indices.
///
/// The forward table (value -> index) is authoritative; the reverse table is
/// derived from it at construction and indices are unique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchMapping {
    index_length: usize,
    forward: HashMap<Value, u64>,
    reverse: BTreeMap<u64, Value>,
}

impl MatchMapping {
    /// Build from an explicit forward table.
    pub fn new(index_length: usize, forward: impl IntoIterator<Item = (Value, u64)>) -> Result<Self> {
        let mut forward_table = HashMap::new();
        let mut reverse = BTreeMap::new();

        for (value, index) in forward {
            if index_length < 64 && index >> index_length != 0 {
                return Err(SchcError::RuleValidation(format!(
                    "mapping index {} does not fit in {} bits",
                    index, index_length
                )));
            }
            if let Some(previous) = reverse.insert(index, value.clone()) {
                return Err(SchcError::RuleValidation(format!(
                    "mapping index {} assigned to both {} and {}",
                    index, previous, value
                )));
            }
            if forward_table.insert(value.clone(), index).is_some() {
                return Err(SchcError::RuleValidation(format!(
                    "mapping value {} listed twice",
                    value
                )));
            }
        }

        Ok(Self {
            index_length,
            forward: forward_table,
            reverse,
        })
    }

    /// Build from a list of values; each value's index is its position and
    /// the index width is the smallest that addresses every entry.
    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Result<Self> {
        let values: Vec<Value> = values.into_iter().collect();
        let index_length = index_width(values.len().saturating_sub(1) as u64);
        Self::new(index_length, values.into_iter().zip(0u64..))
    }

    pub fn index_length(&self) -> usize {
        self.index_length
    }

    pub fn contains(&self, value: &Value) -> bool {
        self.forward.contains_key(value)
    }

    /// Forward lookup: value -> index.
    pub fn index_of(&self, value: &Value) -> Option<u64> {
        self.forward.get(value).copied()
    }

    /// Reverse lookup: index -> value.
    pub fn value_at(&self, index: u64) -> Option<&Value> {
        self.reverse.get(&index)
    }

    /// Entries in index order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &Value)> {
        self.reverse.iter().map(|(index, value)| (*index, value))
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}

/// Bits needed to address indices `0..=max_index`.
pub(crate) fn index_width(max_index: u64) -> usize {
    (u64::BITS - max_index.leading_zeros()) as usize
}

// =============================================================================
// TargetValue
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetValue {
    Value(Value),
    Pattern(Pattern),
    MatchMapping(MatchMapping),
}

impl From<Value> for TargetValue {
    fn from(value: Value) -> Self {
        TargetValue::Value(value)
    }
}

impl From<Pattern> for TargetValue {
    fn from(pattern: Pattern) -> Self {
        TargetValue::Pattern(pattern)
    }
}

impl From<MatchMapping> for TargetValue {
    fn from(mapping: MatchMapping) -> Self {
        TargetValue::MatchMapping(mapping)
    }
}

// =============================================================================
// FieldResidue
// =============================================================================

/// Bits of a field left after compression, sent explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldResidue {
    /// Right-aligned residue bits.
    pub residue: Vec<u8>,
    pub length: usize,
}

impl FieldResidue {
    pub fn from_bits(bits: &BitBuffer) -> Self {
        Self {
            residue: bits.to_right_aligned(),
            length: bits.len(),
        }
    }

    pub fn bits(&self) -> BitBuffer {
        BitBuffer::from_right_aligned(&self.residue, self.length)
    }
}
