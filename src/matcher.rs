//! Field Matching Logic
//!
//! Provides the four matching operators (equal, ignore, MSB, match-mapping)
//! and the field matcher that dispatches a packet field to the operator
//! declared by a rule field.

use crate::bit_buffer::BitBuffer;
use crate::error::Result;
use crate::packet::FieldDescriptor;
use crate::rule::{MatchingOperator, RuleFieldDescriptor, target_mismatch};
use crate::value::{MatchMapping, TargetValue, Value};

// =============================================================================
// Matching Operators
// =============================================================================

/// Exact match of the field value against `target_value`.
///
/// Lengths are not compared here; that is the field matcher's job.
#[inline]
pub fn equal(field: &FieldDescriptor, target_value: &Value) -> bool {
    field.value == *target_value
}

/// Always matches.
#[inline]
pub fn ignore(_field: &FieldDescriptor) -> bool {
    true
}

/// Check if the leading `pattern_length` bits of the field equal the
/// right-aligned `pattern`.
///
/// Bits of the field past `pattern_length` never affect the result. A
/// `pattern_length` longer than the field or than the bits `pattern` holds
/// never matches.
#[inline]
pub fn most_significant_bits(field: &FieldDescriptor, pattern: &[u8], pattern_length: usize) -> bool {
    if pattern_length > field.length || pattern_length > pattern.len() * 8 {
        return false;
    }
    let field_bits = field.value.bits(field.length);
    let pattern_bits = BitBuffer::from_right_aligned(pattern, pattern_length);
    field_bits.leading_bits_eq(&pattern_bits, pattern_length)
}

/// Check if the field value is one of the mapping's values.
#[inline]
pub fn match_mapping(field: &FieldDescriptor, target_values: &MatchMapping) -> bool {
    target_values.contains(&field.value)
}

// =============================================================================
// Field Matcher
// =============================================================================

/// Check if a packet field satisfies a rule field.
///
/// Returns `Ok(false)` on any mismatch, including differing identifiers.
/// Only EQUAL and IGNORE compare lengths; MSB and match-mapping are bounded
/// by their own targets. A target value of the wrong variant for the
/// declared operator is a configuration error.
pub fn field_match(packet_field: &FieldDescriptor, rule_field: &RuleFieldDescriptor) -> Result<bool> {
    if packet_field.id != rule_field.id {
        return Ok(false);
    }

    let operator = rule_field.matching_operator;
    match (operator, &rule_field.target_value) {
        (MatchingOperator::Ignore, _) => {
            Ok(ignore(packet_field) && packet_field.length == rule_field.length)
        }
        (MatchingOperator::Equal, Some(TargetValue::Value(target))) => {
            Ok(packet_field.length == rule_field.length && equal(packet_field, target))
        }
        (MatchingOperator::Msb, Some(TargetValue::Pattern(pattern))) => Ok(most_significant_bits(
            packet_field,
            &pattern.pattern,
            pattern.length,
        )),
        (MatchingOperator::MatchMapping, Some(TargetValue::MatchMapping(mapping))) => {
            Ok(match_mapping(packet_field, mapping))
        }
        _ => Err(target_mismatch(&rule_field.id, operator)),
    }
}
