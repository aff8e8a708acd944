//! SCHC Rule structures and JSON provisioning

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;

use crate::error::{Result, SchcError};
use crate::packet::Direction;
use crate::protocol;
use crate::ruler::{Ruler, RulerConfig};
use crate::value::{self, MatchMapping, Pattern, TargetValue, Value};

// =============================================================================
// Operators and actions
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchingOperator {
    #[serde(rename = "equal")]
    Equal,
    #[serde(rename = "ignore")]
    Ignore,
    #[serde(rename = "MSB")]
    Msb,
    #[serde(rename = "match-mapping")]
    MatchMapping,
}

impl MatchingOperator {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchingOperator::Equal => "equal",
            MatchingOperator::Ignore => "ignore",
            MatchingOperator::Msb => "MSB",
            MatchingOperator::MatchMapping => "match-mapping",
        }
    }
}

/// Compression/Decompression Action, consumed by the compressor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CompressionAction {
    #[serde(rename = "not-sent")]
    NotSent,
    #[serde(rename = "LSB", alias = "least-significant-bits")]
    Lsb,
    #[serde(rename = "mapping-sent")]
    MappingSent,
    #[serde(rename = "value-sent")]
    ValueSent,
}

impl CompressionAction {
    pub fn as_str(self) -> &'static str {
        match self {
            CompressionAction::NotSent => "not-sent",
            CompressionAction::Lsb => "LSB",
            CompressionAction::MappingSent => "mapping-sent",
            CompressionAction::ValueSent => "value-sent",
        }
    }
}

// =============================================================================
// Rule descriptors
// =============================================================================

/// A rule's expectation for one field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleFieldDescriptor {
    /// Qualified `"header:field"` identifier
    pub id: String,
    /// Length in bits
    pub length: usize,
    pub position: usize,
    pub direction: Direction,
    pub target_value: Option<TargetValue>,
    pub matching_operator: MatchingOperator,
    pub compression_decompression_action: CompressionAction,
}

impl RuleFieldDescriptor {
    /// A bidirectional field at position 1 with no target value.
    pub fn new(
        id: impl Into<String>,
        length: usize,
        matching_operator: MatchingOperator,
        compression_decompression_action: CompressionAction,
    ) -> Self {
        Self {
            id: id.into(),
            length,
            position: 1,
            direction: Direction::Bidirectional,
            target_value: None,
            matching_operator,
            compression_decompression_action,
        }
    }

    pub fn with_target(mut self, target: impl Into<TargetValue>) -> Self {
        self.target_value = Some(target.into());
        self
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_position(mut self, position: usize) -> Self {
        self.position = position;
        self
    }

    /// Check that the target value variant agrees with the matching operator
    /// and that an MSB pattern fits inside the field.
    pub fn validate(&self) -> Result<()> {
        match (self.matching_operator, &self.target_value) {
            (MatchingOperator::Ignore, _) => Ok(()),
            (MatchingOperator::Equal, Some(TargetValue::Value(_))) => Ok(()),
            (MatchingOperator::MatchMapping, Some(TargetValue::MatchMapping(_))) => Ok(()),
            (MatchingOperator::Msb, Some(TargetValue::Pattern(pattern))) => {
                if pattern.length > self.length {
                    return Err(SchcError::RuleValidation(format!(
                        "Field {}: MSB pattern length ({}) exceeds field length ({} bits)",
                        self.id, pattern.length, self.length
                    )));
                }
                if pattern.length > pattern.pattern.len() * 8 {
                    return Err(SchcError::RuleValidation(format!(
                        "Field {}: MSB pattern holds {} bits, {} declared",
                        self.id,
                        pattern.pattern.len() * 8,
                        pattern.length
                    )));
                }
                Ok(())
            }
            (operator, _) => Err(target_mismatch(&self.id, operator)),
        }
    }
}

/// The configuration error raised when an operator meets the wrong target.
pub(crate) fn target_mismatch(field_id: &str, operator: MatchingOperator) -> SchcError {
    let expected = match operator {
        MatchingOperator::Equal | MatchingOperator::Ignore => "value",
        MatchingOperator::Msb => "pattern",
        MatchingOperator::MatchMapping => "match-mapping",
    };
    SchcError::TargetValueMismatch {
        field: field_id.to_string(),
        operator: operator.as_str(),
        expected,
    }
}

/// A compression rule: an id plus field descriptors in packet field order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleDescriptor {
    pub id: u32,
    pub comment: Option<String>,
    pub field_descriptors: Vec<RuleFieldDescriptor>,
}

impl RuleDescriptor {
    pub fn new(id: u32, field_descriptors: Vec<RuleFieldDescriptor>) -> Self {
        Self {
            id,
            comment: None,
            field_descriptors,
        }
    }

    /// Field descriptors that apply to a packet travelling in `direction`,
    /// in rule order.
    pub fn fields_for(&self, direction: Direction) -> impl Iterator<Item = &RuleFieldDescriptor> {
        self.field_descriptors
            .iter()
            .filter(move |f| f.direction.applies_to(direction))
    }
}

// =============================================================================
// JSON provisioning
// =============================================================================

#[derive(Debug, Deserialize)]
struct RawRule {
    #[serde(rename = "RuleID")]
    rule_id: u32,

    #[serde(rename = "RuleIDLength")]
    #[serde(default)]
    rule_id_length: Option<u8>,

    #[serde(rename = "Comment")]
    #[serde(default)]
    comment: Option<String>,

    #[serde(rename = "Compression")]
    #[serde(default)]
    compression: Vec<RawField>,
}

#[derive(Debug, Deserialize)]
struct RawField {
    #[serde(rename = "FID")]
    fid: String,

    #[serde(rename = "FL")]
    fl: Option<usize>,

    #[serde(rename = "FP")]
    #[serde(default = "default_position")]
    fp: usize,

    #[serde(rename = "DI")]
    #[serde(default = "default_direction")]
    di: Direction,

    #[serde(rename = "TV")]
    tv: Option<serde_json::Value>,

    #[serde(rename = "MO")]
    mo: MatchingOperator,

    #[serde(rename = "CDA")]
    cda: CompressionAction,

    #[serde(rename = "MO.val")]
    mo_val: Option<usize>,
}

fn default_position() -> usize {
    1
}

fn default_direction() -> Direction {
    Direction::Bidirectional
}

impl RawField {
    fn into_descriptor(self) -> Result<RuleFieldDescriptor> {
        let length = match self.fl.or_else(|| protocol::field_length(&self.fid)) {
            Some(length) => length,
            None => {
                return Err(SchcError::RuleValidation(format!(
                    "Field {}: no FL given and no known default length",
                    self.fid
                )));
            }
        };

        let target_value = parse_target_value(&self, length)?;

        Ok(RuleFieldDescriptor {
            id: self.fid,
            length,
            position: self.fp,
            direction: self.di,
            target_value,
            matching_operator: self.mo,
            compression_decompression_action: self.cda,
        })
    }
}

fn parse_target_value(field: &RawField, length: usize) -> Result<Option<TargetValue>> {
    let missing_tv = || {
        SchcError::RuleValidation(format!(
            "Field {}: MO {} requires a TV",
            field.fid,
            field.mo.as_str()
        ))
    };

    match field.mo {
        MatchingOperator::Ignore => match &field.tv {
            Some(tv) if !tv.is_array() && !tv.is_object() => {
                Ok(Some(TargetValue::Value(parse_single_value(tv, &field.fid)?)))
            }
            _ => Ok(None),
        },
        MatchingOperator::Equal => {
            let tv = field.tv.as_ref().ok_or_else(missing_tv)?;
            Ok(Some(TargetValue::Value(parse_single_value(tv, &field.fid)?)))
        }
        MatchingOperator::Msb => {
            let tv = field.tv.as_ref().ok_or_else(missing_tv)?;
            let mo_val = field.mo_val.ok_or_else(|| {
                SchcError::RuleValidation(format!("Field {}: MSB requires MO.val", field.fid))
            })?;
            if mo_val > length {
                return Err(SchcError::RuleValidation(format!(
                    "Field {}: MO.val ({}) exceeds field length ({} bits)",
                    field.fid, mo_val, length
                )));
            }
            let value = parse_single_value(tv, &field.fid)?;
            let pattern = Pattern::from_value_prefix(&value, length, mo_val).ok_or_else(|| {
                SchcError::RuleValidation(format!(
                    "Field {}: cannot take {} bits from TV",
                    field.fid, mo_val
                ))
            })?;
            Ok(Some(TargetValue::Pattern(pattern)))
        }
        MatchingOperator::MatchMapping => {
            let tv = field.tv.as_ref().ok_or_else(missing_tv)?;
            let mapping = parse_mapping(tv, &field.fid)?;
            Ok(Some(TargetValue::MatchMapping(mapping)))
        }
    }
}

fn parse_mapping(tv: &serde_json::Value, fid: &str) -> Result<MatchMapping> {
    match tv {
        serde_json::Value::Array(arr) => {
            let values = arr
                .iter()
                .map(|v| parse_single_value(v, fid))
                .collect::<Result<Vec<Value>>>()?;
            if values.is_empty() {
                return Err(SchcError::RuleValidation(format!(
                    "Field {}: match-mapping TV is empty",
                    fid
                )));
            }
            MatchMapping::from_values(values)
        }
        serde_json::Value::Object(obj) => {
            // Explicit indices: { "0": value, "3": value }
            let mut entries = BTreeMap::new();
            for (key, v) in obj {
                let index: u64 = key.parse().map_err(|_| {
                    SchcError::RuleValidation(format!(
                        "Field {}: mapping index '{}' is not an integer",
                        fid, key
                    ))
                })?;
                entries.insert(index, parse_single_value(v, fid)?);
            }
            let max_index = entries.keys().next_back().copied().ok_or_else(|| {
                SchcError::RuleValidation(format!("Field {}: match-mapping TV is empty", fid))
            })?;
            let index_length = value::index_width(max_index);
            MatchMapping::new(index_length, entries.into_iter().map(|(i, v)| (v, i)))
        }
        _ => Err(SchcError::RuleValidation(format!(
            "Field {}: match-mapping TV must be an array or object",
            fid
        ))),
    }
}

fn parse_single_value(tv: &serde_json::Value, fid: &str) -> Result<Value> {
    match tv {
        serde_json::Value::Number(n) => n.as_u64().map(Value::Integer).ok_or_else(|| {
            SchcError::RuleValidation(format!(
                "Field {}: TV {} is not an unsigned integer",
                fid, n
            ))
        }),
        serde_json::Value::String(s) => match s.strip_prefix("0x") {
            Some(digits) => hex::decode(digits).map(Value::Bytes).map_err(|e| {
                SchcError::RuleValidation(format!("Field {}: bad hex TV '{}': {}", fid, s, e))
            }),
            None => Ok(Value::Bytes(s.as_bytes().to_vec())),
        },
        other => Err(SchcError::RuleValidation(format!(
            "Field {}: unsupported TV {}",
            fid, other
        ))),
    }
}

/// Collection of provisioned rules, in provisioning order
#[derive(Debug, Clone)]
pub struct RuleSet {
    pub rules: Vec<RuleDescriptor>,
}

impl RuleSet {
    pub fn from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let raw_rules: Vec<RawRule> = serde_json::from_str(json)?;

        let mut seen = HashSet::new();
        let mut rules = Vec::with_capacity(raw_rules.len());

        for raw in raw_rules {
            if !seen.insert(raw.rule_id) {
                return Err(SchcError::RuleValidation(format!(
                    "Rule {} is defined more than once",
                    raw.rule_id
                )));
            }

            if let Some(id_length) = raw.rule_id_length {
                let max_rule_id = if id_length >= 32 { u32::MAX } else { (1u32 << id_length) - 1 };
                if raw.rule_id > max_rule_id {
                    log::warn!(
                        "Rule {} has ID that exceeds {}-bit range (max: {})",
                        raw.rule_id,
                        id_length,
                        max_rule_id
                    );
                }
            }

            let field_descriptors = raw
                .compression
                .into_iter()
                .map(RawField::into_descriptor)
                .collect::<Result<Vec<_>>>()?;

            rules.push(RuleDescriptor {
                id: raw.rule_id,
                comment: raw.comment,
                field_descriptors,
            });
        }

        log::info!("Loaded {} rule(s)", rules.len());
        Ok(RuleSet { rules })
    }

    pub fn into_ruler(self, config: RulerConfig) -> Result<Ruler> {
        Ruler::with_config(self.rules, config)
    }
}
