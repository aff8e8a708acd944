//! The Ruler
//!
//! Selects the compression rule that applies to a packet descriptor, as
//! defined in RFC 8724:
//!
//! 1. Packet headers are flattened into one field list with
//!    `"header:field"` identifiers.
//! 2. Each rule, in provisioning order, is reduced to the fields whose
//!    direction indicator applies to the packet direction.
//! 3. Packet fields and rule fields are compared pairwise **by position**;
//!    the first rule whose fields all match wins.
//! 4. When nothing matches, a default rule with no fields is returned.
//!
//! Because residues are reassembled purely by position, the field order of a
//! rule must mirror the field order of the packets it targets. That ordering
//! is checked against the known header schemas when the ruler is built.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{Result, SchcError};
use crate::matcher::field_match;
use crate::packet::{Direction, FieldDescriptor, PacketDescriptor, split_qualified_id};
use crate::protocol;
use crate::rule::{RuleDescriptor, RuleFieldDescriptor};

// =============================================================================
// Configuration
// =============================================================================

/// What to do after a rule is rejected, either because its
/// direction-filtered field count differs from the packet's or because a
/// field does not match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScanMode {
    /// Skip that rule and keep scanning.
    #[default]
    Exhaustive,
    /// Stop scanning and fall back to the default rule, so only the first
    /// provisioned rule is ever selected. Kept for parity with older SCHC
    /// rulers.
    StopAtFirstReject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulerConfig {
    pub scan_mode: ScanMode,
    /// Check rule field order against the known header schemas at load time.
    pub validate_field_order: bool,
}

impl Default for RulerConfig {
    fn default() -> Self {
        Self {
            scan_mode: ScanMode::Exhaustive,
            validate_field_order: true,
        }
    }
}

// =============================================================================
// Ruler
// =============================================================================

/// Immutable rule set plus its default rule.
///
/// Matching takes `&self` and keeps no state between calls, so one ruler can
/// be shared across threads.
#[derive(Debug)]
pub struct Ruler {
    rules: Vec<RuleDescriptor>,
    default_rule: RuleDescriptor,
    config: RulerConfig,
}

impl Ruler {
    pub fn new(rules: Vec<RuleDescriptor>) -> Result<Self> {
        Self::with_config(rules, RulerConfig::default())
    }

    /// Build a ruler, validating every rule first.
    ///
    /// The default rule gets the id `rules.len()` and no fields.
    pub fn with_config(rules: Vec<RuleDescriptor>, config: RulerConfig) -> Result<Self> {
        for rule in &rules {
            validate_rule(rule, config.validate_field_order)?;
        }

        let default_id = u32::try_from(rules.len()).map_err(|_| {
            SchcError::RuleValidation(format!("too many rules: {}", rules.len()))
        })?;
        if rules.iter().any(|r| r.id == default_id) {
            log::warn!(
                "Rule {} shares its id with the default rule; use Ruler::is_default to tell them apart",
                default_id
            );
        }

        Ok(Self {
            rules,
            default_rule: RuleDescriptor::new(default_id, Vec::new()),
            config,
        })
    }

    /// Select the rule for `packet`, falling back to the default rule.
    ///
    /// Fails only on a configuration error in a rule field.
    pub fn match_packet(&self, packet: &PacketDescriptor) -> Result<&RuleDescriptor> {
        Ok(self.find(packet)?.unwrap_or(&self.default_rule))
    }

    /// Select the first provisioned rule matching `packet`, or `None`.
    pub fn find(&self, packet: &PacketDescriptor) -> Result<Option<&RuleDescriptor>> {
        let packet_fields = packet.flatten();

        for rule in &self.rules {
            let rule_fields: Vec<&RuleFieldDescriptor> = rule.fields_for(packet.direction).collect();

            if rule_fields.len() != packet_fields.len() {
                match self.config.scan_mode {
                    ScanMode::Exhaustive => {
                        log::debug!(
                            "Rule {}: {} fields for {} packet, packet has {}",
                            rule.id,
                            rule_fields.len(),
                            packet.direction,
                            packet_fields.len()
                        );
                        continue;
                    }
                    ScanMode::StopAtFirstReject => {
                        log::warn!(
                            "Rule {}: field count {} != {}, stopping scan",
                            rule.id,
                            rule_fields.len(),
                            packet_fields.len()
                        );
                        return Ok(None);
                    }
                }
            }

            if fields_match(&packet_fields, &rule_fields)? {
                log::debug!("Rule {} matched", rule.id);
                return Ok(Some(rule));
            }

            if self.config.scan_mode == ScanMode::StopAtFirstReject {
                log::warn!("Rule {}: field mismatch, stopping scan", rule.id);
                return Ok(None);
            }
        }

        Ok(None)
    }

    /// Whether `rule` is this ruler's default rule (by identity, not id).
    pub fn is_default(&self, rule: &RuleDescriptor) -> bool {
        std::ptr::eq(rule, &self.default_rule)
    }

    pub fn default_rule(&self) -> &RuleDescriptor {
        &self.default_rule
    }

    pub fn rules(&self) -> &[RuleDescriptor] {
        &self.rules
    }

    pub fn rule(&self, id: u32) -> Option<&RuleDescriptor> {
        self.rules.iter().find(|r| r.id == id)
    }

    pub fn config(&self) -> RulerConfig {
        self.config
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn fields_match(packet_fields: &[FieldDescriptor], rule_fields: &[&RuleFieldDescriptor]) -> Result<bool> {
    for (packet_field, rule_field) in packet_fields.iter().zip(rule_fields) {
        if !field_match(packet_field, rule_field)? {
            log::debug!("  {} rejected", rule_field.id);
            return Ok(false);
        }
    }
    Ok(true)
}

// =============================================================================
// Load-time validation
// =============================================================================

fn validate_rule(rule: &RuleDescriptor, check_order: bool) -> Result<()> {
    for field in &rule.field_descriptors {
        field.validate().map_err(|e| match e {
            SchcError::RuleValidation(msg) => SchcError::RuleValidation(format!("Rule {}: {}", rule.id, msg)),
            other => other,
        })?;
    }

    if check_order {
        for direction in [Direction::Up, Direction::Down] {
            check_field_order(rule, direction)?;
        }
    }
    Ok(())
}

/// Fields of one header must be contiguous, and fields of a known header
/// must follow its schema order (repeated fields by increasing position).
fn check_field_order(rule: &RuleDescriptor, direction: Direction) -> Result<()> {
    let mut finished_headers: HashSet<&str> = HashSet::new();
    let mut previous: Option<(&str, Option<usize>, &RuleFieldDescriptor)> = None;

    for field in rule.fields_for(direction) {
        let Some((header, _)) = split_qualified_id(&field.id) else {
            continue;
        };

        let index = match protocol::schema(header) {
            Some(_) => Some(protocol::schema_index(&field.id).ok_or_else(|| {
                SchcError::RuleValidation(format!(
                    "Rule {}: {} is not a field of header {}",
                    rule.id, field.id, header
                ))
            })?),
            None => None,
        };

        if let Some((prev_header, prev_index, prev_field)) = previous {
            if prev_header != header {
                finished_headers.insert(prev_header);
                if finished_headers.contains(header) {
                    return Err(SchcError::RuleValidation(format!(
                        "Rule {}: fields of header {} are not contiguous ({} direction)",
                        rule.id, header, direction
                    )));
                }
            } else if let (Some(prev), Some(cur)) = (prev_index, index) {
                let out_of_order =
                    cur < prev || (cur == prev && field.position <= prev_field.position);
                if out_of_order {
                    return Err(SchcError::RuleValidation(format!(
                        "Rule {}: {} (position {}) cannot follow {} (position {}) ({} direction)",
                        rule.id,
                        field.id,
                        field.position,
                        prev_field.id,
                        prev_field.position,
                        direction
                    )));
                }
            }
        }

        previous = Some((header, index, field));
    }
    Ok(())
}
