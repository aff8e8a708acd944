//! Rule Display
//!
//! Human-readable listing of provisioned rules, optionally restricted to the
//! fields one direction would see.

use crate::packet::Direction;
use crate::rule::{RuleDescriptor, RuleFieldDescriptor};
use crate::ruler::Ruler;
use crate::value::TargetValue;

/// Display every rule of the ruler, plus its default rule
pub fn display_rules(ruler: &Ruler, direction: Option<Direction>) {
    println!("\n{}", "=".repeat(80));
    match direction {
        Some(d) => println!("SCHC RULES ({} fields)", d),
        None => println!("SCHC RULES"),
    }
    println!("{}", "=".repeat(80));
    println!("Total rules: {}", ruler.len());
    println!("{}", "-".repeat(80));

    for rule in ruler.rules() {
        print!("{}", format_rule(rule, direction));
    }
    println!("[RULE {}] default (no fields, sent uncompressed)", ruler.default_rule().id);

    println!("{}\n", "=".repeat(80));
}

pub fn format_rule(rule: &RuleDescriptor, direction: Option<Direction>) -> String {
    let mut out = match &rule.comment {
        Some(comment) => format!("[RULE {}] {}\n", rule.id, comment),
        None => format!("[RULE {}]\n", rule.id),
    };

    let fields: Vec<&RuleFieldDescriptor> = match direction {
        Some(d) => rule.fields_for(d).collect(),
        None => rule.field_descriptors.iter().collect(),
    };

    for (i, field) in fields.iter().enumerate() {
        let connector = if i + 1 == fields.len() { "└─" } else { "├─" };
        out.push_str(&format!(
            "  {} {:<28} FL={:<3} FP={} DI={} MO={:<13} CDA={:<12} TV={}\n",
            connector,
            field.id,
            field.length,
            field.position,
            field.direction,
            field.matching_operator.as_str(),
            field.compression_decompression_action.as_str(),
            format_target(field.target_value.as_ref()),
        ));
    }
    out
}

fn format_target(target: Option<&TargetValue>) -> String {
    match target {
        None => "-".to_string(),
        Some(TargetValue::Value(v)) => v.to_string(),
        Some(TargetValue::Pattern(p)) => {
            let bits: String = p
                .bits()
                .as_bitslice()
                .iter()
                .map(|b| if *b { '1' } else { '0' })
                .collect();
            format!("0b{}/{}", bits, p.length)
        }
        Some(TargetValue::MatchMapping(m)) => {
            let entries: Vec<String> = m.iter().map(|(i, v)| format!("{}:{}", i, v)).collect();
            format!("[{}] ({}-bit index)", entries.join(", "), m.index_length())
        }
    }
}
