//! Resource quantities.
//!
//! Capacity and request strings look like `4000m` or `8192Mi`. Parsing strips
//! one known unit suffix and reads the leading numeric magnitude. No unit
//! conversion happens: `4` cores and `4000m` are different magnitudes, so
//! nodes and pods must agree on units. [`unit_mismatches`] reports the cases
//! where they don't.

use crate::error::{Error, Result};
use serde_yaml::Value;
use std::fmt;

/// Suffixes recognised on quantity strings, longest first.
const SUFFIXES: &[&str] = &[
    "Ki", "Mi", "Gi", "Ti", "Pi", "Ei", "m", "k", "K", "M", "G", "T", "P", "E",
];

/// A parsed quantity: magnitude plus the suffix that was stripped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Quantity {
    pub value: u64,
    pub unit: String,
}

impl Quantity {
    /// Parse a quantity from a YAML scalar.
    ///
    /// `record` and `field` only feed the error message.
    pub fn parse(raw: &Value, record: &str, field: &str) -> Result<Self> {
        let text = match raw {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            other => {
                return Err(Error::Parse {
                    record: record.to_string(),
                    field: field.to_string(),
                    value: format!("{other:?}"),
                });
            }
        };
        Self::parse_str(&text).ok_or_else(|| Error::Parse {
            record: record.to_string(),
            field: field.to_string(),
            value: text.clone(),
        })
    }

    /// Parse a quantity string, returning `None` when there is no numeric prefix.
    pub fn parse_str(text: &str) -> Option<Self> {
        let text = text.trim();
        let (number, unit) = SUFFIXES
            .iter()
            .find_map(|suffix| text.strip_suffix(suffix).map(|rest| (rest, *suffix)))
            .unwrap_or((text, ""));

        let digits_end = number
            .char_indices()
            .find(|(_, c)| !c.is_ascii_digit())
            .map_or(number.len(), |(i, _)| i);
        if digits_end == 0 {
            return None;
        }

        let value = number[..digits_end].parse().ok()?;
        Some(Self {
            value,
            unit: unit.to_string(),
        })
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.value, self.unit)
    }
}

/// CPU and memory, as raw magnitudes in the units the documents use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Resources {
    pub cpu: u64,
    pub memory: u64,
}

impl Resources {
    pub fn new(cpu: u64, memory: u64) -> Self {
        Self { cpu, memory }
    }
}

impl fmt::Display for Resources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cpu={} memory={}", self.cpu, self.memory)
    }
}

/// Units observed for each dimension of a record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResourceUnits {
    pub cpu: String,
    pub memory: String,
}

/// A dimension whose capacity and request units disagree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitMismatch {
    pub dimension: &'static str,
    pub capacity_unit: String,
    pub request_unit: String,
}

impl fmt::Display for UnitMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |u: &str| if u.is_empty() { "<none>".to_string() } else { u.to_string() };
        write!(
            f,
            "{} capacity uses {} but requests use {}",
            self.dimension,
            show(&self.capacity_unit),
            show(&self.request_unit)
        )
    }
}

/// Compare the units used by capacities against those used by requests.
///
/// Reports each distinct (dimension, capacity unit, request unit) pair once,
/// in first-seen order.
pub fn unit_mismatches<'a, 'b>(
    capacities: impl IntoIterator<Item = &'a ResourceUnits>,
    requests: impl IntoIterator<Item = &'b ResourceUnits>,
) -> Vec<UnitMismatch> {
    let mut cpu_units: Vec<&str> = Vec::new();
    let mut memory_units: Vec<&str> = Vec::new();
    for units in capacities {
        if !cpu_units.contains(&units.cpu.as_str()) {
            cpu_units.push(&units.cpu);
        }
        if !memory_units.contains(&units.memory.as_str()) {
            memory_units.push(&units.memory);
        }
    }

    let mut mismatches: Vec<UnitMismatch> = Vec::new();
    let mut record = |dimension: &'static str, capacity: &[&str], request: &str| {
        for cap in capacity {
            if *cap != request
                && !mismatches.iter().any(|m| {
                    m.dimension == dimension && m.capacity_unit == *cap && m.request_unit == request
                })
            {
                mismatches.push(UnitMismatch {
                    dimension,
                    capacity_unit: (*cap).to_string(),
                    request_unit: request.to_string(),
                });
            }
        }
    };

    for units in requests {
        record("cpu", &cpu_units, &units.cpu);
        record("memory", &memory_units, &units.memory);
    }
    mismatches
}
