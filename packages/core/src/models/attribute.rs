//! Attribute Model and Quantization
//!
//! Attributes are numeric key/value properties owned by exactly one entity.
//! Values are exact decimals: alongside the value itself we persist a
//! *precision template* - the decimal-string form of the value as submitted -
//! and re-quantize on every read by truncating to the template's scale.
//! Whatever padding or extra digits the storage layer introduces, a read
//! always reproduces exactly what the caller submitted.

use bigdecimal::{BigDecimal, RoundingMode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A persisted attribute row. `key` is unique per owning entity; deleting
/// the entity cascades to its attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    /// Database rowid
    pub id: i64,

    /// Owning entity
    pub entity_id: i64,

    /// Attribute name, unique per entity
    pub key: String,

    /// Stored value in decimal-string form
    pub value: String,

    /// Decimal-string form of the value as originally submitted; its scale
    /// drives read-time truncation
    pub precision: String,

    /// Creation timestamp (database-generated)
    pub created_at: DateTime<Utc>,

    /// Last modification timestamp (database-generated)
    pub modified_at: DateTime<Utc>,
}

impl Attribute {
    /// The stored value truncated at the stored precision.
    pub fn quantized_value(&self) -> Option<BigDecimal> {
        read_value(Some(&self.value), Some(&self.precision))
    }
}

/// Decimal scale implied by a precision template: the number of digits after
/// the decimal point (`"0.001"` -> 3, `"12"` -> 0).
pub fn template_scale(template: &str) -> i64 {
    match template.split_once('.') {
        Some((_, frac)) => frac.len() as i64,
        None => 0,
    }
}

/// Quantize a stored value at its precision template.
///
/// Rounds toward zero (truncation, not nearest-rounding) to the template's
/// scale, and returns `None` if either input is absent or unparseable.
/// Truncation, not rounding, because the template captures the scale of the
/// originally submitted value: any extra digits are storage artifacts, and
/// dropping them restores the submission exactly.
pub fn read_value(raw_value: Option<&str>, template: Option<&str>) -> Option<BigDecimal> {
    let raw = BigDecimal::from_str(raw_value?).ok()?;
    let scale = template_scale(template?);
    Some(raw.with_scale_round(scale, RoundingMode::Down))
}

/// Capture a submitted value for storage: the normalized decimal string and
/// the precision template recording its original scale.
pub fn write_value(value: &BigDecimal) -> (String, String) {
    let text = value.to_string();
    (text.clone(), text)
}
