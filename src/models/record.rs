use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest value accepted for a single attribute.
pub const MAX_VALUE_LEN: usize = 80;

/// A known attribute of a feature request.
///
/// Declaration order is priority order: when several attributes are missing,
/// the earliest-declared one is asked about first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    /// Which page or surface the feature lives on.
    TargetPage,
    /// What kind of element it is (button, form, field, ...).
    FeatureType,
    /// What happens when the feature is used (save, submit, navigate, ...).
    Action,
}

impl Attribute {
    pub const ALL: [Attribute; 3] = [Self::TargetPage, Self::FeatureType, Self::Action];

    /// Attributes that must be non-empty before tickets can be synthesized.
    pub const REQUIRED: [Attribute; 3] = Self::ALL;

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TargetPage => "target_page",
            Self::FeatureType => "feature_type",
            Self::Action => "action",
        }
    }

    /// Human-readable name used in prompts and summaries.
    pub fn label(&self) -> &'static str {
        match self {
            Self::TargetPage => "target page",
            Self::FeatureType => "feature type",
            Self::Action => "action",
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown attribute '{0}'")]
pub struct UnknownAttribute(pub String);

impl FromStr for Attribute {
    type Err = UnknownAttribute;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "target_page" => Ok(Self::TargetPage),
            "feature_type" => Ok(Self::FeatureType),
            "action" => Ok(Self::Action),
            other => Err(UnknownAttribute(other.to_string())),
        }
    }
}

/// A value in a [`FeatureRecord`] that fails the record's schema check.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{attribute}: {reason}")]
pub struct RecordViolation {
    pub attribute: Attribute,
    pub reason: String,
}

/// Structured extraction of a feature request's key attributes.
///
/// Only [`Attribute`] keys can be stored, so unknown attributes are dropped at
/// the type level. Values are kept in normalized form (trimmed, single-spaced,
/// lowercase); see [`normalize_value`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureRecord {
    values: BTreeMap<Attribute, String>,
}

impl FeatureRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, attribute: Attribute) -> Option<&str> {
        self.values.get(&attribute).map(String::as_str)
    }

    pub fn is_set(&self, attribute: Attribute) -> bool {
        self.values.contains_key(&attribute)
    }

    /// Stores a normalized value, returning the previous one.
    ///
    /// Values that normalize to nothing are ignored and leave the record as is.
    pub fn set(&mut self, attribute: Attribute, raw: &str) -> Option<String> {
        match normalize_value(raw) {
            Some(value) => self.values.insert(attribute, value),
            None => None,
        }
    }

    /// Builder-style [`set`](Self::set).
    pub fn with(mut self, attribute: Attribute, raw: &str) -> Self {
        self.set(attribute, raw);
        self
    }

    /// Required attributes with no value, in priority order.
    pub fn missing(&self) -> Vec<Attribute> {
        Attribute::REQUIRED
            .iter()
            .copied()
            .filter(|a| !self.is_set(*a))
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Attribute, &str)> {
        self.values.iter().map(|(a, v)| (*a, v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Internal schema check: every stored value must be non-empty, bounded,
    /// single-line and already normalized.
    pub fn validate(&self) -> Result<(), RecordViolation> {
        for (attribute, value) in &self.values {
            let violation = |reason: &str| RecordViolation {
                attribute: *attribute,
                reason: reason.to_string(),
            };

            if value.is_empty() {
                return Err(violation("value is empty"));
            }
            if value.chars().count() > MAX_VALUE_LEN {
                return Err(violation("value is too long"));
            }
            if value.chars().any(char::is_control) {
                return Err(violation("value contains control characters"));
            }
            if normalize_value(value).as_deref() != Some(value.as_str()) {
                return Err(violation("value is not normalized"));
            }
        }
        Ok(())
    }
}

/// Normalizes an attribute value: trims, collapses whitespace, lowercases.
/// Returns `None` when nothing meaningful remains (including `"null"`/`"none"`
/// placeholders generation backends like to emit).
pub fn normalize_value(raw: &str) -> Option<String> {
    let value = raw
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    match value.as_str() {
        "" | "null" | "none" | "n/a" | "unknown" => None,
        _ => Some(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_order_is_priority_order() {
        let mut attrs = vec![Attribute::Action, Attribute::TargetPage, Attribute::FeatureType];
        attrs.sort();
        assert_eq!(attrs, Attribute::ALL.to_vec());
    }

    #[test]
    fn attribute_parses_from_snake_case() {
        assert_eq!("target_page".parse::<Attribute>(), Ok(Attribute::TargetPage));
        assert_eq!(" Action ".parse::<Attribute>(), Ok(Attribute::Action));
        assert!("colour".parse::<Attribute>().is_err());
    }

    #[test]
    fn set_normalizes_values() {
        let mut record = FeatureRecord::new();
        record.set(Attribute::TargetPage, "  User   Settings ");
        assert_eq!(record.get(Attribute::TargetPage), Some("user settings"));
    }

    #[test]
    fn set_ignores_placeholder_values() {
        let mut record = FeatureRecord::new();
        assert_eq!(record.set(Attribute::Action, "null"), None);
        assert!(!record.is_set(Attribute::Action));
    }

    #[test]
    fn missing_lists_required_attributes_in_priority_order() {
        let record = FeatureRecord::new().with(Attribute::FeatureType, "button");
        assert_eq!(record.missing(), vec![Attribute::TargetPage, Attribute::Action]);
    }

    #[test]
    fn serializes_as_snake_case_map() {
        let record = FeatureRecord::new()
            .with(Attribute::TargetPage, "dashboard")
            .with(Attribute::FeatureType, "button");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"target_page": "dashboard", "feature_type": "button"})
        );
    }

    #[test]
    fn validate_rejects_overlong_values() {
        let record: FeatureRecord =
            serde_json::from_value(serde_json::json!({ "action": "x".repeat(MAX_VALUE_LEN + 1) }))
                .unwrap();
        let err = record.validate().unwrap_err();
        assert_eq!(err.attribute, Attribute::Action);
    }

    #[test]
    fn validate_rejects_unnormalized_values() {
        let record: FeatureRecord =
            serde_json::from_value(serde_json::json!({ "target_page": " Dashboard" })).unwrap();
        assert!(record.validate().is_err());
    }
}
