//! Result Aggregation - Per-Field Outcomes Into One Report
//!
//! Failures are data, never control flow. A report is built fresh for each
//! run and owned by the caller.

use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

/// Reserved message token for a collaborator port failure.
///
/// Opaque to the engine; the embedding application maps it to a rendered
/// message the same way it maps any other token.
pub const COLLABORATOR_MESSAGE: &str = "error.collaborator";

/// A single validator failure on a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub validator: String,
    pub message: String,
}

impl FieldError {
    pub fn new(validator: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            validator: validator.into(),
            message: message.into(),
        }
    }

    /// Synthetic failure recorded when an external port errors mid-chain.
    pub fn collaborator(source: impl Into<String>) -> Self {
        Self {
            validator: source.into(),
            message: COLLABORATOR_MESSAGE.to_string(),
        }
    }
}

/// Outcome for one field: final value plus its ordered failure list.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldReport {
    pub name: String,
    /// Effective value after defaulting/sanitizing (the default verbatim
    /// when one was declared).
    pub value: Value,
    pub valid: bool,
    pub errors: Vec<FieldError>,
}

impl FieldReport {
    /// Builds the outcome from the accumulated failures; `valid` is derived,
    /// never set independently.
    pub fn new(name: impl Into<String>, value: Value, errors: Vec<FieldError>) -> Self {
        Self {
            name: name.into(),
            valid: errors.is_empty(),
            value,
            errors,
        }
    }

    /// A field whose default applied: always valid, chains never ran.
    pub fn defaulted(name: impl Into<String>, value: Value) -> Self {
        Self::new(name, value, Vec::new())
    }
}

// Wire shape omits the name (it is the key in the enclosing map).
impl Serialize for FieldReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("FieldReport", 3)?;
        s.serialize_field("value", &self.value)?;
        s.serialize_field("valid", &self.valid)?;
        s.serialize_field("errors", &self.errors)?;
        s.end()
    }
}

/// The aggregated result of one run, in schema declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    pub overall_valid: bool,
    fields: Vec<FieldReport>,
}

impl ValidationReport {
    /// Merges per-field outcomes; `overall_valid` is computed here, after
    /// every field has completed, and nowhere else.
    pub fn from_fields(fields: Vec<FieldReport>) -> Self {
        let overall_valid = fields.iter().all(|f| f.valid);
        Self {
            overall_valid,
            fields,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldReport> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn fields(&self) -> &[FieldReport] {
        &self.fields
    }

    /// Ordered failures for a field; empty when the field is valid or unknown.
    pub fn errors(&self, name: &str) -> &[FieldError] {
        self.field(name).map(|f| f.errors.as_slice()).unwrap_or(&[])
    }
}

// Wire shape: { "overallValid": bool, "fields": { name: { value, valid, errors } } }
impl Serialize for ValidationReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        struct FieldMap<'a>(&'a [FieldReport]);

        impl Serialize for FieldMap<'_> {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                let mut m = serializer.serialize_map(Some(self.0.len()))?;
                for field in self.0 {
                    m.serialize_entry(&field.name, field)?;
                }
                m.end()
            }
        }

        let mut s = serializer.serialize_struct("ValidationReport", 2)?;
        s.serialize_field("overallValid", &self.overall_valid)?;
        s.serialize_field("fields", &FieldMap(&self.fields))?;
        s.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_valid_derived_from_errors() {
        let clean = FieldReport::new("name", json!("alice"), vec![]);
        assert!(clean.valid);

        let broken = FieldReport::new(
            "age",
            json!("abc"),
            vec![FieldError::new("integer", "validation.integer")],
        );
        assert!(!broken.valid);
    }

    #[test]
    fn test_overall_valid_is_conjunction() {
        let report = ValidationReport::from_fields(vec![
            FieldReport::new("a", json!("x"), vec![]),
            FieldReport::new("b", json!("y"), vec![FieldError::new("required", "validation.required")]),
        ]);
        assert!(!report.overall_valid);
        assert!(report.field("a").unwrap().valid);
        assert!(!report.field("b").unwrap().valid);
    }

    #[test]
    fn test_wire_shape() {
        let report = ValidationReport::from_fields(vec![FieldReport::new(
            "age",
            json!("abc"),
            vec![FieldError::new("integer", "validation.integer")],
        )]);

        let wire = serde_json::to_value(&report).unwrap();
        assert_eq!(
            wire,
            json!({
                "overallValid": false,
                "fields": {
                    "age": {
                        "value": "abc",
                        "valid": false,
                        "errors": [{ "validator": "integer", "message": "validation.integer" }]
                    }
                }
            })
        );
    }

    #[test]
    fn test_field_order_follows_construction_order() {
        let report = ValidationReport::from_fields(vec![
            FieldReport::new("zulu", json!(""), vec![]),
            FieldReport::new("alpha", json!(""), vec![]),
        ]);
        let text = serde_json::to_string(&report).unwrap();
        assert!(text.find("zulu").unwrap() < text.find("alpha").unwrap());
    }

    #[test]
    fn test_collaborator_error_uses_reserved_token() {
        let err = FieldError::collaborator("purify");
        assert_eq!(err.validator, "purify");
        assert_eq!(err.message, COLLABORATOR_MESSAGE);
    }
}
