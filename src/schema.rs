//! Schema Compiler - Declarative Documents Into Immutable Rule Chains
//!
//! A schema document is compiled exactly once, with every sanitizer and
//! validator name resolved through the registries and every rule's params
//! checked up front. An invalid schema never reaches a request; a compiled
//! [`Schema`] is read-only and safe to share across concurrent runs.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::sanitize::{ParamBag, Sanitizer, SanitizerRegistry};
use crate::validate::{Rule, RuleRegistry};

/// Load-time schema failure. Always fatal: compilation either yields a
/// fully usable [`Schema`] or nothing.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("schema document must be a JSON object of field specs")]
    NotAnObject,

    #[error("field '{field}': spec must be an object: {reason}")]
    InvalidFieldSpec { field: String, reason: String },

    #[error("field '{field}': unknown sanitizer '{name}'")]
    UnknownSanitizer { field: String, name: String },

    #[error("field '{field}': unknown validator '{name}'")]
    UnknownValidator { field: String, name: String },

    #[error("field '{field}': validator '{rule}' is missing required parameter '{param}'")]
    MissingParam {
        field: String,
        rule: &'static str,
        param: &'static str,
    },

    #[error("field '{field}': validator '{rule}' parameter '{param}' must be {expected}")]
    InvalidParam {
        field: String,
        rule: &'static str,
        param: &'static str,
        expected: &'static str,
    },

    #[error("field '{field}': invalid regex pattern '{pattern}': {reason}")]
    BadPattern {
        field: String,
        pattern: String,
        reason: String,
    },

    #[error("field '{field}': sanitizer entry '{name}' params must be an object")]
    InvalidSanitizerParams { field: String, name: String },

    #[error("field '{field}': validator entry '{name}' params must be an object")]
    InvalidValidatorParams { field: String, name: String },

    #[error("field '{field}': validator '{name}' message must be a string")]
    InvalidMessage { field: String, name: String },
}

/// Raw per-field document shape:
/// `{ default?, sanitizers?: { name: params }, validators?: { name: params & message? } }`.
///
/// The maps preserve declaration order; chain order is meaningful.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FieldDoc {
    #[serde(default)]
    pub default: Option<Value>,
    /// `None` means "use the engine's configured defaults";
    /// `Some(empty)` means "explicitly no sanitizers".
    #[serde(default)]
    pub sanitizers: Option<serde_json::Map<String, Value>>,
    #[serde(default)]
    pub validators: Option<serde_json::Map<String, Value>>,
}

/// Sanitizer/validator chains applied to fields that declare none of their
/// own. Explicit engine configuration, never hidden global state.
#[derive(Debug, Clone, Default)]
pub struct ChainDefaults {
    pub sanitizers: serde_json::Map<String, Value>,
    pub validators: serde_json::Map<String, Value>,
}

/// One compiled validator: the rule strategy plus its reporting identity.
pub struct ValidatorSpec {
    pub(crate) name: String,
    pub(crate) rule: Box<dyn Rule>,
    /// Message token emitted on failure; defaults to `validation.<name>`.
    pub(crate) message: String,
}

impl ValidatorSpec {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// One compiled field: default plus ordered sanitizer/validator chains.
pub struct FieldSpec {
    pub(crate) name: String,
    pub(crate) default: Option<Value>,
    pub(crate) sanitizers: Vec<Box<dyn Sanitizer>>,
    pub(crate) validators: Vec<ValidatorSpec>,
}

impl FieldSpec {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn validators(&self) -> &[ValidatorSpec] {
        &self.validators
    }
}

/// A compiled, immutable schema: ordered fields with unique names.
pub struct Schema {
    fields: Vec<FieldSpec>,
}

impl Schema {
    /// Compiles a schema document against the given registries. Never
    /// inspects request data.
    pub fn compile(
        doc: &Value,
        sanitizers: &SanitizerRegistry,
        rules: &RuleRegistry,
        defaults: &ChainDefaults,
    ) -> Result<Self, SchemaError> {
        let entries = doc.as_object().ok_or(SchemaError::NotAnObject)?;

        let mut fields = Vec::with_capacity(entries.len());
        for (name, body) in entries {
            let field_doc: FieldDoc = FieldDoc::deserialize(body).map_err(|e| {
                SchemaError::InvalidFieldSpec {
                    field: name.clone(),
                    reason: e.to_string(),
                }
            })?;
            fields.push(compile_field(name, &field_doc, sanitizers, rules, defaults)?);
        }

        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

fn compile_field(
    name: &str,
    doc: &FieldDoc,
    sanitizers: &SanitizerRegistry,
    rules: &RuleRegistry,
    defaults: &ChainDefaults,
) -> Result<FieldSpec, SchemaError> {
    let sanitizer_entries = doc.sanitizers.as_ref().unwrap_or(&defaults.sanitizers);
    let validator_entries = doc.validators.as_ref().unwrap_or(&defaults.validators);

    let mut compiled_sanitizers = Vec::with_capacity(sanitizer_entries.len());
    for (entry_name, raw_params) in sanitizer_entries {
        let params = entry_params(raw_params).ok_or_else(|| SchemaError::InvalidSanitizerParams {
            field: name.to_string(),
            name: entry_name.clone(),
        })?;
        compiled_sanitizers.push(sanitizers.compile(name, entry_name, &params)?);
    }

    let mut compiled_validators = Vec::with_capacity(validator_entries.len());
    for (entry_name, raw_params) in validator_entries {
        let mut params = entry_params(raw_params).ok_or_else(|| SchemaError::InvalidValidatorParams {
            field: name.to_string(),
            name: entry_name.clone(),
        })?;

        // The message token travels beside the rule params but is not one.
        let message = match params.remove("message") {
            None => format!("validation.{entry_name}"),
            Some(Value::String(token)) => token,
            Some(_) => {
                return Err(SchemaError::InvalidMessage {
                    field: name.to_string(),
                    name: entry_name.clone(),
                })
            }
        };

        compiled_validators.push(ValidatorSpec {
            name: entry_name.clone(),
            rule: rules.compile(name, entry_name, &params)?,
            message,
        });
    }

    Ok(FieldSpec {
        name: name.to_string(),
        default: doc.default.clone(),
        sanitizers: compiled_sanitizers,
        validators: compiled_validators,
    })
}

/// A chain entry's params: an object, or `null` as shorthand for none.
fn entry_params(raw: &Value) -> Option<ParamBag> {
    match raw {
        Value::Object(map) => Some(map.clone()),
        Value::Null => Some(ParamBag::new()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn compile(doc: Value) -> Result<Schema, SchemaError> {
        Schema::compile(
            &doc,
            &SanitizerRegistry::builtin(),
            &RuleRegistry::builtin(),
            &ChainDefaults::default(),
        )
    }

    #[test]
    fn test_compile_preserves_field_and_chain_order() {
        let schema = compile(json!({
            "zulu": { "validators": { "required": {}, "integer": {}, "range": {"min": 0} } },
            "alpha": { "sanitizers": { "escape": {}, "purge": {} } }
        }))
        .unwrap();

        let names: Vec<_> = schema.fields().iter().map(|f| f.name()).collect();
        assert_eq!(names, ["zulu", "alpha"]);

        let rules: Vec<_> = schema.field("zulu").unwrap().validators().iter().map(|v| v.name()).collect();
        assert_eq!(rules, ["required", "integer", "range"]);
        assert_eq!(schema.field("alpha").unwrap().sanitizers.len(), 2);
    }

    #[test]
    fn test_unknown_validator_fails_compilation() {
        let err = compile(json!({
            "card": { "validators": { "luhn": {} } }
        }))
        .err()
        .unwrap();
        assert!(matches!(err, SchemaError::UnknownValidator { .. }));
        assert!(err.to_string().contains("luhn"));
    }

    #[test]
    fn test_unknown_sanitizer_fails_compilation() {
        let err = compile(json!({
            "bio": { "sanitizers": { "bleach": {} } }
        }))
        .err()
        .unwrap();
        assert!(matches!(err, SchemaError::UnknownSanitizer { .. }));
    }

    #[test]
    fn test_missing_required_params_fail_compilation() {
        for (rule, body) in [
            ("regex", json!({"regex": {}})),
            ("equals", json!({"equals": {}})),
            ("matches", json!({"matches": {}})),
            ("member_of", json!({"member_of": {}})),
        ] {
            let err = compile(json!({ "f": { "validators": body } })).err().unwrap();
            assert!(
                matches!(err, SchemaError::MissingParam { .. }),
                "{rule} without params should fail compilation"
            );
        }
    }

    #[test]
    fn test_non_numeric_bounds_fail_compilation() {
        let err = compile(json!({
            "age": { "validators": { "range": { "min": "zero" } } }
        }))
        .err()
        .unwrap();
        assert!(matches!(err, SchemaError::InvalidParam { .. }));

        let err = compile(json!({
            "name": { "validators": { "length": { "max": 1.5 } } }
        }))
        .err()
        .unwrap();
        assert!(matches!(err, SchemaError::InvalidParam { .. }));
    }

    #[test]
    fn test_document_must_be_object() {
        assert!(matches!(compile(json!([1, 2])), Err(SchemaError::NotAnObject)));
        assert!(matches!(
            compile(json!({ "f": "not-an-object" })),
            Err(SchemaError::InvalidFieldSpec { .. })
        ));
    }

    #[test]
    fn test_message_token_is_opaque_passthrough() {
        let schema = compile(json!({
            "age": { "validators": { "integer": { "message": "AGE_NOT_A_NUMBER" } } }
        }))
        .unwrap();
        assert_eq!(schema.field("age").unwrap().validators()[0].message(), "AGE_NOT_A_NUMBER");
    }

    #[test]
    fn test_default_message_token_derived_from_rule_name() {
        let schema = compile(json!({
            "age": { "validators": { "integer": {} } }
        }))
        .unwrap();
        assert_eq!(schema.field("age").unwrap().validators()[0].message(), "validation.integer");
    }

    #[test]
    fn test_chain_defaults_apply_only_when_undeclared() {
        let defaults = ChainDefaults {
            sanitizers: json!({"escape": {}}).as_object().unwrap().clone(),
            validators: json!({"length": {"max": 10}}).as_object().unwrap().clone(),
        };
        let schema = Schema::compile(
            &json!({
                "comment": {},
                "opted_out": { "sanitizers": {}, "validators": {} }
            }),
            &SanitizerRegistry::builtin(),
            &RuleRegistry::builtin(),
            &defaults,
        )
        .unwrap();

        assert_eq!(schema.field("comment").unwrap().sanitizers.len(), 1);
        assert_eq!(schema.field("comment").unwrap().validators().len(), 1);
        assert_eq!(schema.field("opted_out").unwrap().sanitizers.len(), 0);
        assert_eq!(schema.field("opted_out").unwrap().validators().len(), 0);
    }

    #[test]
    fn test_defaulted_field_compiles_chains_but_never_runs_them() {
        // Chains on a defaulted field are still schema-checked.
        let err = compile(json!({
            "locale": { "default": "en", "validators": { "bogus": {} } }
        }))
        .err()
        .unwrap();
        assert!(matches!(err, SchemaError::UnknownValidator { .. }));
    }

    #[test]
    fn test_null_params_shorthand() {
        let schema = compile(json!({
            "age": { "validators": { "integer": null } }
        }))
        .unwrap();
        assert_eq!(schema.field("age").unwrap().validators().len(), 1);
    }
}
