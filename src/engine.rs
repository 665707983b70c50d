//! Two-Phase Orchestrator - Single Entry Point
//!
//! Phase 1 resolves every field (default, absent marker, or sanitizer
//! chain) before phase 2 validates any of them. Cross-field rules
//! therefore always observe post-sanitization sibling values, independent
//! of declaration order.
//!
//! `evaluate` has no error path for request data: data-driven failures
//! live in the report, never in a `Result`.

use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::ports::{FormatCheckerPort, PurifierPort, RegexFormatChecker};
use crate::report::{FieldError, FieldReport, ValidationReport};
use crate::sanitize::SanitizerRegistry;
use crate::schema::{ChainDefaults, FieldSpec, Schema, SchemaError};
use crate::validate::{value_text, ResolvedValues, RuleContext, RuleOutcome, RuleRegistry};

/// One request's parameters: field name to present string value. A
/// missing key is the absent marker; repeated keys are out of scope.
pub type RawInput = HashMap<String, String>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to read schema file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse schema file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Engine construction options. Collaborators and chain defaults are
/// explicit configuration, not ambient state.
#[derive(Default)]
pub struct EngineConfig {
    /// HTML purification collaborator; without one, `purify` degrades to
    /// identity and records a collaborator failure.
    pub purifier: Option<Arc<dyn PurifierPort>>,
    /// Format checking collaborator; [`RegexFormatChecker`] when unset.
    pub format_checker: Option<Arc<dyn FormatCheckerPort>>,
    /// Chains applied to fields that declare none of their own.
    pub defaults: ChainDefaults,
}

/// The validation engine: registries plus collaborator ports.
///
/// Compile a schema once, evaluate it against many requests. The engine
/// and its compiled schemas are immutable and share freely across
/// threads; each run is a pure function of (schema, input, ports).
pub struct Engine {
    sanitizers: SanitizerRegistry,
    rules: RuleRegistry,
    purifier: Option<Arc<dyn PurifierPort>>,
    checker: Arc<dyn FormatCheckerPort>,
    defaults: ChainDefaults,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_registries(config, SanitizerRegistry::builtin(), RuleRegistry::builtin())
    }

    /// Extension point: custom sanitizer/validator capabilities are
    /// registered before construction, never patched in afterwards.
    pub fn with_registries(
        config: EngineConfig,
        sanitizers: SanitizerRegistry,
        rules: RuleRegistry,
    ) -> Self {
        Self {
            sanitizers,
            rules,
            purifier: config.purifier,
            checker: config
                .format_checker
                .unwrap_or_else(|| Arc::new(RegexFormatChecker)),
            defaults: config.defaults,
        }
    }

    /// Compiles a schema document. Fails fast; an invalid schema is never
    /// allowed to run.
    pub fn compile(&self, doc: &Value) -> Result<Schema, SchemaError> {
        Schema::compile(doc, &self.sanitizers, &self.rules, &self.defaults)
    }

    /// Loads and compiles a schema JSON file.
    pub fn compile_file(&self, path: &Path) -> Result<Schema, EngineError> {
        let content = std::fs::read_to_string(path)?;
        let doc: Value = serde_json::from_str(&content)?;
        Ok(self.compile(&doc)?)
    }

    /// Evaluates one request against a compiled schema.
    pub fn evaluate(&self, schema: &Schema, input: &RawInput) -> ValidationReport {
        // Phase 1: every field resolves before any field validates. This
        // is the only ordering barrier in a run.
        let resolutions: Vec<Resolution> = schema
            .fields()
            .iter()
            .map(|field| self.resolve(field, input))
            .collect();

        let resolved: ResolvedValues = schema
            .fields()
            .iter()
            .zip(&resolutions)
            .map(|(field, r)| (field.name().to_string(), r.text.clone()))
            .collect();

        // Phase 2: validate with full cross-field visibility.
        let reports = schema
            .fields()
            .iter()
            .zip(resolutions)
            .map(|(field, r)| self.validate_field(field, r, &resolved))
            .collect();

        ValidationReport::from_fields(reports)
    }

    fn resolve(&self, field: &FieldSpec, input: &RawInput) -> Resolution {
        // A declared default wins outright: no sanitizing, no validating.
        if let Some(default) = field.default() {
            return Resolution {
                text: value_text(default),
                report_value: default.clone(),
                present: true,
                defaulted: true,
                degraded: Vec::new(),
            };
        }

        let Some(raw) = input.get(field.name()) else {
            return Resolution {
                text: String::new(),
                report_value: Value::String(String::new()),
                present: false,
                defaulted: false,
                degraded: Vec::new(),
            };
        };

        let mut value = raw.clone();
        let mut degraded = Vec::new();
        for sanitizer in &field.sanitizers {
            let outcome = sanitizer.apply(&value, self.purifier.as_deref());
            if let Some(err) = outcome.degraded {
                log::warn!(
                    "field '{}': sanitizer '{}' degraded to identity: {}",
                    field.name(),
                    sanitizer.name(),
                    err
                );
                degraded.push(FieldError::collaborator(sanitizer.name()));
            }
            value = outcome.value;
        }

        Resolution {
            text: value.clone(),
            report_value: Value::String(value),
            present: true,
            defaulted: false,
            degraded,
        }
    }

    fn validate_field(
        &self,
        field: &FieldSpec,
        resolution: Resolution,
        resolved: &ResolvedValues,
    ) -> FieldReport {
        if resolution.defaulted {
            return FieldReport::defaulted(field.name(), resolution.report_value);
        }

        let mut errors = resolution.degraded;
        for validator in field.validators() {
            // Absent with no default: only `required` applies; the rest
            // have no value to check and produce no spurious failures.
            if !resolution.present && !validator.rule.applies_when_absent() {
                continue;
            }

            let ctx = RuleContext {
                value: &resolution.text,
                present: resolution.present,
                resolved,
                checker: &*self.checker,
            };
            match validator.rule.check(&ctx) {
                RuleOutcome::Pass => {}
                RuleOutcome::Fail => {
                    errors.push(FieldError::new(validator.name(), validator.message()));
                }
                RuleOutcome::Degraded(err) => {
                    log::warn!(
                        "field '{}': validator '{}' collaborator failed: {}",
                        field.name(),
                        validator.name(),
                        err
                    );
                    errors.push(FieldError::collaborator(validator.name()));
                }
            }
        }

        FieldReport::new(field.name(), resolution.report_value, errors)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

/// Phase-1 outcome for one field.
struct Resolution {
    /// Effective value as text, for validation and cross-field reads.
    text: String,
    /// Effective value as reported (the default verbatim when one
    /// applied).
    report_value: Value,
    present: bool,
    defaulted: bool,
    /// Collaborator failures recorded during sanitizing.
    degraded: Vec<FieldError>,
}
