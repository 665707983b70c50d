//! Validator Engine - Named Rules Over Resolved Values
//!
//! A rule is compiled once per schema field and checked once per run.
//! Rules see the field's effective value, its presence in the raw input,
//! and the complete phase-1 resolved map of every sibling field.
//!
//! Failure semantics: all rules on a field run in declared order and their
//! failures accumulate; nothing short-circuits. The single exception is an
//! absent field with no default, where only `required` applies.

use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;

use crate::ports::{FormatCheckerPort, FormatKind, PortError};
use crate::sanitize::ParamBag;
use crate::schema::SchemaError;

/// Phase-1 effective values for every field, keyed by field name.
/// Absent fields with no default are present with an empty value.
pub type ResolvedValues = HashMap<String, String>;

/// Everything a rule may observe during a check.
pub struct RuleContext<'a> {
    /// The field's effective value (empty for an absent field).
    pub value: &'a str,
    /// Whether the field appeared in the raw input.
    pub present: bool,
    /// Effective values of all fields after phase 1.
    pub resolved: &'a ResolvedValues,
    /// Format checking collaborator.
    pub checker: &'a dyn FormatCheckerPort,
}

/// Outcome of one rule check. Failures carry no message here; the message
/// token is attached by the compiled validator spec.
pub enum RuleOutcome {
    Pass,
    Fail,
    /// An external port errored; recorded as a collaborator failure.
    Degraded(PortError),
}

impl RuleOutcome {
    fn from_bool(pass: bool) -> Self {
        if pass {
            RuleOutcome::Pass
        } else {
            RuleOutcome::Fail
        }
    }
}

/// A compiled validation rule.
pub trait Rule: Send + Sync {
    fn check(&self, ctx: &RuleContext<'_>) -> RuleOutcome;

    /// Whether the rule still runs when the field is absent with no
    /// default. Only `required` opts in; every other rule is
    /// non-applicable without a value to check.
    fn applies_when_absent(&self) -> bool {
        false
    }
}

/// Compiles a named rule entry from its schema params. Param problems are
/// schema-compile-time failures, never run-time ones.
pub trait RuleFactory: Send + Sync {
    fn name(&self) -> &'static str;
    fn compile(&self, field: &str, params: &ParamBag) -> Result<Box<dyn Rule>, SchemaError>;
}

/// Name -> factory lookup for validators. New rules are registered here;
/// the orchestrator never switches on rule names.
pub struct RuleRegistry {
    factories: HashMap<&'static str, Box<dyn RuleFactory>>,
}

impl RuleRegistry {
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with the full built-in rule set.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(RequiredFactory));
        registry.register(Box::new(EqualsFactory { negate: false }));
        registry.register(Box::new(EqualsFactory { negate: true }));
        registry.register(Box::new(FormatFactory(FormatKind::Email)));
        registry.register(Box::new(FormatFactory(FormatKind::Telephone)));
        registry.register(Box::new(FormatFactory(FormatKind::Uri)));
        registry.register(Box::new(RegexFactory));
        registry.register(Box::new(LengthFactory));
        registry.register(Box::new(IntegerFactory));
        registry.register(Box::new(NumericFactory));
        registry.register(Box::new(RangeFactory));
        registry.register(Box::new(MemberFactory { negate: false }));
        registry.register(Box::new(MemberFactory { negate: true }));
        registry.register(Box::new(MatchesFactory { negate: false }));
        registry.register(Box::new(MatchesFactory { negate: true }));
        registry
    }

    pub fn register(&mut self, factory: Box<dyn RuleFactory>) {
        self.factories.insert(factory.name(), factory);
    }

    pub fn compile(
        &self,
        field: &str,
        name: &str,
        params: &ParamBag,
    ) -> Result<Box<dyn Rule>, SchemaError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| SchemaError::UnknownValidator {
                field: field.to_string(),
                name: name.to_string(),
            })?;
        factory.compile(field, params)
    }
}

// --- text semantics shared across rules ---

/// Integer grammar: optional sign, one or more digits, nothing else.
pub(crate) fn is_integer_text(s: &str) -> bool {
    let digits = s.strip_prefix(['+', '-']).unwrap_or(s);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Numeric grammar: optional sign, digits, optional `.` plus digits.
/// Returns the parsed value; scientific notation and bare `.5` do not
/// qualify.
pub(crate) fn parse_numeric_text(s: &str) -> Option<f64> {
    let body = s.strip_prefix(['+', '-']).unwrap_or(s);
    let (int_part, frac_part) = match body.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (body, None),
    };
    if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if let Some(frac) = frac_part {
        if frac.is_empty() || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
    }
    s.parse::<f64>().ok()
}

/// The engine's equivalence rule: when both operands parse under the
/// numeric grammar they compare numerically, otherwise as case-sensitive
/// strings. `"30"` is equivalent to `"30.0"`, not to `"30 "`.
pub(crate) fn equivalent(a: &str, b: &str) -> bool {
    match (parse_numeric_text(a), parse_numeric_text(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

/// Canonical text form of a schema-provided scalar: strings verbatim,
/// everything else as its JSON text.
pub(crate) fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// --- param extraction ---

fn require_param<'a>(
    field: &str,
    rule: &'static str,
    params: &'a ParamBag,
    key: &'static str,
) -> Result<&'a Value, SchemaError> {
    params.get(key).ok_or_else(|| SchemaError::MissingParam {
        field: field.to_string(),
        rule,
        param: key,
    })
}

fn invalid_param(field: &str, rule: &'static str, param: &'static str, expected: &'static str) -> SchemaError {
    SchemaError::InvalidParam {
        field: field.to_string(),
        rule,
        param,
        expected,
    }
}

fn optional_u64(
    field: &str,
    rule: &'static str,
    params: &ParamBag,
    key: &'static str,
) -> Result<Option<u64>, SchemaError> {
    match params.get(key) {
        None => Ok(None),
        Some(v) => v
            .as_u64()
            .map(Some)
            .ok_or_else(|| invalid_param(field, rule, key, "a non-negative integer")),
    }
}

fn optional_f64(
    field: &str,
    rule: &'static str,
    params: &ParamBag,
    key: &'static str,
) -> Result<Option<f64>, SchemaError> {
    match params.get(key) {
        None => Ok(None),
        Some(v) => v
            .as_f64()
            .map(Some)
            .ok_or_else(|| invalid_param(field, rule, key, "a number")),
    }
}

fn bool_flag(
    field: &str,
    rule: &'static str,
    params: &ParamBag,
    key: &'static str,
) -> Result<bool, SchemaError> {
    match params.get(key) {
        None => Ok(false),
        Some(v) => v
            .as_bool()
            .ok_or_else(|| invalid_param(field, rule, key, "a boolean")),
    }
}

// --- required ---

struct RequiredFactory;

impl RuleFactory for RequiredFactory {
    fn name(&self) -> &'static str {
        "required"
    }

    fn compile(&self, _field: &str, _params: &ParamBag) -> Result<Box<dyn Rule>, SchemaError> {
        Ok(Box::new(RequiredRule))
    }
}

/// Fails iff the field was absent in the raw input (a defaulted field
/// never reaches validation at all).
struct RequiredRule;

impl Rule for RequiredRule {
    fn check(&self, ctx: &RuleContext<'_>) -> RuleOutcome {
        RuleOutcome::from_bool(ctx.present)
    }

    fn applies_when_absent(&self) -> bool {
        true
    }
}

// --- equals / not_equals ---

struct EqualsFactory {
    negate: bool,
}

impl RuleFactory for EqualsFactory {
    fn name(&self) -> &'static str {
        if self.negate {
            "not_equals"
        } else {
            "equals"
        }
    }

    fn compile(&self, field: &str, params: &ParamBag) -> Result<Box<dyn Rule>, SchemaError> {
        let expected = require_param(field, self.name(), params, "value")?;
        Ok(Box::new(EqualsRule {
            expected: value_text(expected),
            negate: self.negate,
        }))
    }
}

struct EqualsRule {
    expected: String,
    negate: bool,
}

impl Rule for EqualsRule {
    fn check(&self, ctx: &RuleContext<'_>) -> RuleOutcome {
        RuleOutcome::from_bool(equivalent(ctx.value, &self.expected) != self.negate)
    }
}

// --- email / telephone / uri ---

struct FormatFactory(FormatKind);

impl RuleFactory for FormatFactory {
    fn name(&self) -> &'static str {
        self.0.as_str()
    }

    fn compile(&self, _field: &str, _params: &ParamBag) -> Result<Box<dyn Rule>, SchemaError> {
        Ok(Box::new(FormatRule(self.0)))
    }
}

/// Delegates to the configured [`FormatCheckerPort`].
struct FormatRule(FormatKind);

impl Rule for FormatRule {
    fn check(&self, ctx: &RuleContext<'_>) -> RuleOutcome {
        match ctx.checker.check(self.0, ctx.value) {
            Ok(pass) => RuleOutcome::from_bool(pass),
            Err(err) => RuleOutcome::Degraded(err),
        }
    }
}

// --- regex ---

struct RegexFactory;

impl RuleFactory for RegexFactory {
    fn name(&self) -> &'static str {
        "regex"
    }

    fn compile(&self, field: &str, params: &ParamBag) -> Result<Box<dyn Rule>, SchemaError> {
        let pattern = require_param(field, "regex", params, "pattern")?
            .as_str()
            .ok_or_else(|| invalid_param(field, "regex", "pattern", "a string"))?;

        // Anchored at compile time: a substring match must not pass.
        let anchored = format!(r"\A(?:{})\z", pattern);
        let compiled = Regex::new(&anchored).map_err(|e| SchemaError::BadPattern {
            field: field.to_string(),
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Box::new(RegexRule(compiled)))
    }
}

struct RegexRule(Regex);

impl Rule for RegexRule {
    fn check(&self, ctx: &RuleContext<'_>) -> RuleOutcome {
        RuleOutcome::from_bool(self.0.is_match(ctx.value))
    }
}

// --- length ---

struct LengthFactory;

impl RuleFactory for LengthFactory {
    fn name(&self) -> &'static str {
        "length"
    }

    fn compile(&self, field: &str, params: &ParamBag) -> Result<Box<dyn Rule>, SchemaError> {
        Ok(Box::new(LengthRule {
            min: optional_u64(field, "length", params, "min")?,
            max: optional_u64(field, "length", params, "max")?,
        }))
    }
}

/// Character count (not bytes) within `[min, max]` inclusive; an omitted
/// bound is unbounded on that side.
struct LengthRule {
    min: Option<u64>,
    max: Option<u64>,
}

impl Rule for LengthRule {
    fn check(&self, ctx: &RuleContext<'_>) -> RuleOutcome {
        let count = ctx.value.chars().count() as u64;
        let pass = self.min.map_or(true, |min| count >= min)
            && self.max.map_or(true, |max| count <= max);
        RuleOutcome::from_bool(pass)
    }
}

// --- integer / numeric ---

struct IntegerFactory;

impl RuleFactory for IntegerFactory {
    fn name(&self) -> &'static str {
        "integer"
    }

    fn compile(&self, _field: &str, _params: &ParamBag) -> Result<Box<dyn Rule>, SchemaError> {
        Ok(Box::new(IntegerRule))
    }
}

struct IntegerRule;

impl Rule for IntegerRule {
    fn check(&self, ctx: &RuleContext<'_>) -> RuleOutcome {
        RuleOutcome::from_bool(is_integer_text(ctx.value))
    }
}

struct NumericFactory;

impl RuleFactory for NumericFactory {
    fn name(&self) -> &'static str {
        "numeric"
    }

    fn compile(&self, _field: &str, _params: &ParamBag) -> Result<Box<dyn Rule>, SchemaError> {
        Ok(Box::new(NumericRule))
    }
}

struct NumericRule;

impl Rule for NumericRule {
    fn check(&self, ctx: &RuleContext<'_>) -> RuleOutcome {
        RuleOutcome::from_bool(parse_numeric_text(ctx.value).is_some())
    }
}

// --- range ---

struct RangeFactory;

impl RuleFactory for RangeFactory {
    fn name(&self) -> &'static str {
        "range"
    }

    fn compile(&self, field: &str, params: &ParamBag) -> Result<Box<dyn Rule>, SchemaError> {
        Ok(Box::new(RangeRule {
            min: optional_f64(field, "range", params, "min")?,
            max: optional_f64(field, "range", params, "max")?,
            min_exclusive: bool_flag(field, "range", params, "min_exclusive")?,
            max_exclusive: bool_flag(field, "range", params, "max_exclusive")?,
        }))
    }
}

/// Fails on its own when the value is not numeric-parseable; it does not
/// suppress (or get suppressed by) a sibling `integer`/`numeric` rule.
struct RangeRule {
    min: Option<f64>,
    max: Option<f64>,
    min_exclusive: bool,
    max_exclusive: bool,
}

impl Rule for RangeRule {
    fn check(&self, ctx: &RuleContext<'_>) -> RuleOutcome {
        let Some(n) = parse_numeric_text(ctx.value) else {
            return RuleOutcome::Fail;
        };
        let above_min = self.min.map_or(true, |min| {
            if self.min_exclusive {
                n > min
            } else {
                n >= min
            }
        });
        let below_max = self.max.map_or(true, |max| {
            if self.max_exclusive {
                n < max
            } else {
                n <= max
            }
        });
        RuleOutcome::from_bool(above_min && below_max)
    }
}

// --- member_of / not_member_of ---

struct MemberFactory {
    negate: bool,
}

impl RuleFactory for MemberFactory {
    fn name(&self) -> &'static str {
        if self.negate {
            "not_member_of"
        } else {
            "member_of"
        }
    }

    fn compile(&self, field: &str, params: &ParamBag) -> Result<Box<dyn Rule>, SchemaError> {
        let values = require_param(field, self.name(), params, "values")?
            .as_array()
            .ok_or_else(|| invalid_param(field, self.name(), "values", "an array"))?;
        Ok(Box::new(MemberRule {
            members: values.iter().map(value_text).collect(),
            negate: self.negate,
        }))
    }
}

/// Equivalence rule applied against each element of the collection.
struct MemberRule {
    members: Vec<String>,
    negate: bool,
}

impl Rule for MemberRule {
    fn check(&self, ctx: &RuleContext<'_>) -> RuleOutcome {
        let found = self.members.iter().any(|m| equivalent(ctx.value, m));
        RuleOutcome::from_bool(found != self.negate)
    }
}

// --- matches / not_matches ---

struct MatchesFactory {
    negate: bool,
}

impl RuleFactory for MatchesFactory {
    fn name(&self) -> &'static str {
        if self.negate {
            "not_matches"
        } else {
            "matches"
        }
    }

    fn compile(&self, field: &str, params: &ParamBag) -> Result<Box<dyn Rule>, SchemaError> {
        let sibling = require_param(field, self.name(), params, "field")?
            .as_str()
            .ok_or_else(|| invalid_param(field, self.name(), "field", "a field name string"))?;
        Ok(Box::new(MatchesRule {
            sibling: sibling.to_string(),
            negate: self.negate,
        }))
    }
}

/// Compares against the sibling's phase-1 effective value, never its raw
/// input. A sibling that is absent with no default reads as empty.
struct MatchesRule {
    sibling: String,
    negate: bool,
}

impl Rule for MatchesRule {
    fn check(&self, ctx: &RuleContext<'_>) -> RuleOutcome {
        let sibling_value = ctx
            .resolved
            .get(&self.sibling)
            .map(String::as_str)
            .unwrap_or("");
        RuleOutcome::from_bool(equivalent(ctx.value, sibling_value) != self.negate)
    }
}
