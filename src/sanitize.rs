//! Sanitizer Pipeline - Ordered, Pure, Idempotent String Transforms
//!
//! Sanitizers run in declared order during phase 1, only on a present field
//! with no default. Every built-in is idempotent: applying it to its own
//! output changes nothing.

use serde_json::Value;
use std::collections::HashMap;

use crate::ports::{PortError, PurifierPort};
use crate::schema::SchemaError;

/// Parameter bag attached to one sanitizer or validator entry.
pub type ParamBag = serde_json::Map<String, Value>;

/// Result of applying one sanitizer.
pub struct SanitizeOutcome {
    pub value: String,
    /// Set when an external port errored and the transform degraded to
    /// identity for this field.
    pub degraded: Option<PortError>,
}

impl SanitizeOutcome {
    pub fn clean(value: String) -> Self {
        Self {
            value,
            degraded: None,
        }
    }
}

/// A compiled sanitizer: a pure `string -> string` transform.
pub trait Sanitizer: Send + Sync {
    fn name(&self) -> &str;
    fn apply(&self, input: &str, purifier: Option<&dyn PurifierPort>) -> SanitizeOutcome;
}

/// Compiles a named sanitizer entry from its schema params.
pub trait SanitizerFactory: Send + Sync {
    fn name(&self) -> &'static str;
    fn compile(&self, field: &str, params: &ParamBag) -> Result<Box<dyn Sanitizer>, SchemaError>;
}

/// Name -> factory lookup. New transforms are registered here; the
/// orchestrator never switches on sanitizer names.
pub struct SanitizerRegistry {
    factories: HashMap<&'static str, Box<dyn SanitizerFactory>>,
}

impl SanitizerRegistry {
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with the built-in set: `raw`, `purge`, `escape`, `purify`.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(RawFactory));
        registry.register(Box::new(PurgeFactory));
        registry.register(Box::new(EscapeFactory));
        registry.register(Box::new(PurifyFactory));
        registry
    }

    pub fn register(&mut self, factory: Box<dyn SanitizerFactory>) {
        self.factories.insert(factory.name(), factory);
    }

    pub fn compile(
        &self,
        field: &str,
        name: &str,
        params: &ParamBag,
    ) -> Result<Box<dyn Sanitizer>, SchemaError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| SchemaError::UnknownSanitizer {
                field: field.to_string(),
                name: name.to_string(),
            })?;
        factory.compile(field, params)
    }
}

/// The character set `purge` removes and `escape` encodes.
fn is_hostile(c: char) -> bool {
    matches!(c, '\'' | '"' | '<' | '>' | '&') || (c as u32) < 32
}

// --- raw ---

struct RawFactory;

impl SanitizerFactory for RawFactory {
    fn name(&self) -> &'static str {
        "raw"
    }

    fn compile(&self, _field: &str, _params: &ParamBag) -> Result<Box<dyn Sanitizer>, SchemaError> {
        Ok(Box::new(RawSanitizer))
    }
}

/// Explicit opt-out. Sanitizers listed after it still apply.
struct RawSanitizer;

impl Sanitizer for RawSanitizer {
    fn name(&self) -> &str {
        "raw"
    }

    fn apply(&self, input: &str, _purifier: Option<&dyn PurifierPort>) -> SanitizeOutcome {
        SanitizeOutcome::clean(input.to_string())
    }
}

// --- purge ---

struct PurgeFactory;

impl SanitizerFactory for PurgeFactory {
    fn name(&self) -> &'static str {
        "purge"
    }

    fn compile(&self, _field: &str, _params: &ParamBag) -> Result<Box<dyn Sanitizer>, SchemaError> {
        Ok(Box::new(PurgeSanitizer))
    }
}

/// Deletes `'`, `"`, `<`, `>`, `&` and all control characters below 0x20.
struct PurgeSanitizer;

impl Sanitizer for PurgeSanitizer {
    fn name(&self) -> &str {
        "purge"
    }

    fn apply(&self, input: &str, _purifier: Option<&dyn PurifierPort>) -> SanitizeOutcome {
        SanitizeOutcome::clean(input.chars().filter(|c| !is_hostile(*c)).collect())
    }
}

// --- escape ---

struct EscapeFactory;

impl SanitizerFactory for EscapeFactory {
    fn name(&self) -> &'static str {
        "escape"
    }

    fn compile(&self, _field: &str, _params: &ParamBag) -> Result<Box<dyn Sanitizer>, SchemaError> {
        Ok(Box::new(EscapeSanitizer))
    }
}

/// Replaces the hostile set with reversible entity references.
///
/// An `&` that already begins an entity this sanitizer produces is passed
/// through verbatim; that is what makes the transform idempotent.
struct EscapeSanitizer;

impl Sanitizer for EscapeSanitizer {
    fn name(&self) -> &str {
        "escape"
    }

    fn apply(&self, input: &str, _purifier: Option<&dyn PurifierPort>) -> SanitizeOutcome {
        let mut out = String::with_capacity(input.len());
        for (i, c) in input.char_indices() {
            match c {
                '\'' => out.push_str("&#39;"),
                '"' => out.push_str("&quot;"),
                '<' => out.push_str("&lt;"),
                '>' => out.push_str("&gt;"),
                '&' => {
                    if starts_with_entity(&input[i..]) {
                        out.push('&');
                    } else {
                        out.push_str("&amp;");
                    }
                }
                c if (c as u32) < 32 => {
                    out.push_str(&format!("&#{};", c as u32));
                }
                c => out.push(c),
            }
        }
        SanitizeOutcome::clean(out)
    }
}

/// True when `s` (starting at `&`) begins one of the entity forms
/// `escape` itself emits.
fn starts_with_entity(s: &str) -> bool {
    let rest = &s[1..];
    if rest.starts_with("amp;")
        || rest.starts_with("quot;")
        || rest.starts_with("lt;")
        || rest.starts_with("gt;")
    {
        return true;
    }
    if let Some(body) = rest.strip_prefix('#') {
        if let Some(end) = body.find(';') {
            let digits = &body[..end];
            return !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit());
        }
    }
    false
}

// --- purify ---

struct PurifyFactory;

impl SanitizerFactory for PurifyFactory {
    fn name(&self) -> &'static str {
        "purify"
    }

    fn compile(&self, _field: &str, _params: &ParamBag) -> Result<Box<dyn Sanitizer>, SchemaError> {
        Ok(Box::new(PurifySanitizer))
    }
}

/// Delegates to the configured [`PurifierPort`]. A missing or failing port
/// degrades to identity and records a collaborator failure; it never aborts
/// the run.
struct PurifySanitizer;

impl Sanitizer for PurifySanitizer {
    fn name(&self) -> &str {
        "purify"
    }

    fn apply(&self, input: &str, purifier: Option<&dyn PurifierPort>) -> SanitizeOutcome {
        match purifier {
            Some(port) => match port.purify(input) {
                Ok(value) => SanitizeOutcome::clean(value),
                Err(err) => SanitizeOutcome {
                    value: input.to_string(),
                    degraded: Some(err),
                },
            },
            None => SanitizeOutcome {
                value: input.to_string(),
                degraded: Some(PortError::new("purify", "no purifier port configured")),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(name: &str, input: &str) -> String {
        let registry = SanitizerRegistry::builtin();
        let sanitizer = registry.compile("f", name, &ParamBag::new()).unwrap();
        sanitizer.apply(input, None).value
    }

    #[test]
    fn test_raw_is_identity() {
        assert_eq!(apply("raw", "<b>'&\"</b>"), "<b>'&\"</b>");
    }

    #[test]
    fn test_purge_strips_hostile_set() {
        assert_eq!(apply("purge", "a<b>'c\"&d"), "abcd");
        assert_eq!(apply("purge", "line1\nline2\ttab\u{1}"), "line1line2tab");
    }

    #[test]
    fn test_purge_idempotent() {
        let once = apply("purge", "<script>alert('x')</script>");
        let twice = apply("purge", &once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_escape_encodes_hostile_set() {
        assert_eq!(
            apply("escape", r#"<a href="x">'&"#),
            "&lt;a href=&quot;x&quot;&gt;&#39;&amp;"
        );
        assert_eq!(apply("escape", "a\nb"), "a&#10;b");
    }

    #[test]
    fn test_escape_idempotent() {
        let once = apply("escape", "<p>Tom & Jerry's \"show\"</p>\n");
        let twice = apply("escape", &once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_escape_preserves_own_entities() {
        assert_eq!(apply("escape", "&amp; &#39; &#10;"), "&amp; &#39; &#10;");
        // A bare ampersand that does not open an entity is still escaped.
        assert_eq!(apply("escape", "&amp &x;"), "&amp;amp &amp;x;");
    }

    #[test]
    fn test_purify_without_port_degrades() {
        let registry = SanitizerRegistry::builtin();
        let sanitizer = registry.compile("bio", "purify", &ParamBag::new()).unwrap();
        let outcome = sanitizer.apply("<b>hi</b>", None);
        assert_eq!(outcome.value, "<b>hi</b>");
        assert!(outcome.degraded.is_some());
    }

    #[test]
    fn test_purify_uses_port() {
        struct Upper;
        impl PurifierPort for Upper {
            fn purify(&self, html: &str) -> Result<String, PortError> {
                Ok(html.replace("<b>", "").replace("</b>", ""))
            }
        }

        let registry = SanitizerRegistry::builtin();
        let sanitizer = registry.compile("bio", "purify", &ParamBag::new()).unwrap();
        let outcome = sanitizer.apply("<b>hi</b>", Some(&Upper));
        assert_eq!(outcome.value, "hi");
        assert!(outcome.degraded.is_none());
    }

    #[test]
    fn test_unknown_sanitizer_rejected() {
        let registry = SanitizerRegistry::builtin();
        let err = registry
            .compile("f", "trim", &ParamBag::new())
            .err()
            .unwrap();
        assert!(err.to_string().contains("trim"));
    }
}
