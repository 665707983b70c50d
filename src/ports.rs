//! Collaborator Ports - Narrow Contracts For External Capabilities
//!
//! The engine never implements HTML purification or exhaustive format
//! grammars itself; it calls through these traits. A port failure degrades
//! the owning field only, never the run.

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

/// Failure raised by an external collaborator.
#[derive(Debug, Clone, Error)]
#[error("collaborator '{collaborator}' failed: {reason}")]
pub struct PortError {
    pub collaborator: String,
    pub reason: String,
}

impl PortError {
    pub fn new(collaborator: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            collaborator: collaborator.into(),
            reason: reason.into(),
        }
    }
}

/// External HTML purification capability.
///
/// Best-effort: implementations must not panic on malformed markup. The
/// engine treats an `Err` as identity plus a recorded collaborator failure.
pub trait PurifierPort: Send + Sync {
    fn purify(&self, html: &str) -> Result<String, PortError>;
}

/// Format family checked through [`FormatCheckerPort`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatKind {
    Email,
    Telephone,
    Uri,
}

impl FormatKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FormatKind::Email => "email",
            FormatKind::Telephone => "telephone",
            FormatKind::Uri => "uri",
        }
    }
}

/// Pluggable well-known-format checking capability.
///
/// Callers may override per deployment; [`RegexFormatChecker`] is the
/// built-in default.
pub trait FormatCheckerPort: Send + Sync {
    fn check(&self, kind: FormatKind, value: &str) -> Result<bool, PortError>;
}

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?(\.[A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?)*\.[A-Za-z]{2,}$").unwrap()
});

static TELEPHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[0-9]([0-9 ().\-]*[0-9])?$").unwrap());

static URI_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*://[^\s]+$").unwrap());

/// Conservative regex-based defaults. Deliberately stricter than the full
/// RFC grammars: a rejected exotic-but-legal address is a recoverable
/// outcome, a silently accepted bad one is not.
#[derive(Debug, Default, Clone, Copy)]
pub struct RegexFormatChecker;

impl FormatCheckerPort for RegexFormatChecker {
    fn check(&self, kind: FormatKind, value: &str) -> Result<bool, PortError> {
        let ok = match kind {
            FormatKind::Email => EMAIL_RE.is_match(value),
            FormatKind::Telephone => {
                // At least seven digits after stripping separators.
                TELEPHONE_RE.is_match(value)
                    && value.chars().filter(char::is_ascii_digit).count() >= 7
            }
            FormatKind::Uri => URI_RE.is_match(value),
        };
        Ok(ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(kind: FormatKind, value: &str) -> bool {
        RegexFormatChecker.check(kind, value).unwrap()
    }

    #[test]
    fn test_email_accepts_plain_addresses() {
        assert!(check(FormatKind::Email, "alice@example.com"));
        assert!(check(FormatKind::Email, "a.b+tag@sub.example.co"));
    }

    #[test]
    fn test_email_rejects_malformed() {
        assert!(!check(FormatKind::Email, "alice"));
        assert!(!check(FormatKind::Email, "alice@"));
        assert!(!check(FormatKind::Email, "@example.com"));
        assert!(!check(FormatKind::Email, "alice@example"));
        assert!(!check(FormatKind::Email, "a b@example.com"));
    }

    #[test]
    fn test_telephone() {
        assert!(check(FormatKind::Telephone, "+1 (555) 867-5309"));
        assert!(check(FormatKind::Telephone, "5558675309"));
        assert!(!check(FormatKind::Telephone, "555"));
        assert!(!check(FormatKind::Telephone, "call me"));
    }

    #[test]
    fn test_uri() {
        assert!(check(FormatKind::Uri, "https://example.com/a?b=c"));
        assert!(check(FormatKind::Uri, "ftp://files.example.com"));
        assert!(!check(FormatKind::Uri, "example.com"));
        assert!(!check(FormatKind::Uri, "http://has space.com"));
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(FormatKind::Email.as_str(), "email");
        assert_eq!(FormatKind::Telephone.as_str(), "telephone");
        assert_eq!(FormatKind::Uri.as_str(), "uri");
    }
}
