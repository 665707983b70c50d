//! FormGuard Core - Schema-Driven Request Validation
//!
//! # The Engine Rules (Non-Negotiable)
//! 1. Schemas Are Contracts (an invalid schema never runs)
//! 2. Resolve Before Validate (cross-field rules see sanitized siblings)
//! 3. Failures Are Data, Not Exceptions
//! 4. Deterministic Output
//! 5. Collaborators Degrade, The Run Continues

pub mod engine;
pub mod ports;
pub mod report;
pub mod sanitize;
pub mod schema;
pub mod validate;

pub use engine::{Engine, EngineConfig, EngineError, RawInput};
pub use ports::{FormatCheckerPort, FormatKind, PortError, PurifierPort, RegexFormatChecker};
pub use report::{FieldError, FieldReport, ValidationReport, COLLABORATOR_MESSAGE};
pub use sanitize::{ParamBag, SanitizeOutcome, Sanitizer, SanitizerFactory, SanitizerRegistry};
pub use schema::{ChainDefaults, FieldSpec, Schema, SchemaError};
pub use validate::{ResolvedValues, Rule, RuleContext, RuleFactory, RuleOutcome, RuleRegistry};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
