use crate::term::Kind;
use thiserror::Error;

/// Recoverable (domain) failure conditions reported by the core.
///
/// These are expected outcomes during a search and callers are meant to
/// backtrack on them. Engine-invariant violations, by contrast, are
/// programming errors and panic instead of surfacing here.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// A term resolved to a literal of the wrong kind, e.g. an atom where
    /// a number was required.
    #[error("type mismatch: expected {expected} term, found {found}")]
    TypeMismatch {
        /// The kind the caller required.
        expected: Kind,
        /// Rendering of the term actually found.
        found: String,
    },

    /// A value was required but the argument is still a free variable.
    #[error("argument {var} is not sufficiently instantiated (expected {expected} term)")]
    NotInstantiated {
        /// Name of the still-free variable.
        var: String,
        /// The kind the caller required.
        expected: Kind,
    },
}
