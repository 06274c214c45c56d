//! Unified error types for the HeishaMon rule engine.
//!
//! A single [`Error`] enum every engine path converts into.  The variants
//! map onto the propagation policy:
//!
//! | Variant             | Recoverable | Effect                                   |
//! |---------------------|-------------|------------------------------------------|
//! | `Parse`             | yes         | reload aborted, previous rules retained  |
//! | `AllocationFailure` | no          | logged, then controlled restart          |
//! | `LookupMiss`        | yes         | logged, treated as a no-op               |
//! | `TypeMismatch`      | yes         | the expression yields `Null`             |
//! | `RuleCycle`         | yes         | the chained call is skipped              |

use core::fmt;

use crate::app::ports::StorageError;

/// Offending token text carried by a [`ParseError`].
pub type TokenText = heapless::String<32>;

// ---------------------------------------------------------------------------
// Parse errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseReason {
    /// The token cannot appear here.
    UnexpectedToken,
    /// Source ended inside a block or expression.
    UnexpectedEnd,
    /// Numeric literal does not fit the value model.
    InvalidNumber,
    /// Identifier longer than a symbol can hold.
    NameTooLong,
    /// Sigil-prefixed name that matches no registry entry.
    UnknownIdentifier,
    /// Assignment to a time or sensor binding.
    ReadOnlyTarget,
    /// Event name that can never fire.
    InvalidEventName,
    UnknownFunction,
    BadArity,
    /// Call statement naming a rule that does not exist.
    UnknownRule,
    DuplicateRule,
    /// Compiled program would exceed the configured node capacity.
    ArenaExhausted,
    TooManyRules,
    /// Expression or block nesting beyond the parser's recursion limit.
    NestingTooDeep,
}

impl fmt::Display for ParseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedToken => write!(f, "unexpected token"),
            Self::UnexpectedEnd => write!(f, "unexpected end of rules"),
            Self::InvalidNumber => write!(f, "invalid number"),
            Self::NameTooLong => write!(f, "name too long"),
            Self::UnknownIdentifier => write!(f, "unknown identifier"),
            Self::ReadOnlyTarget => write!(f, "cannot assign to read-only binding"),
            Self::InvalidEventName => write!(f, "invalid event name"),
            Self::UnknownFunction => write!(f, "unknown function"),
            Self::BadArity => write!(f, "wrong number of arguments"),
            Self::UnknownRule => write!(f, "unknown rule"),
            Self::DuplicateRule => write!(f, "duplicate rule"),
            Self::ArenaExhausted => write!(f, "rules memory exhausted"),
            Self::TooManyRules => write!(f, "too many rules"),
            Self::NestingTooDeep => write!(f, "nesting too deep"),
        }
    }
}

/// Compile failure with the 1-based source line it was detected on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub line: u32,
    pub reason: ParseReason,
    pub token: TokenText,
}

impl ParseError {
    pub fn new(line: u32, reason: ParseReason, token: &str) -> Self {
        let mut end = token.len().min(32);
        while !token.is_char_boundary(end) {
            end -= 1;
        }
        let mut text = TokenText::new();
        let _ = text.push_str(&token[..end]);
        Self {
            line,
            reason,
            token: text,
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.token.is_empty() {
            write!(f, "line {}: {}", self.line, self.reason)
        } else {
            write!(f, "line {}: {} '{}'", self.line, self.reason, self.token)
        }
    }
}

// ---------------------------------------------------------------------------
// Runtime lookups
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupMiss {
    Rule,
    Topic,
    Command,
    DeviceField,
    Sensor,
}

impl fmt::Display for LookupMiss {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rule => write!(f, "rule not found"),
            Self::Topic => write!(f, "topic not found"),
            Self::Command => write!(f, "command not recognized"),
            Self::DeviceField => write!(f, "device field not found"),
            Self::Sensor => write!(f, "sensor not found"),
        }
    }
}

// ---------------------------------------------------------------------------
// Top-level engine error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    Parse(ParseError),
    /// Memory exhaustion while growing a variable table.
    AllocationFailure(&'static str),
    LookupMiss(LookupMiss),
    TypeMismatch,
    /// Rule chaining exceeded the depth limit or re-entered a running rule.
    RuleCycle { rule: u16, depth: u8 },
    /// The rule source could not be read.
    Source(StorageError),
    /// No rule set is loaded.
    NotLoaded,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(e) => write!(f, "parse: {e}"),
            Self::AllocationFailure(what) => write!(f, "out of memory: {what}"),
            Self::LookupMiss(e) => write!(f, "lookup: {e}"),
            Self::TypeMismatch => write!(f, "type mismatch"),
            Self::RuleCycle { rule, depth } => {
                write!(f, "rule cycle at rule {rule} (depth {depth})")
            }
            Self::Source(e) => write!(f, "rule source: {e}"),
            Self::NotLoaded => write!(f, "no rules loaded"),
        }
    }
}

impl From<ParseError> for Error {
    fn from(e: ParseError) -> Self {
        Self::Parse(e)
    }
}

impl From<LookupMiss> for Error {
    fn from(e: LookupMiss) -> Self {
        Self::LookupMiss(e)
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Source(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Engine-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
