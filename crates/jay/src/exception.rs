//! Error taxonomy: parse errors, ECMA exceptions, fatal errors.
//!
//! Parse errors are structured codes with a source position and never commit
//! byte code. ECMA exceptions travel on the error channel of [`JsResult`] as a
//! [`Throw`] wrapping the thrown value. Fatal errors are routed through the
//! host port and do not return.

use std::fmt::{self, Display};

use strum::{Display as StrumDisplay, EnumString, IntoStaticStr};

use crate::value::Value;

/// Result type alias for operations that can raise an ECMA exception.
pub(crate) type JsResult<T> = Result<T, Throw>;

/// An ECMA exception in flight.
///
/// The carried value owns one reference when it is heap allocated; whoever
/// consumes the `Throw` must release it against the heap (or hand it to the
/// embedder, which takes over the reference).
#[derive(Debug)]
pub(crate) struct Throw(pub(crate) Value);

/// Standard error constructors of ECMA-262 v5, section 15.11.
///
/// The string representation is the ECMA-visible constructor name and the
/// value of the prototype's `name` property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, StrumDisplay, EnumString, IntoStaticStr)]
pub enum ExcKind {
    Error,
    TypeError,
    ReferenceError,
    SyntaxError,
    RangeError,
    EvalError,
    #[strum(serialize = "URIError")]
    UriError,
}

/// Parse error codes raised by the compiler.
///
/// Grouped roughly by the grammar production that raises them. The compiler
/// frame unwinds on the first error; no byte code is committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseErrorKind {
    PrimaryExpExpected,
    LeftParenExpected,
    RightParenExpected,
    RightSquareExpected,
    RightBraceExpected,
    LeftBraceExpected,
    ColonExpected,
    ColonForConditionalExpected,
    SemicolonExpected,
    IdentifierExpected,
    ArrayItemSeparatorExpected,
    ObjectItemSeparatorExpected,
    ArgumentLimitReached,
    LiteralLimitReached,
    EvalCannotAssigned,
    ArgumentsCannotAssigned,
    InvalidCharacter,
    InvalidNumber,
    UnterminatedString,
    UnterminatedRegexp,
    InvalidRegexpFlags,
    StatementExpected,
    InExpected,
    WhileExpected,
    JumpLimitReached,
}

impl ParseErrorKind {
    /// Human readable message, used for the SyntaxError the host observes.
    #[must_use]
    pub fn message(self) -> &'static str {
        match self {
            Self::PrimaryExpExpected => "primary expression expected",
            Self::LeftParenExpected => "'(' expected",
            Self::RightParenExpected => "')' expected",
            Self::RightSquareExpected => "']' expected",
            Self::RightBraceExpected => "'}' expected",
            Self::LeftBraceExpected => "'{' expected",
            Self::ColonExpected => "':' expected",
            Self::ColonForConditionalExpected => "':' expected for conditional expression",
            Self::SemicolonExpected => "';' expected",
            Self::IdentifierExpected => "identifier expected",
            Self::ArrayItemSeparatorExpected => "',' or ']' expected",
            Self::ObjectItemSeparatorExpected => "',' or '}' expected",
            Self::ArgumentLimitReached => "argument limit reached",
            Self::LiteralLimitReached => "literal limit reached",
            Self::EvalCannotAssigned => "'eval' cannot be assigned in strict mode",
            Self::ArgumentsCannotAssigned => "'arguments' cannot be assigned in strict mode",
            Self::InvalidCharacter => "invalid character",
            Self::InvalidNumber => "invalid number literal",
            Self::UnterminatedString => "unterminated string literal",
            Self::UnterminatedRegexp => "unterminated regular expression literal",
            Self::InvalidRegexpFlags => "invalid regular expression flags",
            Self::StatementExpected => "statement expected",
            Self::InExpected => "'in' expected",
            Self::WhileExpected => "'while' expected",
            Self::JumpLimitReached => "branch distance limit reached",
        }
    }
}

/// A structured parse error with its source position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    /// 1-based source line.
    pub line: u32,
    /// 1-based source column.
    pub column: u32,
}

impl Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SyntaxError: {} at {}:{}", self.kind.message(), self.line, self.column)
    }
}

impl std::error::Error for ParseError {}

/// Fatal error codes reported through the host port.
///
/// The port's `fatal` contract is that it terminates the process; these codes
/// exist so embedders can distinguish the cause before dying.
#[derive(Debug, Clone, Copy, PartialEq, Eq, StrumDisplay, IntoStaticStr)]
pub enum FatalCode {
    #[strum(serialize = "ERR_OUT_OF_MEMORY")]
    OutOfMemory,
    #[strum(serialize = "ERR_SYSCALL")]
    Syscall,
    #[strum(serialize = "ERR_REF_COUNT_LIMIT")]
    RefCountLimit,
    #[strum(serialize = "ERR_UNIMPLEMENTED_CASE")]
    UnimplementedCase,
    #[strum(serialize = "ERR_FAILED_INTERNAL_ASSERTION")]
    FailedInternalAssertion,
}

/// An exception as observed by the embedder.
///
/// Produced from a [`Throw`] when an error crosses the API boundary: the
/// engine extracts `name`/`message` from error objects and stringifies other
/// thrown values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exception {
    /// The standard error kind, when the thrown value was a standard error.
    pub kind: Option<ExcKind>,
    /// The error message, or the string conversion of the thrown value.
    pub message: String,
}

impl Exception {
    pub(crate) fn new(kind: Option<ExcKind>, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Builds the public exception for a parse failure.
    #[must_use]
    pub(crate) fn from_parse_error(error: ParseError) -> Self {
        Self::new(Some(ExcKind::SyntaxError), error.to_string())
    }
}

impl Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            Some(kind) => write!(f, "{kind}: {}", self.message),
            None => write!(f, "uncaught: {}", self.message),
        }
    }
}

impl std::error::Error for Exception {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_display_carries_position() {
        let error = ParseError {
            kind: ParseErrorKind::RightParenExpected,
            line: 3,
            column: 14,
        };
        assert_eq!(error.to_string(), "SyntaxError: ')' expected at 3:14");
    }

    #[test]
    fn exc_kind_names_match_ecma() {
        assert_eq!(ExcKind::TypeError.to_string(), "TypeError");
        assert_eq!(ExcKind::UriError.to_string(), "URIError");
        assert_eq!("ReferenceError".parse::<ExcKind>().unwrap(), ExcKind::ReferenceError);
    }

    #[test]
    fn fatal_codes_use_original_spellings() {
        assert_eq!(FatalCode::OutOfMemory.to_string(), "ERR_OUT_OF_MEMORY");
        assert_eq!(FatalCode::FailedInternalAssertion.to_string(), "ERR_FAILED_INTERNAL_ASSERTION");
    }
}
