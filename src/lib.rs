//! Limn - an embeddable, arity-driven expression language
//!
//! This crate provides the core of a small Lisp-like language meant to be embedded in a
//! host application. Scripts manipulate host values through methods the host registers,
//! and the language itself supplies only tokenization, parsing, scoping and evaluation.
//!
//! ## Arity-Driven Syntax
//!
//! Calls are written prefix-style, but parentheses are optional. Each method declares its
//! parameters, and the parser uses that declaration to decide where an expression ends:
//!
//! ```text
//! + 1 * 3 2                 ; 7, `*` absorbs `3 2` before `+` gets its second argument
//! (+ 1 (* 3 (- 8 2)))       ; 19, parentheses only disambiguate
//! .. --step 4 1 20          ; optional parameters are passed as `--name value`
//! sum list 1 2 3 4 5        ; `list` declares a rest parameter and takes the remainder
//! def 'sq '$x '(* $x $x)    ; quoting defers evaluation
//! ```
//!
//! ## Embedding
//!
//! ```
//! use limn::{evaluate, Value};
//! use limn::builtins::create_global_env;
//!
//! let mut env = create_global_env();
//! env.store_value("$a", Value::Number(5));
//! env.store_value("$b", Value::Number(90));
//! let result = evaluate(&mut env, "+ $a (* 2 $b)").unwrap();
//! assert_eq!(result, Value::Number(185));
//! ```
//!
//! Host operations are registered as [`method::Method`] values via
//! [`environment::Environment::add_method`]; built-in and user-defined methods share one
//! calling convention implemented in [`binder`].
//!
//! ## Modules
//!
//! - `tokenizer`: lazy token stream over source text
//! - `parser`: arity-driven recursive descent into [`ast::Form`] trees
//! - `environment`: scope chain of frames with guaranteed scope release
//! - `method`: the method contract, native and user-defined
//! - `binder`: positional / optional / rest parameter binding
//! - `evaluator`: form evaluation and the [`evaluate`] entrypoint
//! - `builtins`: a small standard method library
//! - `json`: JSON data exchange with the host (feature `json`)

/// Maximum parsing depth to prevent stack overflow on deeply nested input.
/// Every nested argument, group and quote counts as one level.
pub const MAX_PARSE_DEPTH: usize = 64;

/// Maximum evaluation depth to prevent stack overflow in recursive evaluation.
/// Set higher than the parse depth to leave room for user-defined method recursion.
pub const MAX_EVAL_DEPTH: usize = 256;

/// Maximum length of a source snippet attached to lex and parse errors.
const MAX_CONTEXT: usize = 100;

/// Categorizes the different kinds of tokenization errors.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum LexErrorKind {
    /// A string literal was not closed before end of input
    UnterminatedString,
    /// A string literal contained an unknown escape sequence
    InvalidEscape,
    /// A token starts like a number but is not one (e.g. `12abc`)
    InvalidNumber,
    /// A numeric literal does not fit the number type
    NumberOutOfRange,
}

/// A malformed token.
#[derive(Debug, PartialEq, Clone, thiserror::Error)]
#[error("{message}{}", describe(.found, .context))]
pub struct LexError {
    pub kind: LexErrorKind,
    pub message: String,
    /// Context snippet from the input showing where the error occurred (max 100 chars)
    pub context: Option<String>,
    /// The offending text, if identifiable
    pub found: Option<String>,
}

impl LexError {
    pub(crate) fn at(
        kind: LexErrorKind,
        message: impl Into<String>,
        input: &str,
        offset: usize,
        found: Option<String>,
    ) -> Self {
        LexError {
            kind,
            message: message.into(),
            context: Some(source_context(input, offset)),
            found,
        }
    }
}

/// Categorizes the different kinds of parsing errors.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ParseErrorKind {
    /// Invalid or unexpected syntax (stray option flag, malformed JSON, ...)
    InvalidSyntax,
    /// Input ended before the expression was complete (empty input, unclosed group, dangling quote)
    Incomplete,
    /// A method call could not collect its required arguments before its boundary
    MissingArgument,
    /// A `--name` flag names no optional parameter of the call it belongs to
    UnknownOption,
    /// A closing delimiter with no matching opening delimiter
    UnexpectedClose,
    /// Extra input found after a complete top-level form
    TrailingContent,
    /// Form nesting exceeded [`MAX_PARSE_DEPTH`]
    TooDeeplyNested,
}

/// A structured error providing detailed information about a parsing failure.
#[derive(Debug, PartialEq, Clone, thiserror::Error)]
#[error("{message}{}", describe(.found, .context))]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    /// Context snippet from the input showing where the error occurred (max 100 chars)
    pub context: Option<String>,
    /// The problematic token encountered, if identifiable
    pub found: Option<String>,
}

impl ParseError {
    /// Create a ParseError with all fields
    pub fn new(
        kind: ParseErrorKind,
        message: impl Into<String>,
        context: Option<String>,
        found: Option<String>,
    ) -> Self {
        ParseError {
            kind,
            message: message.into(),
            context,
            found,
        }
    }

    /// Create a simple ParseError with a kind and message but no context
    pub fn from_message(kind: ParseErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind, message, None, None)
    }

    /// Create a ParseError with context extracted from input at a given offset
    pub fn with_context_and_found(
        kind: ParseErrorKind,
        message: impl Into<String>,
        input: &str,
        error_offset: usize,
        found: Option<String>,
    ) -> Self {
        Self::new(kind, message, Some(source_context(input, error_offset)), found)
    }
}

/// Categorizes the different kinds of evaluation errors.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum EvalErrorKind {
    /// A variable or method name is not bound in any visible frame
    UnboundName,
    /// A call names a binding that holds something other than a method
    NotAMethod,
    /// A `--name` flag names no optional parameter of the called method
    UnknownOption,
    /// Required positional parameters were left unfilled
    MissingArgument,
    /// More positional arguments than parameters, and no rest parameter
    UnexpectedArgument,
    /// An argument or result had the wrong type for its consumer
    TypeMismatch,
    /// A native method body failed; the host error is kept as the source
    MethodFailed,
    /// Evaluation nesting exceeded [`MAX_EVAL_DEPTH`]
    DepthLimit,
    /// A form that cannot be evaluated on its own (an option flag outside a call)
    InvalidForm,
}

/// A failure during evaluation.
#[derive(Debug, thiserror::Error)]
#[error("{message}{}", describe(&None, .context))]
pub struct EvalError {
    pub kind: EvalErrorKind,
    pub message: String,
    /// Name of the method being called when the error occurred, if any
    pub method: Option<String>,
    /// Rendering of the innermost call that failed
    pub context: Option<String>,
    /// Underlying host failure for [`EvalErrorKind::MethodFailed`]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl EvalError {
    pub fn new(kind: EvalErrorKind, message: impl Into<String>) -> Self {
        EvalError {
            kind,
            message: message.into(),
            method: None,
            context: None,
            source: None,
        }
    }

    /// Attach the name of the method whose call failed
    pub fn in_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub(crate) fn unbound(name: &str) -> Self {
        Self::new(EvalErrorKind::UnboundName, format!("Unbound name: {name}"))
    }

    pub fn type_mismatch(message: impl Into<String>) -> Self {
        Self::new(EvalErrorKind::TypeMismatch, message)
    }

    pub(crate) fn method_failed(
        method: &str,
        cause: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        EvalError {
            kind: EvalErrorKind::MethodFailed,
            message: format!("Method '{method}' failed: {cause}"),
            method: Some(method.to_owned()),
            context: None,
            source: Some(cause),
        }
    }
}

/// Error types for the interpreter
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("LexError: {0}")]
    Lex(#[from] LexError),
    #[error("ParseError: {0}")]
    Parse(#[from] ParseError),
    #[error("EvaluationError: {0}")]
    Eval(#[from] EvalError),
}

impl Error {
    /// Kind of the evaluation failure, if this is one
    pub fn eval_kind(&self) -> Option<EvalErrorKind> {
        match self {
            Error::Eval(e) => Some(e.kind),
            _ => None,
        }
    }

    /// Kind of the parse failure, if this is one
    pub fn parse_kind(&self) -> Option<ParseErrorKind> {
        match self {
            Error::Parse(e) => Some(e.kind),
            _ => None,
        }
    }
}

/// Render the optional `found` / `context` trailer shared by the error displays
fn describe(found: &Option<String>, context: &Option<String>) -> String {
    let mut out = String::new();
    if let Some(found) = found {
        out.push_str(&format!("\nFound: {found}"));
    }
    if let Some(context) = context {
        out.push_str(&format!("\nContext: {context}"));
    }
    out
}

/// Extract a display snippet of `input` around `error_offset` (a byte offset)
fn source_context(input: &str, error_offset: usize) -> String {
    // Try to show some context before the error
    let mut context_start = error_offset.saturating_sub(20).min(input.len());
    while !input.is_char_boundary(context_start) {
        context_start -= 1;
    }

    let context_str: String = input[context_start..].chars().take(MAX_CONTEXT).collect();

    let mut display_context = String::new();
    if context_start > 0 {
        display_context.push_str("[...]");
    }
    display_context.push_str(&context_str);
    if context_start + context_str.len() < input.len() {
        display_context.push_str("[...]");
    }

    // Replace newlines with visible markers for better error display
    display_context.replace('\n', "\\n").replace('\r', "")
}

/// Parser options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseConfig {
    /// Treat `#` at the start of a token as a comment running to end of line
    pub handle_comments: bool,
}

pub mod ast;
pub mod binder;
pub mod builtins;
pub mod environment;
pub mod evaluator;
pub mod method;
pub mod parser;
pub mod tokenizer;

#[cfg(feature = "json")]
pub mod json;

pub use ast::{Form, RangeValue, Value};
pub use binder::BoundArgs;
pub use environment::Environment;
pub use evaluator::{eval, evaluate, evaluate_with_config};
pub use method::{Method, ParameterSpec};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_context_elides_both_ends() {
        let input = format!("{}X{}", "a".repeat(40), "b".repeat(200));
        let context = source_context(&input, 40);
        assert!(context.starts_with("[...]"));
        assert!(context.ends_with("[...]"));
        assert!(context.contains('X'));
    }

    #[test]
    fn test_source_context_short_input_and_newlines() {
        assert_eq!(source_context("+ 1\n2", 2), "+ 1\\n2");
        assert_eq!(source_context("", 10), "");
    }

    #[test]
    fn test_error_display_prefixes() {
        let parse = Error::from(ParseError::from_message(
            ParseErrorKind::Incomplete,
            "Unexpected end of input",
        ));
        assert_eq!(format!("{parse}"), "ParseError: Unexpected end of input");

        let eval = Error::from(EvalError::unbound("$x"));
        assert_eq!(format!("{eval}"), "EvaluationError: Unbound name: $x");
        assert_eq!(eval.eval_kind(), Some(EvalErrorKind::UnboundName));
        assert_eq!(eval.parse_kind(), None);
    }

    #[test]
    fn test_method_failure_keeps_source() {
        use std::error::Error as _;

        let cause: Box<dyn std::error::Error + Send + Sync> = "division by zero".into();
        let err = EvalError::method_failed("/", cause);
        assert_eq!(err.kind, EvalErrorKind::MethodFailed);
        assert_eq!(err.method.as_deref(), Some("/"));
        assert!(err.to_string().contains("division by zero"));
        assert!(err.source().is_some());
    }
}
