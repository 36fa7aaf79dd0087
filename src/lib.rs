//! ConsLisp - a minimal Lisp built from cons cells
//!
//! This crate reads textual S-expressions into an immutable graph of pairs, numbers and
//! interned symbols, and evaluates them against a chain of lexical environments.
//!
//! ```lisp
//! (DEFUN SQUARE (X) (* X X))    ; user-defined function
//! (SQUARE 7)                    ; => 49
//! (COND ((< 1 2) 'YES) (TRUE 'NO))
//! (CONS 1 '(2 3))               ; => (1 2 3)
//! (DEFUN F (A . REST) REST)     ; variadic rest parameter
//! ```
//!
//! ## Language summary
//!
//! - Symbols are case-insensitive: `foo`, `Foo` and `FOO` are the same interned symbol.
//! - `NIL` is both the empty list and false; every other value (including `0`) is true.
//! - Special forms: `QUOTE`, `SET`, `DEFUN`, `COND`, `PRINT`.
//! - Primitives: `CAR`, `CDR`, `CONS`, `LIST`, `ATOM?`, `EQ?`, `EQUAL?`, `+`, `-`, `*`, `/`, `<`, `>`.
//! - Numbers are signed 64-bit integers and wrap on overflow.
//!
//! ## Modules
//!
//! - `symbol`: process-wide symbol interning
//! - `ast`: the expression model and its printed form
//! - `builtinops`: the closed set of special forms and primitives
//! - `reader`: tokenizer and recursive-descent parser
//! - `evaluator`: environments and the evaluation engine
//!
//! ```
//! use conslisp::Interpreter;
//!
//! let mut lisp = Interpreter::new();
//! lisp.eval_str("(DEFUN ADD1 (X) (+ X 1))").unwrap();
//! let result = lisp.eval_str("(ADD1 5)").unwrap();
//! assert_eq!(result.to_string(), "6");
//! ```

use std::fmt;

use crate::builtinops::Arity;

/// Parse depth used by [`Config::bounded`]
pub const MAX_PARSE_DEPTH: usize = 256;

/// Evaluation depth used by [`Config::bounded`]
/// Each closure call, argument and special-form operand adds one level
pub const MAX_EVAL_DEPTH: usize = 512;

/// Limits applied by the reader and the evaluator.
///
/// The default imposes no limits: nesting and recursion are bounded only by the host
/// stack. Hosts that must survive arbitrary input (such as the REPL) should use
/// [`Config::bounded`], which turns deep nesting into recoverable errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Config {
    pub max_parse_depth: Option<usize>,
    pub max_eval_depth: Option<usize>,
}

impl Config {
    pub fn bounded() -> Self {
        Config {
            max_parse_depth: Some(MAX_PARSE_DEPTH),
            max_eval_depth: Some(MAX_EVAL_DEPTH),
        }
    }
}

/// Categorizes the different kinds of syntax errors.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ParseErrorKind {
    /// Unexpected token (stray `)`, misplaced `.`, malformed dotted pair)
    InvalidSyntax,
    /// Input ended before the expression was complete (unclosed list, dangling quote)
    Incomplete,
    /// Expression nesting exceeded the configured parse depth
    TooDeeplyNested,
    /// The source contained no expression at all
    EmptyInput,
}

/// A structured error providing detailed information about a syntax failure.
#[derive(Debug, PartialEq, Clone)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    /// Context snippet from the input showing where the error occurred (max 100 chars)
    pub context: Option<String>,
    /// The problematic token encountered, if identifiable
    pub found: Option<String>,
}

impl ParseError {
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

    /// Create a ParseError with context extracted from input around a byte offset
    pub fn with_context(
        kind: ParseErrorKind,
        message: impl Into<String>,
        input: &str,
        error_offset: usize,
        found: Option<String>,
    ) -> Self {
        const MAX_CONTEXT: usize = 100;
        const LEAD_IN: usize = 20;

        let error_char = input
            .char_indices()
            .take_while(|(i, _)| *i < error_offset)
            .count();
        let context_start = error_char.saturating_sub(LEAD_IN);

        let context_str: String = input
            .chars()
            .skip(context_start)
            .take(MAX_CONTEXT)
            .collect();

        let mut display_context = String::new();
        if context_start > 0 {
            display_context.push_str("[...]");
        }
        display_context.push_str(&context_str);
        if context_start + context_str.chars().count() < input.chars().count() {
            display_context.push_str("[...]");
        }

        let display_context = display_context.replace('\n', "\\n").replace('\r', "");

        Self::new(kind, message, Some(display_context), found)
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(found) = &self.found {
            write!(f, "\nFound: {found}")?;
        }
        if let Some(context) = &self.context {
            write!(f, "\nContext: {context}")?;
        }
        Ok(())
    }
}

/// Error types for the reader and the evaluator
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("SyntaxError: {0}")]
    Syntax(ParseError),
    #[error("Unbound symbol: {0}")]
    UnboundSymbol(String),
    #[error("Not a list: {0}")]
    NotAList(String),
    #[error("ArityMismatch: {operator} expected {expected} arguments, got {got}")]
    ArityMismatch {
        operator: String,
        expected: Arity,
        got: usize,
    },
    #[error("Type error: {0}")]
    TypeMismatch(String),
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Unknown operator: {0}")]
    UnknownOperator(String),
    #[error("Evaluation depth limit exceeded (max: {0})")]
    DepthLimitExceeded(usize),
    #[error("Output error: {0}")]
    Output(String),
}

impl Error {
    pub fn arity_mismatch(operator: impl Into<String>, expected: Arity, got: usize) -> Self {
        Error::ArityMismatch {
            operator: operator.into(),
            expected,
            got,
        }
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        Error::Syntax(err)
    }
}

pub mod ast;
pub mod builtinops;
pub mod evaluator;
pub mod reader;
pub mod symbol;

pub use ast::{Closure, Expr, NumberType, Pair};
pub use evaluator::environment::Environment;
pub use evaluator::{Evaluator, Interpreter, create_global_env, evaluate_source};
pub use reader::{Reader, parse, parse_all};
pub use symbol::{Symbol, intern};
