//! Courier Expression Language
//!
//! A small expression language used for computed bindings (`{{ x = a + 1 }}`),
//! request body calls (`json({ id })`) and script steps in flows.
//!
//! Values are JSON values. Numbers keep their source text, so `1.50`
//! stays `1.50` until arithmetic touches it.
//!
//! # Example
//!
//! ```rust
//! use courier_expr::{parse_program, Bindings, Evaluator, Interpreter};
//! use serde_json::json;
//!
//! let program = parse_program("x = x + 1").unwrap();
//! let mut env = Bindings::new();
//! env.insert("x".into(), json!(5));
//! let assigned = Interpreter.execute(&program, &env).unwrap();
//! assert_eq!(assigned["x"], json!(6));
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod ast;
pub mod interpreter;
pub mod lexer;
pub mod parser;
pub mod value;

pub use ast::{BinaryOp, Expr, Program, UnaryOp};
pub use interpreter::{is_builtin, Evaluator, Interpreter};
pub use parser::{parse_expression, parse_program};
pub use value::{lookup_path, loosely_equal, number, to_text, truthy, Bindings};

/// Expression errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExprError {
    /// Unrecognised character
    #[error("unexpected character {text:?} at {offset}")]
    Lex {
        /// Byte offset into the source
        offset: usize,
        /// Offending text
        text: String,
    },

    /// Syntax error
    #[error("syntax error at {offset}: {message}")]
    Parse {
        /// Byte offset into the source
        offset: usize,
        /// What went wrong
        message: String,
    },

    /// Identifier has no binding
    #[error("unbound identifier `{0}`")]
    Unbound(String),

    /// Runtime failure
    #[error("evaluation failed: {0}")]
    Eval(String),
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
