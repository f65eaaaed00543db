//! Expression AST

use serde_json::Value;
use std::fmt::{self, Display, Formatter};

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `!`
    Not,
    /// `-`
    Neg,
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Rem,
    /// `==`
    Eq,
    /// `!=`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
    /// `&&`
    And,
    /// `||`
    Or,
    /// `??`
    Coalesce,
}

/// Expression node
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Number, string, boolean or null literal
    Literal(Value),
    /// Bound identifier
    Ident(String),
    /// String literal containing `{{...}}` placeholders
    Interpolation(String),
    /// Prefix operator
    Unary {
        /// Operator
        op: UnaryOp,
        /// Operand
        expr: Box<Expr>,
    },
    /// Infix operator
    Binary {
        /// Operator
        op: BinaryOp,
        /// Left operand
        left: Box<Expr>,
        /// Right operand
        right: Box<Expr>,
    },
    /// `cond ? then : otherwise`
    Conditional {
        /// Condition
        cond: Box<Expr>,
        /// Value when truthy
        then: Box<Expr>,
        /// Value when falsy
        otherwise: Box<Expr>,
    },
    /// `object.property`
    Member {
        /// Receiver
        object: Box<Expr>,
        /// Property name
        property: String,
    },
    /// `object[index]`
    Index {
        /// Receiver
        object: Box<Expr>,
        /// Index expression
        index: Box<Expr>,
    },
    /// `callee(args...)`
    Call {
        /// Function expression
        callee: Box<Expr>,
        /// Arguments
        args: Vec<Expr>,
    },
    /// `{ key: value, ... }`
    Object(Vec<(String, Expr)>),
    /// `[a, b, ...]`
    Array(Vec<Expr>),
    /// `name = value`
    Assign {
        /// Bound name
        name: String,
        /// Assigned value
        value: Box<Expr>,
    },
}

impl Expr {
    /// Name of the called function when the callee is a plain identifier
    #[inline]
    #[must_use]
    pub fn call_name(&self) -> Option<&str> {
        match self {
            Self::Call { callee, .. } => match callee.as_ref() {
                Self::Ident(name) => Some(name),
                _ => None,
            },
            _ => None,
        }
    }

    /// Root identifiers read by this expression, in first-use order
    ///
    /// Called builtin names and names assigned earlier are excluded.
    #[must_use]
    pub fn free_identifiers(&self) -> Vec<String> {
        let mut out = Vec::new();
        let mut bound = Vec::new();
        collect_free(self, &mut bound, &mut out);
        out
    }
}

impl BinaryOp {
    /// Source symbol
    #[must_use]
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
            Self::Eq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::And => "&&",
            Self::Or => "||",
            Self::Coalesce => "??",
        }
    }
}

/// Source form; compound operands are parenthesised so the output reparses
/// to the same tree
impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(Value::String(s)) | Self::Interpolation(s) => write!(f, "{}", quote(s)),
            Self::Literal(value) => write!(f, "{value}"),
            Self::Ident(name) => f.write_str(name),
            Self::Unary { op, expr } => {
                let symbol = match op {
                    UnaryOp::Not => "!",
                    UnaryOp::Neg => "-",
                };
                write!(f, "{symbol}{}", Operand(expr))
            }
            Self::Binary { op, left, right } => {
                write!(f, "{} {} {}", Operand(left), op.symbol(), Operand(right))
            }
            Self::Conditional {
                cond,
                then,
                otherwise,
            } => write!(f, "{} ? {} : {}", Operand(cond), Operand(then), Operand(otherwise)),
            Self::Member { object, property } => write!(f, "{}.{property}", Operand(object)),
            Self::Index { object, index } => write!(f, "{}[{index}]", Operand(object)),
            Self::Call { callee, args } => {
                write!(f, "{}(", Operand(callee))?;
                write_list(f, args.iter())?;
                f.write_str(")")
            }
            Self::Object(fields) => {
                f.write_str("{ ")?;
                for (i, (key, value)) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {value}", quote(key))?;
                }
                f.write_str(" }")
            }
            Self::Array(items) => {
                f.write_str("[")?;
                write_list(f, items.iter())?;
                f.write_str("]")
            }
            Self::Assign { name, value } => write!(f, "{name} = {value}"),
        }
    }
}

struct Operand<'a>(&'a Expr);

impl Display for Operand<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.0 {
            Expr::Binary { .. } | Expr::Conditional { .. } | Expr::Assign { .. } | Expr::Unary { .. } => {
                write!(f, "({})", self.0)
            }
            other => write!(f, "{other}"),
        }
    }
}

fn write_list<'a>(f: &mut Formatter<'_>, items: impl Iterator<Item = &'a Expr>) -> fmt::Result {
    for (i, item) in items.enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('\'');
    for c in text.chars() {
        match c {
            '\'' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out.push('\'');
    out
}

/// Sequence of expressions run as a script
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    /// Statements in order
    pub statements: Vec<Expr>,
}

impl Program {
    /// Root identifiers the program reads before assigning them
    #[must_use]
    pub fn free_identifiers(&self) -> Vec<String> {
        let mut out = Vec::new();
        let mut bound = Vec::new();
        for statement in &self.statements {
            collect_free(statement, &mut bound, &mut out);
        }
        out
    }
}

fn collect_free(expr: &Expr, bound: &mut Vec<String>, out: &mut Vec<String>) {
    match expr {
        Expr::Literal(_) => {}
        Expr::Ident(name) => push_free(name, bound, out),
        Expr::Interpolation(text) => {
            if let Ok(pattern) = courier_pattern::Pattern::parse(text) {
                for var in pattern.vars() {
                    if !var.is_anonymous() {
                        let root = var.param.split('.').next().unwrap_or(&var.param);
                        push_free(root, bound, out);
                    }
                }
            }
        }
        Expr::Unary { expr, .. } => collect_free(expr, bound, out),
        Expr::Binary { left, right, .. } => {
            collect_free(left, bound, out);
            collect_free(right, bound, out);
        }
        Expr::Conditional {
            cond,
            then,
            otherwise,
        } => {
            collect_free(cond, bound, out);
            collect_free(then, bound, out);
            collect_free(otherwise, bound, out);
        }
        Expr::Member { object, .. } => collect_free(object, bound, out),
        Expr::Index { object, index } => {
            collect_free(object, bound, out);
            collect_free(index, bound, out);
        }
        Expr::Call { callee, args } => {
            if !matches!(callee.as_ref(), Expr::Ident(name) if crate::interpreter::is_builtin(name)) {
                collect_free(callee, bound, out);
            }
            for arg in args {
                collect_free(arg, bound, out);
            }
        }
        Expr::Object(fields) => {
            for (_, value) in fields {
                collect_free(value, bound, out);
            }
        }
        Expr::Array(items) => {
            for item in items {
                collect_free(item, bound, out);
            }
        }
        Expr::Assign { name, value } => {
            collect_free(value, bound, out);
            bound.push(name.clone());
        }
    }
}

fn push_free(name: &str, bound: &[String], out: &mut Vec<String>) {
    if !bound.iter().any(|b| b == name) && !out.iter().any(|o| o == name) {
        out.push(name.to_string());
    }
}
