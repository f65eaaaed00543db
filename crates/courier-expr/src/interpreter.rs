//! Default expression evaluator

use crate::ast::{BinaryOp, Expr, Program, UnaryOp};
use crate::value::{loosely_equal, lookup_path, number, to_text, truthy, Bindings};
use crate::ExprError;
use serde_json::{Map, Value};
use std::fmt::Debug;

/// Expression evaluation capability
///
/// Injected into the template engine and the flow executor so that hosts can
/// replace the expression language.
pub trait Evaluator: Send + Sync + Debug {
    /// Evaluate a single expression against `env`
    ///
    /// # Errors
    /// Returns [`ExprError::Eval`] or [`ExprError::Unbound`] on failure.
    fn evaluate(&self, expr: &Expr, env: &Bindings) -> Result<Value, ExprError>;

    /// Run a script and return the bindings it assigned
    ///
    /// # Errors
    /// Returns the first statement failure.
    fn execute(&self, program: &Program, env: &Bindings) -> Result<Bindings, ExprError>;
}

const BUILTINS: [&str; 9] = [
    "string", "number", "boolean", "length", "lower", "upper", "trim", "json", "parse",
];

/// Check if `name` is a builtin function
#[inline]
#[must_use]
pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name)
}

/// Tree-walking interpreter
#[derive(Debug, Clone, Copy, Default)]
pub struct Interpreter;

impl Interpreter {
    /// Create interpreter
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Evaluator for Interpreter {
    fn evaluate(&self, expr: &Expr, env: &Bindings) -> Result<Value, ExprError> {
        let mut frame = Frame {
            base: env,
            locals: Bindings::new(),
        };
        frame.eval(expr)
    }

    fn execute(&self, program: &Program, env: &Bindings) -> Result<Bindings, ExprError> {
        let mut frame = Frame {
            base: env,
            locals: Bindings::new(),
        };
        for statement in &program.statements {
            frame.eval(statement)?;
        }
        Ok(frame.locals)
    }
}

struct Frame<'a> {
    base: &'a Bindings,
    locals: Bindings,
}

impl Frame<'_> {
    fn lookup(&self, name: &str) -> Option<&Value> {
        self.locals
            .get(name)
            .or_else(|| lookup_path(self.base, name))
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, ExprError> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Ident(name) => self
                .lookup(name)
                .cloned()
                .ok_or_else(|| ExprError::Unbound(name.clone())),
            Expr::Interpolation(text) => {
                let pattern = courier_pattern::Pattern::parse(text)
                    .map_err(|e| ExprError::Eval(e.to_string()))?;
                pattern
                    .render(|var| self.lookup(&var.param).map(to_text))
                    .map(Value::String)
                    .map_err(|e| ExprError::Eval(e.to_string()))
            }
            Expr::Unary { op, expr } => {
                let value = self.eval(expr)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!truthy(&value))),
                    UnaryOp::Neg => Ok(number(-as_number(&value)?)),
                }
            }
            Expr::Binary { op, left, right } => self.binary(*op, left, right),
            Expr::Conditional {
                cond,
                then,
                otherwise,
            } => {
                if truthy(&self.eval(cond)?) {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
            Expr::Member { object, property } => {
                let object = self.eval(object)?;
                Ok(member(&object, property))
            }
            Expr::Index { object, index } => {
                let object = self.eval(object)?;
                let index = self.eval(index)?;
                Ok(member(&object, &to_text(&index)))
            }
            Expr::Call { callee, args } => {
                let Expr::Ident(name) = callee.as_ref() else {
                    return Err(ExprError::Eval("only builtin functions can be called".into()));
                };
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                call(name, &args)
            }
            Expr::Object(fields) => {
                let mut map = Map::new();
                for (key, value) in fields {
                    map.insert(key.clone(), self.eval(value)?);
                }
                Ok(Value::Object(map))
            }
            Expr::Array(items) => items
                .iter()
                .map(|item| self.eval(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Expr::Assign { name, value } => {
                let value = self.eval(value)?;
                self.locals.insert(name.clone(), value.clone());
                Ok(value)
            }
        }
    }

    fn binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr) -> Result<Value, ExprError> {
        match op {
            BinaryOp::And => {
                let l = self.eval(left)?;
                return if truthy(&l) { self.eval(right) } else { Ok(l) };
            }
            BinaryOp::Or => {
                let l = self.eval(left)?;
                return if truthy(&l) { Ok(l) } else { self.eval(right) };
            }
            BinaryOp::Coalesce => {
                return match self.eval(left) {
                    Ok(Value::Null) | Err(ExprError::Unbound(_)) => self.eval(right),
                    other => other,
                };
            }
            _ => {}
        }

        let l = self.eval(left)?;
        let r = self.eval(right)?;
        match op {
            BinaryOp::Add if l.is_string() || r.is_string() => {
                Ok(Value::String(format!("{}{}", to_text(&l), to_text(&r))))
            }
            BinaryOp::Add => Ok(number(as_number(&l)? + as_number(&r)?)),
            BinaryOp::Sub => Ok(number(as_number(&l)? - as_number(&r)?)),
            BinaryOp::Mul => Ok(number(as_number(&l)? * as_number(&r)?)),
            BinaryOp::Div => {
                let divisor = as_number(&r)?;
                if divisor == 0.0 {
                    return Err(ExprError::Eval("division by zero".into()));
                }
                Ok(number(as_number(&l)? / divisor))
            }
            BinaryOp::Rem => {
                let divisor = as_number(&r)?;
                if divisor == 0.0 {
                    return Err(ExprError::Eval("division by zero".into()));
                }
                Ok(number(as_number(&l)? % divisor))
            }
            BinaryOp::Eq => Ok(Value::Bool(loosely_equal(&l, &r))),
            BinaryOp::NotEq => Ok(Value::Bool(!loosely_equal(&l, &r))),
            BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
                let ordering = compare(&l, &r)?;
                Ok(Value::Bool(match op {
                    BinaryOp::Lt => ordering.is_lt(),
                    BinaryOp::LtEq => ordering.is_le(),
                    BinaryOp::Gt => ordering.is_gt(),
                    _ => ordering.is_ge(),
                }))
            }
            BinaryOp::And | BinaryOp::Or | BinaryOp::Coalesce => unreachable!("short-circuit operators return early"),
        }
    }
}

fn as_number(value: &Value) -> Result<f64, ExprError> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| ExprError::Eval(format!("number out of range: {n}"))),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| ExprError::Eval(format!("not a number: {s:?}"))),
        Value::Bool(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Null => Ok(0.0),
        other => Err(ExprError::Eval(format!("not a number: {other}"))),
    }
}

fn compare(l: &Value, r: &Value) -> Result<std::cmp::Ordering, ExprError> {
    if let (Value::String(a), Value::String(b)) = (l, r) {
        return Ok(a.cmp(b));
    }
    let (a, b) = (as_number(l)?, as_number(r)?);
    a.partial_cmp(&b)
        .ok_or_else(|| ExprError::Eval("incomparable values".into()))
}

fn member(object: &Value, property: &str) -> Value {
    match object {
        Value::Object(map) => map.get(property).cloned().unwrap_or(Value::Null),
        Value::Array(items) if property == "length" => number(items.len() as f64),
        Value::Array(items) => property
            .parse::<usize>()
            .ok()
            .and_then(|i| items.get(i).cloned())
            .unwrap_or(Value::Null),
        Value::String(s) if property == "length" => number(s.chars().count() as f64),
        _ => Value::Null,
    }
}

fn call(name: &str, args: &[Value]) -> Result<Value, ExprError> {
    let arg = args.first().cloned().unwrap_or(Value::Null);
    match name {
        "string" => Ok(Value::String(to_text(&arg))),
        "number" => as_number(&arg).map(number),
        "boolean" => Ok(Value::Bool(truthy(&arg))),
        "length" => Ok(match &arg {
            Value::Array(items) => number(items.len() as f64),
            Value::Object(map) => number(map.len() as f64),
            other => number(to_text(other).chars().count() as f64),
        }),
        "lower" => Ok(Value::String(to_text(&arg).to_lowercase())),
        "upper" => Ok(Value::String(to_text(&arg).to_uppercase())),
        "trim" => Ok(Value::String(to_text(&arg).trim().to_string())),
        "json" => serde_json::to_string(&arg)
            .map(Value::String)
            .map_err(|e| ExprError::Eval(e.to_string())),
        "parse" => serde_json::from_str(&to_text(&arg)).map_err(|e| ExprError::Eval(e.to_string())),
        other => Err(ExprError::Eval(format!("unknown function `{other}`"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{parse_expression, parse_program};
    use serde_json::json;

    fn eval(source: &str, env: &Bindings) -> Result<Value, ExprError> {
        Interpreter.evaluate(&parse_expression(source)?, env)
    }

    fn env(pairs: &[(&str, Value)]) -> Bindings {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn arithmetic() {
        assert_eq!(eval("1 + 2 * 3", &Bindings::new()).unwrap(), json!(7));
        assert_eq!(eval("7 % 4", &Bindings::new()).unwrap(), json!(3));
    }

    #[test]
    fn string_concatenation() {
        let e = env(&[("name", json!("bob"))]);
        assert_eq!(eval("'hi ' + name", &e).unwrap(), json!("hi bob"));
    }

    #[test]
    fn member_access() {
        let e = env(&[("user", json!({"id": 3, "tags": ["a", "b"]}))]);
        assert_eq!(eval("user.id", &e).unwrap(), json!(3));
        assert_eq!(eval("user.tags[1]", &e).unwrap(), json!("b"));
        assert_eq!(eval("user.tags.length", &e).unwrap(), json!(2));
    }

    #[test]
    fn unbound_identifier() {
        assert!(matches!(eval("missing + 1", &Bindings::new()), Err(ExprError::Unbound(n)) if n == "missing"));
    }

    #[test]
    fn coalesce_recovers_unbound() {
        assert_eq!(eval("missing ?? 4", &Bindings::new()).unwrap(), json!(4));
    }

    #[test]
    fn builtins() {
        let e = env(&[("s", json!(" Ab "))]);
        assert_eq!(eval("upper(trim(s))", &e).unwrap(), json!("AB"));
        assert_eq!(eval("number('12') + 1", &e).unwrap(), json!(13));
        assert_eq!(eval("parse('{\"a\":1}').a", &e).unwrap(), json!(1));
    }

    #[test]
    fn interpolation() {
        let e = env(&[("token", json!("t1"))]);
        assert_eq!(eval("'Bearer {{token}}'", &e).unwrap(), json!("Bearer t1"));
    }

    #[test]
    fn script_increments_prior_value() {
        let program = parse_program("x = x + 1").unwrap();
        let out = Interpreter.execute(&program, &env(&[("x", json!(5))])).unwrap();
        assert_eq!(out["x"], json!(6));
    }

    #[test]
    fn script_sees_its_own_assignments() {
        let program = parse_program("a = 2; b = a * 10").unwrap();
        let out = Interpreter.execute(&program, &Bindings::new()).unwrap();
        assert_eq!(out["b"], json!(20));
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn division_by_zero() {
        assert!(eval("1 / 0", &Bindings::new()).is_err());
    }
}
