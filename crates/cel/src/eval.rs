//! Tree-walking evaluator over a borrowed `pipelineRun` document.

use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;

use regex::Regex;

use crate::ast::{BinaryOp, Expr, Literal, UnaryOp};
use crate::check::ROOT_VARIABLE;
use crate::functions::Function;
use crate::value::{Mutation, Value};
use crate::RegexCache;

#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    NoSuchKey(String),
    IndexOutOfRange(i64, usize),
    Type(String),
    Overflow(&'static str),
    Regex(String),
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::NoSuchKey(key) => write!(f, "no such key: {key}"),
            Fault::IndexOutOfRange(i, len) => write!(f, "index {i} out of range for list of size {len}"),
            Fault::Type(msg) => f.write_str(msg),
            Fault::Overflow(op) => write!(f, "integer overflow in '{op}'"),
            Fault::Regex(msg) => write!(f, "invalid regular expression: {msg}"),
        }
    }
}

type Res<'a> = Result<Cow<'a, Value>, Fault>;

pub struct Activation<'a> {
    pub root: &'a Value,
    pub regexes: &'a RegexCache,
}

impl<'a> Activation<'a> {
    pub fn eval(&self, expr: &Expr) -> Res<'a> {
        match expr {
            Expr::Lit(lit) => Ok(Cow::Owned(match lit {
                Literal::Null => Value::Null,
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Int(i) => Value::Int(*i),
                Literal::Double(d) => Value::Double(*d),
                Literal::Str(s) => Value::String(s.clone()),
            })),
            Expr::Ident(name) if name == ROOT_VARIABLE => Ok(Cow::Borrowed(self.root)),
            Expr::Ident(name) => Err(Fault::Type(format!("undeclared reference to '{name}'"))),
            Expr::Select { operand, field } => select(self.eval(operand)?, field),
            Expr::Has { operand, field } => {
                let present = match self.eval(operand) {
                    Ok(v) => match v.as_ref() {
                        Value::Map(m) => m.contains_key(field),
                        Value::Null => false,
                        other => return Err(Fault::Type(format!("has() cannot test field '{field}' on '{}'", other.type_name()))),
                    },
                    Err(Fault::NoSuchKey(_)) => false,
                    Err(e) => return Err(e),
                };
                Ok(Cow::Owned(Value::Bool(present)))
            }
            Expr::Index { operand, index } => {
                let target = self.eval(operand)?;
                let key = self.eval(index)?;
                index_into(target, &key)
            }
            Expr::List(items) => {
                let values = items.iter().map(|e| self.eval(e).map(Cow::into_owned)).collect::<Result<_, _>>()?;
                Ok(Cow::Owned(Value::List(values)))
            }
            Expr::Unary { op, operand } => {
                let v = self.eval(operand)?;
                let out = match (op, v.as_ref()) {
                    (UnaryOp::Not, Value::Bool(b)) => Value::Bool(!b),
                    (UnaryOp::Neg, Value::Int(i)) => Value::Int(i.checked_neg().ok_or(Fault::Overflow("-"))?),
                    (UnaryOp::Neg, Value::Double(d)) => Value::Double(-d),
                    (UnaryOp::Not, other) => return Err(no_overload("!", other.type_name(), None)),
                    (UnaryOp::Neg, other) => return Err(no_overload("-", other.type_name(), None)),
                };
                Ok(Cow::Owned(out))
            }
            Expr::Binary { op: BinaryOp::And, lhs, rhs } => {
                Ok(Cow::Owned(Value::Bool(self.truth(lhs, "&&")? && self.truth(rhs, "&&")?)))
            }
            Expr::Binary { op: BinaryOp::Or, lhs, rhs } => {
                Ok(Cow::Owned(Value::Bool(self.truth(lhs, "||")? || self.truth(rhs, "||")?)))
            }
            Expr::Binary { op, lhs, rhs } => {
                let l = self.eval(lhs)?;
                let r = self.eval(rhs)?;
                binary(*op, l.as_ref(), r.as_ref()).map(Cow::Owned)
            }
            Expr::Ternary { cond, then, otherwise } => {
                if self.truth(cond, "?:")? {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
            Expr::Call { target, function, args } => self.call(target.as_deref(), function, args),
        }
    }

    fn truth(&self, expr: &Expr, op: &'static str) -> Result<bool, Fault> {
        match self.eval(expr)?.as_ref() {
            Value::Bool(b) => Ok(*b),
            other => Err(Fault::Type(format!("'{op}' expects bool, found '{}'", other.type_name()))),
        }
    }

    fn string_arg(&self, function: Function, expr: &Expr) -> Result<String, Fault> {
        match self.eval(expr)?.into_owned() {
            Value::String(s) => Ok(s),
            other => Err(Fault::Type(format!("{}() expects string arguments, found '{}'", function.name(), other.type_name()))),
        }
    }

    fn call(&self, target: Option<&Expr>, name: &str, args: &[Expr]) -> Res<'a> {
        let function = match target {
            None => Function::global(name),
            Some(_) => Function::method(name),
        }
        .ok_or_else(|| Fault::Type(format!("undeclared reference to '{name}'")))?;

        let out = match (function, target) {
            (Function::Label, None) | (Function::Annotation, None) => {
                let [k, v] = args else { return Err(arity(name, args.len())) };
                let key = self.string_arg(function, k)?;
                let value = self.string_arg(function, v)?;
                Value::Mutation(if function == Function::Label {
                    Mutation::Label { key, value }
                } else {
                    Mutation::Annotation { key, value }
                })
            }
            (Function::Priority, None) => {
                let [v] = args else { return Err(arity(name, args.len())) };
                Value::Mutation(Mutation::Priority { value: self.string_arg(function, v)? })
            }
            (Function::Size, Some(recv)) => {
                let len = match self.eval(recv)?.as_ref() {
                    Value::String(s) => s.chars().count(),
                    Value::List(l) => l.len(),
                    Value::Map(m) => m.len(),
                    other => return Err(no_overload("size", other.type_name(), None)),
                };
                Value::Int(i64::try_from(len).map_err(|_| Fault::Overflow("size"))?)
            }
            (Function::StartsWith | Function::EndsWith | Function::Contains | Function::Matches, Some(recv)) => {
                let [arg] = args else { return Err(arity(name, args.len())) };
                let subject = match self.eval(recv)?.into_owned() {
                    Value::String(s) => s,
                    other => return Err(no_overload(name, other.type_name(), None)),
                };
                let needle = self.string_arg(function, arg)?;
                Value::Bool(match function {
                    Function::StartsWith => subject.starts_with(&needle),
                    Function::EndsWith => subject.ends_with(&needle),
                    Function::Contains => subject.contains(&needle),
                    _ => self.matches(&subject, &needle)?,
                })
            }
            _ => return Err(Fault::Type(format!("undeclared reference to '{name}'"))),
        };
        Ok(Cow::Owned(out))
    }

    fn matches(&self, subject: &str, pattern: &str) -> Result<bool, Fault> {
        if let Some(re) = self.regexes.get(pattern) {
            return Ok(re.is_match(subject));
        }
        let re = Regex::new(pattern).map_err(|e| Fault::Regex(e.to_string()))?;
        Ok(re.is_match(subject))
    }
}

fn select<'a>(v: Cow<'a, Value>, field: &str) -> Res<'a> {
    match v {
        Cow::Borrowed(Value::Map(m)) => m.get(field).map(Cow::Borrowed).ok_or_else(|| Fault::NoSuchKey(field.to_string())),
        Cow::Owned(Value::Map(mut m)) => m.remove(field).map(Cow::Owned).ok_or_else(|| Fault::NoSuchKey(field.to_string())),
        other => Err(Fault::Type(format!("type '{}' does not support field selection ('{field}')", other.type_name()))),
    }
}

fn index_into<'a>(target: Cow<'a, Value>, key: &Value) -> Res<'a> {
    match (target, key) {
        (Cow::Borrowed(Value::List(items)), Value::Int(i)) => {
            let idx = list_index(*i, items.len())?;
            Ok(Cow::Borrowed(&items[idx]))
        }
        (Cow::Owned(Value::List(mut items)), Value::Int(i)) => {
            let idx = list_index(*i, items.len())?;
            Ok(Cow::Owned(items.swap_remove(idx)))
        }
        (map @ (Cow::Borrowed(Value::Map(_)) | Cow::Owned(Value::Map(_))), Value::String(k)) => select(map, k),
        (t, k) => Err(no_overload("[]", t.type_name(), Some(k.type_name()))),
    }
}

fn list_index(i: i64, len: usize) -> Result<usize, Fault> {
    usize::try_from(i).ok().filter(|&idx| idx < len).ok_or(Fault::IndexOutOfRange(i, len))
}

fn no_overload(op: &str, lhs: &str, rhs: Option<&str>) -> Fault {
    match rhs {
        Some(rhs) => Fault::Type(format!("no matching overload for '{op}' applied to ({lhs}, {rhs})")),
        None => Fault::Type(format!("no matching overload for '{op}' applied to '{lhs}'")),
    }
}

fn arity(name: &str, got: usize) -> Fault {
    Fault::Type(format!("found no matching overload for '{name}' applied to {got} argument(s)"))
}

fn binary(op: BinaryOp, l: &Value, r: &Value) -> Result<Value, Fault> {
    let mismatch = || no_overload(op.symbol(), l.type_name(), Some(r.type_name()));
    Ok(match op {
        BinaryOp::Eq => Value::Bool(l.equals(r)),
        BinaryOp::Ne => Value::Bool(!l.equals(r)),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ord = l.compare(r).ok_or_else(mismatch)?;
            Value::Bool(match op {
                BinaryOp::Lt => ord == Ordering::Less,
                BinaryOp::Le => ord != Ordering::Greater,
                BinaryOp::Gt => ord == Ordering::Greater,
                _ => ord != Ordering::Less,
            })
        }
        BinaryOp::In => Value::Bool(match r {
            Value::List(items) => items.iter().any(|v| v.equals(l)),
            Value::Map(m) => match l {
                Value::String(k) => m.contains_key(k),
                _ => return Err(mismatch()),
            },
            _ => return Err(mismatch()),
        }),
        BinaryOp::Add => match (l, r) {
            (Value::Int(a), Value::Int(b)) => Value::Int(a.checked_add(*b).ok_or(Fault::Overflow("+"))?),
            (Value::Double(a), Value::Double(b)) => Value::Double(a + b),
            (Value::String(a), Value::String(b)) => Value::String(format!("{a}{b}")),
            (Value::List(a), Value::List(b)) => Value::List(a.iter().chain(b).cloned().collect()),
            _ => return Err(mismatch()),
        },
        BinaryOp::Sub => match (l, r) {
            (Value::Int(a), Value::Int(b)) => Value::Int(a.checked_sub(*b).ok_or(Fault::Overflow("-"))?),
            (Value::Double(a), Value::Double(b)) => Value::Double(a - b),
            _ => return Err(mismatch()),
        },
        // evaluated lazily by the caller
        BinaryOp::And | BinaryOp::Or => return Err(mismatch()),
    })
}
