//! Static checking against the closed function environment.
//!
//! The only variable is `pipelineRun`; its fields are dynamic, so most
//! checks on member access are deferred to evaluation. What can be decided
//! statically (unknown names, arity, literal argument types, the shape of
//! the result) is rejected here.

use std::fmt;

use regex::Regex;

use crate::ast::{BinaryOp, Expr, Literal, UnaryOp};
use crate::functions::Function;
use crate::RegexCache;

pub const ROOT_VARIABLE: &str = "pipelineRun";

#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    Dyn,
    Null,
    Bool,
    Int,
    Double,
    String,
    List(Box<Type>),
    Map,
    Mutation,
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Dyn => f.write_str("dyn"),
            Type::Null => f.write_str("null_type"),
            Type::Bool => f.write_str("bool"),
            Type::Int => f.write_str("int"),
            Type::Double => f.write_str("double"),
            Type::String => f.write_str("string"),
            Type::List(elem) => write!(f, "list({elem})"),
            Type::Map => f.write_str("map"),
            Type::Mutation => f.write_str("mutation"),
        }
    }
}

impl Type {
    /// A value of type `actual` may flow where `self` is expected.
    pub fn accepts(&self, actual: &Type) -> bool {
        match (self, actual) {
            (Type::Dyn, _) | (_, Type::Dyn) => true,
            (Type::List(a), Type::List(b)) => a.accepts(b),
            (a, b) => a == b,
        }
    }
}

fn unify(a: &Type, b: &Type) -> Option<Type> {
    match (a, b) {
        (a, b) if a == b => Some(a.clone()),
        (Type::Dyn, _) | (_, Type::Dyn) => Some(Type::Dyn),
        (Type::List(x), Type::List(y)) => Some(Type::List(Box::new(unify(x, y).unwrap_or(Type::Dyn)))),
        _ => None,
    }
}

/// Check `expr` and return its static type, precompiling literal regexes
/// into `regexes` along the way.
pub fn check(expr: &Expr, regexes: &mut RegexCache) -> Result<Type, String> {
    Checker { regexes }.expr(expr)
}

/// Reject expressions whose result cannot be a set of mutations.
pub fn check_result(ty: &Type) -> Result<(), String> {
    match ty {
        Type::Mutation | Type::Bool | Type::Dyn => Ok(()),
        Type::List(elem) if matches!(**elem, Type::Mutation | Type::Dyn) => Ok(()),
        other => Err(format!("expression must evaluate to a mutation or a list of mutations, found '{other}'")),
    }
}

struct Checker<'c> {
    regexes: &'c mut RegexCache,
}

impl Checker<'_> {
    fn expr(&mut self, expr: &Expr) -> Result<Type, String> {
        match expr {
            Expr::Lit(lit) => Ok(match lit {
                Literal::Null => Type::Null,
                Literal::Bool(_) => Type::Bool,
                Literal::Int(_) => Type::Int,
                Literal::Double(_) => Type::Double,
                Literal::Str(_) => Type::String,
            }),
            Expr::Ident(name) if name == ROOT_VARIABLE => Ok(Type::Map),
            Expr::Ident(name) => Err(format!("undeclared reference to '{name}'")),
            Expr::Select { operand, field } => {
                let ty = self.expr(operand)?;
                match ty {
                    Type::Map | Type::Dyn => Ok(Type::Dyn),
                    other => Err(format!("type '{other}' does not support field selection ('{field}')")),
                }
            }
            Expr::Has { operand, field } => {
                let ty = self.expr(operand)?;
                match ty {
                    Type::Map | Type::Dyn => Ok(Type::Bool),
                    other => Err(format!("has() cannot test field '{field}' on type '{other}'")),
                }
            }
            Expr::Index { operand, index } => {
                let target = self.expr(operand)?;
                let key = self.expr(index)?;
                match (&target, &key) {
                    (Type::List(elem), Type::Int | Type::Dyn) => Ok((**elem).clone()),
                    (Type::Map, Type::String | Type::Dyn) => Ok(Type::Dyn),
                    (Type::Dyn, Type::Int | Type::String | Type::Dyn) => Ok(Type::Dyn),
                    _ => Err(format!("no matching overload for index of '{target}' by '{key}'")),
                }
            }
            Expr::List(items) => {
                let mut elem: Option<Type> = None;
                for item in items {
                    let ty = self.expr(item)?;
                    elem = Some(match elem {
                        None => ty,
                        Some(prev) => unify(&prev, &ty).unwrap_or(Type::Dyn),
                    });
                }
                Ok(Type::List(Box::new(elem.unwrap_or(Type::Dyn))))
            }
            Expr::Unary { op, operand } => {
                let ty = self.expr(operand)?;
                match (op, &ty) {
                    (UnaryOp::Not, Type::Bool | Type::Dyn) => Ok(Type::Bool),
                    (UnaryOp::Neg, Type::Int | Type::Double | Type::Dyn) => Ok(ty),
                    (UnaryOp::Not, _) => Err(format!("no matching overload for '!' applied to '{ty}'")),
                    (UnaryOp::Neg, _) => Err(format!("no matching overload for '-' applied to '{ty}'")),
                }
            }
            Expr::Binary { op, lhs, rhs } => {
                let l = self.expr(lhs)?;
                let r = self.expr(rhs)?;
                binary(*op, &l, &r)
                    .ok_or_else(|| format!("no matching overload for '{}' applied to ({l}, {r})", op.symbol()))
            }
            Expr::Ternary { cond, then, otherwise } => {
                let c = self.expr(cond)?;
                if !Type::Bool.accepts(&c) {
                    return Err(format!("ternary condition must be bool, found '{c}'"));
                }
                let a = self.expr(then)?;
                let b = self.expr(otherwise)?;
                unify(&a, &b).ok_or_else(|| format!("ternary branches have incompatible types '{a}' and '{b}'"))
            }
            Expr::Call { target, function, args } => self.call(target.as_deref(), function, args),
        }
    }

    fn call(&mut self, target: Option<&Expr>, name: &str, args: &[Expr]) -> Result<Type, String> {
        let function = match target {
            None => Function::global(name).ok_or_else(|| format!("undeclared reference to '{name}'"))?,
            Some(_) => Function::method(name).ok_or_else(|| format!("undeclared reference to method '{name}'"))?,
        };
        let sig = function.signature();
        if args.len() != sig.params.len() {
            return Err(format!(
                "found no matching overload for '{name}' applied to {} argument(s), expected {}",
                args.len(),
                sig.params.len()
            ));
        }
        if let Some(receiver) = target {
            let ty = self.expr(receiver)?;
            if !sig.receiver.iter().any(|want| want.accepts(&ty)) {
                return Err(format!("no matching overload for '{name}' on receiver type '{ty}'"));
            }
        }
        for (i, (arg, want)) in args.iter().zip(sig.params.iter()).enumerate() {
            let ty = self.expr(arg)?;
            if !want.iter().any(|w| w.accepts(&ty)) {
                return Err(format!("argument {} of '{name}' must be {}, found '{ty}'", i + 1, alternatives(want)));
            }
        }
        if function == Function::Matches {
            if let Expr::Lit(Literal::Str(pattern)) = &args[0] {
                if !self.regexes.contains_key(pattern) {
                    let re = Regex::new(pattern).map_err(|e| format!("invalid regular expression {pattern:?}: {e}"))?;
                    self.regexes.insert(pattern.clone(), re);
                }
            }
        }
        Ok(sig.ret)
    }
}

fn alternatives(types: &[Type]) -> String {
    types.iter().map(|t| format!("'{t}'")).collect::<Vec<_>>().join(" or ")
}

fn binary(op: BinaryOp, l: &Type, r: &Type) -> Option<Type> {
    use Type::*;
    match op {
        BinaryOp::And | BinaryOp::Or => (Bool.accepts(l) && Bool.accepts(r)).then_some(Bool),
        BinaryOp::Eq | BinaryOp::Ne => unify(l, r).map(|_| Bool).or(match (l, r) {
            (Int | Double, Int | Double) => Some(Bool),
            (Null, _) | (_, Null) => Some(Bool),
            _ => None,
        }),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => match (l, r) {
            (Dyn, Dyn | Int | Double | String | Bool) | (Int | Double | String | Bool, Dyn) => Some(Bool),
            (Int | Double, Int | Double) => Some(Bool),
            (String, String) | (Bool, Bool) => Some(Bool),
            _ => None,
        },
        BinaryOp::In => match r {
            List(elem) => (elem.accepts(l) || matches!(l, Null)).then_some(Bool),
            Map => matches!(l, String | Dyn).then_some(Bool),
            Dyn => Some(Bool),
            _ => None,
        },
        BinaryOp::Add => match (l, r) {
            (Int, Int) => Some(Int),
            (Double, Double) => Some(Double),
            (String, String) => Some(String),
            (List(a), List(b)) => Some(List(Box::new(unify(a, b).unwrap_or(Dyn)))),
            (Dyn, Dyn | Int | Double | String | List(_)) | (Int | Double | String | List(_), Dyn) => Some(Dyn),
            _ => None,
        },
        BinaryOp::Sub => match (l, r) {
            (Int, Int) => Some(Int),
            (Double, Double) => Some(Double),
            (Dyn, Dyn | Int | Double) | (Int | Double, Dyn) => Some(Dyn),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn type_of(src: &str) -> Result<Type, String> {
        let mut cache = RegexCache::default();
        check(&parse(src).unwrap(), &mut cache)
    }

    #[test]
    fn effect_calls_are_mutations() {
        assert_eq!(type_of(r#"label("a", "b")"#), Ok(Type::Mutation));
        assert_eq!(type_of(r#"[label("a", "b"), priority("high")]"#), Ok(Type::List(Box::new(Type::Mutation))));
    }

    #[test]
    fn unknown_names_and_arity() {
        assert!(type_of("valid()").unwrap_err().contains("undeclared reference to 'valid'"));
        assert!(type_of("request.name").unwrap_err().contains("undeclared reference to 'request'"));
        assert!(type_of(r#"label("a")"#).unwrap_err().contains("1 argument(s)"));
        assert!(type_of(r#"pipelineRun.label("a", "b")"#).unwrap_err().contains("method 'label'"));
    }

    #[test]
    fn literal_argument_types_are_checked() {
        assert!(type_of(r#"label("a", 1)"#).unwrap_err().contains("argument 2 of 'label'"));
        assert_eq!(type_of("label(\"a\", pipelineRun.metadata.name)"), Ok(Type::Mutation));
    }

    #[test]
    fn field_selection_on_scalars_is_rejected() {
        assert!(type_of(r#""abc".size"#).is_err());
        assert_eq!(type_of("pipelineRun.spec.params[0].name"), Ok(Type::Dyn));
    }

    #[test]
    fn ternary_branches_must_unify() {
        assert_eq!(type_of(r#"true ? priority("a") : priority("b")"#), Ok(Type::Mutation));
        assert_eq!(type_of(r#"true ? [priority("a")] : []"#), Ok(Type::List(Box::new(Type::Dyn))));
        assert!(type_of(r#"true ? priority("a") : "b""#).is_err());
        assert!(type_of(r#""x" ? priority("a") : priority("b")"#).is_err());
    }

    #[test]
    fn result_shape() {
        assert!(check_result(&Type::Mutation).is_ok());
        assert!(check_result(&Type::Bool).is_ok());
        assert!(check_result(&Type::List(Box::new(Type::Dyn))).is_ok());
        assert!(check_result(&Type::String).is_err());
        assert!(check_result(&Type::List(Box::new(Type::Int))).is_err());
    }

    #[test]
    fn literal_regexes_are_precompiled() {
        let mut cache = RegexCache::default();
        check(&parse(r#"pipelineRun.metadata.name.matches("^build-")"#).unwrap(), &mut cache).unwrap();
        assert!(cache.contains_key("^build-"));
        let err = check(&parse(r#"pipelineRun.metadata.name.matches("(")"#).unwrap(), &mut cache).unwrap_err();
        assert!(err.contains("invalid regular expression"));
    }
}
