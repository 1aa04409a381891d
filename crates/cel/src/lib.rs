//! tekq expression compiler and mutation executor.
//!
//! Expressions are a small CEL dialect evaluated against one read-only
//! variable, `pipelineRun`. They cannot write to the object; they declare
//! mutations through `label(k, v)`, `annotation(k, v)` and `priority(v)`,
//! which the executor applies once the expression has returned:
//!
//! ```text
//! pipelineRun.metadata.namespace.startsWith("tenant-")
//!     ? [priority("tenant"), annotation("team", pipelineRun.metadata.namespace)]
//!     : priority("default")
//! ```

#![forbid(unsafe_code)]

mod ast;
mod check;
mod eval;
mod functions;
mod lexer;
mod parser;
mod value;

use metrics::counter;
use regex::Regex;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tekq_core::{EvalError, PipelineRun, PipelineRunMutator};
use tracing::debug;

pub use value::Mutation;

/// Literal `matches()` patterns compiled once per program.
pub(crate) type RegexCache = FxHashMap<String, Regex>;

pub type Mutations = SmallVec<[Mutation; 4]>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("syntax error at offset {offset}: {message}")]
pub struct SyntaxError {
    pub offset: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("failed to compile expression #{index} {expression:?}: {reason}")]
pub struct CompileError {
    /// Position in the configured list.
    pub index: usize,
    pub expression: String,
    pub reason: String,
}

/// One checked expression, reusable across any number of evaluations.
#[derive(Debug)]
pub struct Program {
    source: String,
    expr: ast::Expr,
    regexes: RegexCache,
}

impl Program {
    pub fn compile(source: &str) -> Result<Self, String> {
        let expr = parser::parse(source).map_err(|e| e.to_string())?;
        let mut regexes = RegexCache::default();
        let ty = check::check(&expr, &mut regexes)?;
        check::check_result(&ty)?;
        Ok(Self { source: source.to_string(), expr, regexes })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate against the current state of `plr` and return the declared
    /// mutations without applying them.
    pub fn evaluate(&self, plr: &PipelineRun) -> Result<Mutations, EvalError> {
        let fail = |cause: String| EvalError { expression: self.source.clone(), cause };
        let doc = serde_json::to_value(plr).map_err(|e| fail(format!("failed to serialize pipelinerun: {e}")))?;
        let root = value::Value::from(&doc);
        let activation = eval::Activation { root: &root, regexes: &self.regexes };
        let result = activation.eval(&self.expr).map_err(|f| fail(f.to_string()))?;

        let mut out = Mutations::new();
        match result.into_owned() {
            value::Value::Bool(_) => {}
            other => collect(other, &mut out).map_err(fail)?,
        }
        Ok(out)
    }
}

fn collect(v: value::Value, out: &mut Mutations) -> Result<(), String> {
    match v {
        value::Value::Mutation(m) => out.push(m),
        value::Value::List(items) => {
            for item in items {
                collect(item, out)?;
            }
        }
        other => {
            return Err(format!(
                "expression returned '{}', expected a mutation or a list of mutations",
                other.type_name()
            ))
        }
    }
    Ok(())
}

pub fn apply_mutations(mutations: &[Mutation], plr: &mut PipelineRun) {
    for m in mutations {
        m.apply(plr);
    }
}

/// Mutator running compiled expressions in configured order. Each
/// expression sees the mutations of the ones before it.
#[derive(Debug, Default)]
pub struct CelMutator {
    programs: Vec<Program>,
}

impl CelMutator {
    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
}

impl PipelineRunMutator for CelMutator {
    fn mutate(&self, plr: &mut PipelineRun) -> Result<(), EvalError> {
        for program in &self.programs {
            let mutations = program.evaluate(plr)?;
            debug!(expression = %program.source(), mutations = ?mutations, "applying expression");
            apply_mutations(&mutations, plr);
            counter!("tekq_cel_mutations_total", mutations.len() as u64);
        }
        Ok(())
    }
}

/// Compile every expression or none. Zero expressions yield an empty mutator.
pub fn compile<S: AsRef<str>>(expressions: &[S]) -> Result<CelMutator, CompileError> {
    let programs = expressions
        .iter()
        .enumerate()
        .map(|(index, src)| {
            let src = src.as_ref();
            Program::compile(src).map_err(|reason| CompileError { index, expression: src.to_string(), reason })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(CelMutator { programs })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tekq_core::PRIORITY_LABEL;

    fn plr() -> PipelineRun {
        serde_json::from_value(serde_json::json!({
            "metadata": { "name": "build-1", "namespace": "tenant-a", "labels": { "env": "staging" } },
            "spec": { "pipelineRef": { "name": "build" } }
        }))
        .unwrap()
    }

    #[test]
    fn empty_batch_compiles_to_empty_mutator() {
        let m = compile::<String>(&[]).unwrap();
        assert!(m.is_empty());
    }

    #[test]
    fn batch_fails_closed_on_first_bad_expression() {
        let err = compile(&[r#"priority("a")"#, "not_a_function()"]).unwrap_err();
        assert_eq!(err.index, 1);
        assert_eq!(err.expression, "not_a_function()");
        assert!(err.reason.contains("undeclared reference"));
    }

    #[test]
    fn bool_result_declares_nothing() {
        let p = Program::compile("has(pipelineRun.metadata.labels)").unwrap();
        assert!(p.evaluate(&plr()).unwrap().is_empty());
    }

    #[test]
    fn nested_lists_flatten() {
        let p = Program::compile(r#"[label("a", "1"), [annotation("b", "2")], []]"#).unwrap();
        let out = p.evaluate(&plr()).unwrap();
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn dynamic_non_mutation_result_is_an_eval_error() {
        let p = Program::compile("pipelineRun.metadata.name").unwrap();
        let err = p.evaluate(&plr()).unwrap_err();
        assert!(err.cause.contains("returned 'string'"));
    }

    #[test]
    fn mutator_applies_in_order() {
        let m = compile(&[r#"priority("low")"#, r#"priority("high")"#]).unwrap();
        let mut obj = plr();
        m.mutate(&mut obj).unwrap();
        assert_eq!(obj.label(PRIORITY_LABEL), Some("high"));
    }
}
