//! # RAM transformer pipeline (§4.4)
//!
//! Four independent rewrite rules, each implemented as a pure function from
//! one `Operation` to a (possibly unchanged) `Operation` plus a `bool` flag:
//!
//! - [`level_conditions`] — re-floats every `Filter` to sit immediately
//!   inside the scan that introduces its deepest operand (§4.4.1).
//! - [`create_indices`] — folds a scan's own equality filters into an
//!   `IndexScan` pattern (§4.4.2).
//! - [`convert_existence_checks`] — drops a scan whose bound tuple is never
//!   read downstream to a bare existence test (§4.4.3).
//! - [`searches_to_choices`] — drops a scan whose bound tuple is read only
//!   by its own filter, not downstream, to `Choice`/`IndexChoice` (§4.4.4).
//!
//! [`Pipeline`] applies the four in that fixed order, repeating the whole
//! pass until none of them report a change or `max_iterations` is hit
//! (§4.4.5), following the teacher's `Optimizer::optimize` fixpoint loop.

pub mod convert_existence_checks;
pub mod create_indices;
pub mod level_conditions;
pub mod searches_to_choices;
mod support;

use crate::config::Config;
use crate::ram::{Operation, RamProgram, Statement};
use std::collections::HashMap;

/// One rewrite rule in the pipeline: a name for logging and a function from
/// an operation tree to a rewritten tree plus whether anything changed.
trait Transformer {
    fn name(&self) -> &'static str;
    fn apply(&self, op: Operation, arities: &HashMap<String, usize>) -> (Operation, bool);
}

struct LevelConditions;
impl Transformer for LevelConditions {
    fn name(&self) -> &'static str {
        "level_conditions"
    }
    fn apply(&self, op: Operation, _arities: &HashMap<String, usize>) -> (Operation, bool) {
        level_conditions::transform(op)
    }
}

struct CreateIndices;
impl Transformer for CreateIndices {
    fn name(&self) -> &'static str {
        "create_indices"
    }
    fn apply(&self, op: Operation, arities: &HashMap<String, usize>) -> (Operation, bool) {
        create_indices::transform(op, arities)
    }
}

struct ConvertExistenceChecks;
impl Transformer for ConvertExistenceChecks {
    fn name(&self) -> &'static str {
        "convert_existence_checks"
    }
    fn apply(&self, op: Operation, arities: &HashMap<String, usize>) -> (Operation, bool) {
        convert_existence_checks::transform(op, arities)
    }
}

struct SearchesToChoices;
impl Transformer for SearchesToChoices {
    fn name(&self) -> &'static str {
        "searches_to_choices"
    }
    fn apply(&self, op: Operation, arities: &HashMap<String, usize>) -> (Operation, bool) {
        searches_to_choices::transform(op, arities)
    }
}

/// Runs the four transformers to fixpoint over a whole `RamProgram`.
pub struct Pipeline {
    max_iterations: usize,
}

impl Pipeline {
    pub fn new(config: &Config) -> Self {
        Pipeline {
            max_iterations: config.max_transform_iterations,
        }
    }

    /// Rewrites every `Operation` reachable from `program.main`'s `Query`
    /// statements and every subroutine body, in place, to fixpoint.
    pub fn run(&self, program: &mut RamProgram) {
        let arities = relation_arities(program);
        let rules: Vec<Box<dyn Transformer>> = vec![
            Box::new(LevelConditions),
            Box::new(CreateIndices),
            Box::new(ConvertExistenceChecks),
            Box::new(SearchesToChoices),
        ];

        for iteration in 0..self.max_iterations {
            let mut changed = false;

            let mut main = std::mem::replace(&mut program.main, Statement::Sequence(Vec::new()));
            for rule in &rules {
                let pass_changed = rewrite_statement(&mut main, &mut |op| rule.apply(op, &arities));
                changed |= pass_changed;
                tracing::debug!(pass = rule.name(), iteration, changed = pass_changed, "transform pass");
            }
            program.main = main;

            for sub in &mut program.subroutines {
                let body = std::mem::replace(&mut sub.body, Operation::Return(Vec::new()));
                let mut current = body;
                for rule in &rules {
                    let (rewritten, pass_changed) = rule.apply(current, &arities);
                    current = rewritten;
                    changed |= pass_changed;
                }
                sub.body = current;
            }

            if !changed {
                tracing::debug!(iteration, "transform pipeline reached fixpoint");
                return;
            }
        }

        tracing::warn!(
            max_iterations = self.max_iterations,
            "transform pipeline did not reach fixpoint within the iteration cap"
        );
    }
}

fn relation_arities(program: &RamProgram) -> HashMap<String, usize> {
    program.relations.iter().map(|r| (r.name.clone(), r.arity)).collect()
}

/// Looks up `rel`'s arity, falling back to its base relation's arity for
/// the synthetic `delta_`/`new_` scratch relations semi-naive evaluation
/// creates (those never appear in `program.relations`, which only lists
/// declared relations).
pub(crate) fn lookup_arity(arities: &HashMap<String, usize>, rel: &str) -> Option<usize> {
    if let Some(arity) = arities.get(rel) {
        return Some(*arity);
    }
    rel.strip_prefix("delta_")
        .or_else(|| rel.strip_prefix("new_"))
        .and_then(|base| arities.get(base))
        .copied()
}

/// Walks every `Query`'s operation tree reachable from `stmt`, rewriting it
/// with `f`. Returns whether any rewrite reported a change.
fn rewrite_statement(stmt: &mut Statement, f: &mut impl FnMut(Operation) -> (Operation, bool)) -> bool {
    match stmt {
        Statement::Sequence(stmts) | Statement::Parallel(stmts) => {
            let mut changed = false;
            for s in stmts {
                changed |= rewrite_statement(s, f);
            }
            changed
        }
        Statement::Loop(body) | Statement::LogTimer(_, body) | Statement::Stratum(_, body) => {
            rewrite_statement(body, f)
        }
        Statement::Query(op) => {
            let taken = std::mem::replace(op, Operation::Return(Vec::new()));
            let (rewritten, changed) = f(taken);
            *op = rewritten;
            changed
        }
        Statement::Exit(_)
        | Statement::Merge(_, _)
        | Statement::Swap(_, _)
        | Statement::Create(_, _)
        | Statement::Load(_, _)
        | Statement::Store(_, _)
        | Statement::PrintSize(_)
        | Statement::Drop(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ram::{CompareOp, Condition, Relation, Value};

    fn sample_program() -> RamProgram {
        // Scan(a, 0, Filter(t0.0 = 1, Scan(b, 1, Filter(t1.0 = t0.0, Project(r, [t0.0, t1.1])))))
        let op = Operation::Scan(
            "a".into(),
            0,
            Box::new(Operation::Scan(
                "b".into(),
                1,
                Box::new(Operation::Filter(
                    Condition::Comparison(CompareOp::Eq, Value::element_access(1, 0), Value::element_access(0, 0))
                        .and(Condition::Comparison(CompareOp::Eq, Value::element_access(0, 0), Value::Number(1))),
                    Box::new(Operation::Project("r".into(), vec![Value::element_access(0, 0), Value::element_access(1, 1)])),
                )),
            )),
        );
        RamProgram {
            main: Statement::Sequence(vec![Statement::Query(op)]),
            relations: vec![
                Relation { name: "a".into(), arity: 1 },
                Relation { name: "b".into(), arity: 2 },
                Relation { name: "r".into(), arity: 2 },
            ],
            subroutines: Vec::new(),
        }
    }

    #[test]
    fn pipeline_floats_conditions_and_builds_indices() {
        let mut program = sample_program();
        let config = Config::default();
        Pipeline::new(&config).run(&mut program);
        let rendered = program.main.pretty(0);
        assert!(rendered.contains("IndexScan"), "expected an IndexScan, got:\n{rendered}");
    }

    #[test]
    fn pipeline_is_idempotent_on_its_own_output() {
        let mut program = sample_program();
        let config = Config::default();
        Pipeline::new(&config).run(&mut program);
        let once = program.main.pretty(0);
        Pipeline::new(&config).run(&mut program);
        assert_eq!(program.main.pretty(0), once);
    }

    #[test]
    fn lookup_arity_falls_back_to_base_relation_for_scratch_relations() {
        let mut arities = HashMap::new();
        arities.insert("reach".to_string(), 2);
        assert_eq!(lookup_arity(&arities, "delta_reach"), Some(2));
        assert_eq!(lookup_arity(&arities, "new_reach"), Some(2));
        assert_eq!(lookup_arity(&arities, "reach"), Some(2));
        assert_eq!(lookup_arity(&arities, "missing"), None);
    }
}
