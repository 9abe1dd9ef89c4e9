//! `CreateIndicesTransformer` (§4.4.2).
//!
//! Rewrites `Scan(R, t, Filter(cond, nested))` into `IndexScan(R, t,
//! pattern, Filter(residual, nested))` whenever `cond` contains equalities
//! of the form `ElementAccess(t, c) = E` with `E` computable strictly
//! before `t`. Those equalities become pattern slots; everything else in
//! `cond` survives as a residual filter (dropped entirely if empty).
//!
//! Recurses into every nested operation first so the rewrite also fires on
//! scans introduced deeper in the tree, and into an `Aggregate`'s `source`
//! sub-chain independently.

use crate::ram::Operation;
use crate::transform::support::extract_pattern;
use std::collections::HashMap;

pub fn transform(op: Operation, arities: &HashMap<String, usize>) -> (Operation, bool) {
    let mut changed = false;
    let rewritten = rewrite(op, arities, &mut changed);
    (rewritten, changed)
}

fn rewrite(op: Operation, arities: &HashMap<String, usize>, changed: &mut bool) -> Operation {
    match op {
        Operation::Scan(rel, t, nested) => {
            let nested = rewrite(*nested, arities, changed);
            try_index(rel, t, nested, arities, changed)
        }
        Operation::IndexScan(rel, t, pattern, nested) => {
            Operation::IndexScan(rel, t, pattern, Box::new(rewrite(*nested, arities, changed)))
        }
        Operation::Choice(rel, t, cond, nested) => {
            Operation::Choice(rel, t, cond, Box::new(rewrite(*nested, arities, changed)))
        }
        Operation::IndexChoice(rel, t, pattern, cond, nested) => {
            Operation::IndexChoice(rel, t, pattern, cond, Box::new(rewrite(*nested, arities, changed)))
        }
        Operation::Filter(cond, nested) => {
            Operation::Filter(cond, Box::new(rewrite(*nested, arities, changed)))
        }
        Operation::Lookup(value, arity, t, nested) => {
            Operation::Lookup(value, arity, t, Box::new(rewrite(*nested, arities, changed)))
        }
        Operation::Aggregate(func, value, source, t, nested) => {
            let source = rewrite(*source, arities, changed);
            let nested = rewrite(*nested, arities, changed);
            Operation::Aggregate(func, value, Box::new(source), t, Box::new(nested))
        }
        leaf @ (Operation::Project(..) | Operation::Return(_)) => leaf,
    }
}

/// If `nested` is a `Filter` whose condition yields a non-empty pattern
/// over `rel`'s arity, folds it into an `IndexScan`. Otherwise leaves a
/// plain `Scan` in place.
fn try_index(
    rel: String,
    t: u32,
    nested: Operation,
    arities: &HashMap<String, usize>,
    changed: &mut bool,
) -> Operation {
    let Some(arity) = super::lookup_arity(arities, &rel) else {
        return Operation::Scan(rel, t, Box::new(nested));
    };
    let Operation::Filter(cond, inner) = nested else {
        return Operation::Scan(rel, t, Box::new(nested));
    };

    let (pattern, residual) = extract_pattern(cond, t, arity);
    if pattern.iter().all(Option::is_none) {
        // Nothing indexable: `residual` is the untouched condition.
        let restored = Operation::Filter(residual.expect("original condition preserved"), *inner);
        return Operation::Scan(rel, t, Box::new(restored));
    }

    *changed = true;
    let body = match residual {
        Some(cond) => Operation::Filter(cond, inner),
        None => *inner,
    };
    Operation::IndexScan(rel, t, pattern, Box::new(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ram::{CompareOp, Condition, Value};
    use std::collections::HashMap;

    fn arities() -> HashMap<String, usize> {
        let mut m = HashMap::new();
        m.insert("a".to_string(), 1);
        m.insert("b".to_string(), 2);
        m
    }

    #[test]
    fn folds_leading_equality_into_index_pattern() {
        // Scan(a, 0, Scan(b, 1, Filter(t1.0 = t0.0, Project(r, [t1.1]))))
        let op = Operation::Scan(
            "a".into(),
            0,
            Box::new(Operation::Scan(
                "b".into(),
                1,
                Box::new(Operation::Filter(
                    Condition::Comparison(CompareOp::Eq, Value::element_access(1, 0), Value::element_access(0, 0)),
                    Box::new(Operation::Project("r".into(), vec![Value::element_access(1, 1)])),
                )),
            )),
        );
        let (rewritten, changed) = transform(op, &arities());
        assert!(changed);
        match rewritten {
            Operation::Scan(_, 0, nested) => match *nested {
                Operation::IndexScan(rel, 1, pattern, body) => {
                    assert_eq!(rel, "b");
                    assert_eq!(pattern[0], Some(Value::element_access(0, 0)));
                    assert_eq!(pattern[1], None);
                    assert!(matches!(*body, Operation::Project(..)));
                }
                other => panic!("expected IndexScan, got {other:?}"),
            },
            other => panic!("expected outer Scan(a), got {other:?}"),
        }
    }

    #[test]
    fn leaves_residual_filter_when_condition_has_extra_conjuncts() {
        let op = Operation::Scan(
            "b".into(),
            0,
            Box::new(Operation::Filter(
                Condition::Comparison(CompareOp::Eq, Value::element_access(0, 0), Value::Number(1))
                    .and(Condition::Comparison(CompareOp::Gt, Value::element_access(0, 1), Value::Number(5))),
                Box::new(Operation::Project("r".into(), vec![Value::element_access(0, 1)])),
            )),
        );
        let (rewritten, changed) = transform(op, &arities());
        assert!(changed);
        match rewritten {
            Operation::IndexScan(_, 0, pattern, body) => {
                assert_eq!(pattern[0], Some(Value::Number(1)));
                assert!(matches!(*body, Operation::Filter(..)));
            }
            other => panic!("expected IndexScan, got {other:?}"),
        }
    }

    #[test]
    fn no_change_when_no_column_is_bound_before_the_scan() {
        let op = Operation::Scan(
            "a".into(),
            0,
            Box::new(Operation::Filter(
                Condition::Comparison(CompareOp::Gt, Value::element_access(0, 0), Value::Number(5)),
                Box::new(Operation::Project("r".into(), vec![Value::element_access(0, 0)])),
            )),
        );
        let (rewritten, changed) = transform(op.clone(), &arities());
        assert!(!changed);
        assert_eq!(rewritten, op);
    }
}
