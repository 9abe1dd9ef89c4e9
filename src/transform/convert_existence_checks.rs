//! `ConvertExistenceChecksTransformer` (§4.4.3).
//!
//! A `Scan`/`IndexScan` whose bound tuple is never read by anything
//! downstream — not its own filter, not the nested operation — only needs
//! to know that *some* matching tuple exists. Folds such a scan away into a
//! bare `ExistenceCheck(R, pattern)` conjoined into the surrounding
//! condition, eliminating the loop entirely.
//!
//! Runs after `create_indices` in the pipeline, so by the time this sees a
//! `Filter` wrapping the scan, every equality indexable on the scan's own
//! tuple has already migrated into the pattern; a residual `Filter`
//! referencing `t` at this point means `t` is genuinely still needed.
//!
//! Negated existence (`NotExistenceCheck`) never needs this rewrite: the
//! translator emits it directly for negated body atoms (§4.3.2) without
//! ever allocating a scan in the first place.

use crate::analysis::operation_references_tuple;
use crate::ram::{Condition, Operation, Pattern, TupleId};
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
            try_fold(rel, t, None, nested, arities, changed)
        }
        Operation::IndexScan(rel, t, pattern, nested) => {
            let nested = rewrite(*nested, arities, changed);
            try_fold(rel, t, Some(pattern), nested, arities, changed)
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

/// `pattern` is `None` for a plain `Scan` (no concrete slots yet); folding
/// such a scan builds a full-arity all-wildcard pattern so the emitted
/// `ExistenceCheck` still satisfies the pattern-arity invariant.
fn try_fold(
    rel: String,
    t: TupleId,
    pattern: Option<Pattern>,
    body: Operation,
    arities: &HashMap<String, usize>,
    changed: &mut bool,
) -> Operation {
    let full_pattern = |rel: &str| -> Pattern {
        match &pattern {
            Some(p) => p.clone(),
            None => vec![None; super::lookup_arity(arities, rel).unwrap_or(0)],
        }
    };

    let Operation::Filter(cond, inner) = body else {
        if operation_references_tuple(&body, t) {
            return rewrap(rel, t, pattern, body);
        }
        *changed = true;
        let existence = Condition::ExistenceCheck(rel.clone(), full_pattern(&rel));
        return Operation::Filter(existence, Box::new(body));
    };

    if condition_references_tuple(&cond, t) || operation_references_tuple(&inner, t) {
        return rewrap(rel, t, pattern, Operation::Filter(cond, inner));
    }

    *changed = true;
    let existence = Condition::ExistenceCheck(rel.clone(), full_pattern(&rel));
    Operation::Filter(cond.and(existence), inner)
}

fn condition_references_tuple(cond: &Condition, t: TupleId) -> bool {
    match cond {
        Condition::Conjunction(l, r) => condition_references_tuple(l, t) || condition_references_tuple(r, t),
        Condition::Comparison(_, lhs, rhs) => value_mentions(lhs, t) || value_mentions(rhs, t),
        Condition::ExistenceCheck(_, pattern) | Condition::NotExistenceCheck(_, pattern) => {
            pattern.iter().flatten().any(|v| value_mentions(v, t))
        }
        Condition::Empty(_) => false,
    }
}

fn value_mentions(value: &crate::ram::Value, t: TupleId) -> bool {
    use crate::ram::Value;
    match value {
        Value::ElementAccess(bound, _, _) => *bound == t,
        Value::Intrinsic(_, args) => args.iter().any(|v| value_mentions(v, t)),
        Value::Pack(args) => args.iter().flatten().any(|v| value_mentions(v, t)),
        Value::Number(_) | Value::Argument(_) | Value::AutoIncrement => false,
    }
}

fn rewrap(rel: String, t: TupleId, pattern: Option<Pattern>, nested: Operation) -> Operation {
    match pattern {
        Some(p) => Operation::IndexScan(rel, t, p, Box::new(nested)),
        None => Operation::Scan(rel, t, Box::new(nested)),
    }
}
