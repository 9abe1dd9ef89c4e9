//! `SearchesToChoicesTransformer` (§4.4.4).
//!
//! Narrows `Scan(R, t, Filter(cond, nested))` to `Choice(R, t, cond,
//! nested)` when `t` is only ever used by `cond` itself — never by
//! `nested`, never by anything past this filter. A `Choice` commits to the
//! first matching tuple instead of enumerating every one, which is
//! semantically equivalent whenever nothing downstream distinguishes which
//! witness was picked (§9, open question: the safe policy this
//! implementation follows is that `t` appears only inside `cond` and
//! nowhere else — not in `nested`, not in any outer aggregation source or
//! lookup reachable from `nested`).
//!
//! If the filter's condition splits into an indexable pattern (per
//! `create_indices`'s rule), yields `IndexChoice` instead of `Choice`
//! directly, so this pass doesn't need to run before `create_indices` to
//! get the indexed form.

use crate::analysis::operation_references_tuple;
use crate::ram::{Operation, TupleId};
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
            try_narrow(rel, t, nested, arities, changed)
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

/// `nested` is the (already-rewritten) operation directly under the scan.
/// Narrows to `Choice`/`IndexChoice` only when `t` is referenced by the
/// wrapping `Filter`'s own condition and nowhere past it.
fn try_narrow(rel: String, t: TupleId, nested: Operation, arities: &HashMap<String, usize>, changed: &mut bool) -> Operation {
    let Operation::Filter(cond, inner) = nested else {
        return Operation::Scan(rel, t, Box::new(nested));
    };

    if operation_references_tuple(&inner, t) {
        return Operation::Scan(rel, t, Box::new(Operation::Filter(cond, inner)));
    }

    *changed = true;
    match super::lookup_arity(arities, &rel) {
        Some(arity) => {
            let (pattern, residual) = extract_pattern(cond.clone(), t, arity);
            if pattern.iter().any(Option::is_some) {
                let choice_cond = residual.unwrap_or(cond);
                return Operation::IndexChoice(rel, t, pattern, choice_cond, inner);
            }
            Operation::Choice(rel, t, cond, inner)
        }
        None => Operation::Choice(rel, t, cond, inner),
    }
}
