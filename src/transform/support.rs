//! Shared helpers for the index-pattern-extracting transformers.

use crate::analysis::expression_level;
use crate::ram::{CompareOp, Condition, Pattern, TupleId, Value};

/// If `cond` is an equality between `ElementAccess(t, col)` and an
/// expression no deeper than `t`'s own enclosing scope, returns the column
/// and the other side — usable as an `IndexScan`/`IndexChoice` pattern
/// slot. Checked in both operand orders.
pub fn as_index_equality(cond: &Condition, t: TupleId) -> Option<(usize, Value)> {
    let Condition::Comparison(CompareOp::Eq, lhs, rhs) = cond else {
        return None;
    };
    if let Value::ElementAccess(bound, col, _) = lhs {
        if *bound == t && expression_level(rhs) < Some(t) {
            return Some((*col, rhs.clone()));
        }
    }
    if let Value::ElementAccess(bound, col, _) = rhs {
        if *bound == t && expression_level(lhs) < Some(t) {
            return Some((*col, lhs.clone()));
        }
    }
    None
}

/// Splits `cond`'s conjuncts into an index pattern of length `arity` (first
/// equality per column wins) and whatever is left over as a residual
/// condition.
pub fn extract_pattern(cond: Condition, t: TupleId, arity: usize) -> (Pattern, Option<Condition>) {
    let mut pattern: Pattern = vec![None; arity];
    let mut claimed = vec![false; arity];
    let mut residual = Vec::new();

    for conjunct in cond.conjuncts().into_iter().cloned() {
        match as_index_equality(&conjunct, t) {
            Some((col, value)) if col < arity && !claimed[col] => {
                claimed[col] = true;
                pattern[col] = Some(value);
            }
            _ => residual.push(conjunct),
        }
    }

    (pattern, Condition::conjoin(residual))
}
