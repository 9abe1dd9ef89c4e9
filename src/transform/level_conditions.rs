//! `LevelConditionsTransformer` (§4.4.1).
//!
//! A fresh translator output already places every condition at its deepest
//! operand's level (`clause::fold_wrappers` builds it that way), but a
//! later pass — most notably `create_indices`, which can strand a residual
//! filter one layer away from where it used to sit — can leave a condition
//! nested deeper than it needs to be. This re-floats every filter to sit
//! immediately inside the binder that introduces its deepest operand,
//! splitting conjunctions first so each conjunct floats independently.

use crate::analysis::condition_level;
use crate::ram::{AggregateFunc, Condition, Operation, Pattern, TupleId, Value};

/// One binder layer peeled off an operation chain, innermost-last.
enum Layer {
    Scan(String, TupleId),
    IndexScan(String, TupleId, Pattern),
    Choice(String, TupleId, Condition),
    IndexChoice(String, TupleId, Pattern, Condition),
    Lookup(Value, usize, TupleId),
    Aggregate(AggregateFunc, Value, Operation, TupleId),
}

impl Layer {
    fn tuple(&self) -> TupleId {
        match self {
            Layer::Scan(_, t)
            | Layer::IndexScan(_, t, _)
            | Layer::Choice(_, t, _)
            | Layer::IndexChoice(_, t, _, _)
            | Layer::Lookup(_, _, t)
            | Layer::Aggregate(_, _, _, t) => *t,
        }
    }

    fn rewrap(self, nested: Operation) -> Operation {
        match self {
            Layer::Scan(rel, t) => Operation::Scan(rel, t, Box::new(nested)),
            Layer::IndexScan(rel, t, pattern) => Operation::IndexScan(rel, t, pattern, Box::new(nested)),
            Layer::Choice(rel, t, cond) => Operation::Choice(rel, t, cond, Box::new(nested)),
            Layer::IndexChoice(rel, t, pattern, cond) => Operation::IndexChoice(rel, t, pattern, cond, Box::new(nested)),
            Layer::Lookup(value, arity, t) => Operation::Lookup(value, arity, t, Box::new(nested)),
            Layer::Aggregate(func, value, source, t) => Operation::Aggregate(func, value, Box::new(source), t, Box::new(nested)),
        }
    }
}

/// Canonicalizes condition placement within one `Query`'s operation tree.
/// Operates on the whole tree at once: an `Aggregate`'s `source` sub-chain
/// is its own independent nest (it peels/refolds separately, recursively),
/// since its tuple ids never escape into the outer chain.
pub fn transform(op: Operation) -> (Operation, bool) {
    let before = op.clone();
    let after = canonicalize(op);
    let changed = after != before;
    (after, changed)
}

fn canonicalize(op: Operation) -> Operation {
    let (layers, conditions, leaf) = peel(op);
    let leaf = match leaf {
        Operation::Aggregate(..) => leaf,
        other => other,
    };
    refold(layers, conditions, leaf)
}

/// Descends through binder/filter nodes, collecting each binder as a
/// `Layer` and each filter's conjuncts as `(target_level, condition)`
/// pairs, until it reaches a leaf (`Project`/`Return`).
fn peel(op: Operation) -> (Vec<Layer>, Vec<(Option<TupleId>, Condition)>, Operation) {
    let mut layers = Vec::new();
    let mut conditions = Vec::new();
    let mut current = op;

    loop {
        match current {
            Operation::Scan(rel, t, nested) => {
                layers.push(Layer::Scan(rel, t));
                current = *nested;
            }
            Operation::IndexScan(rel, t, pattern, nested) => {
                layers.push(Layer::IndexScan(rel, t, pattern));
                current = *nested;
            }
            Operation::Choice(rel, t, cond, nested) => {
                layers.push(Layer::Choice(rel, t, cond));
                current = *nested;
            }
            Operation::IndexChoice(rel, t, pattern, cond, nested) => {
                layers.push(Layer::IndexChoice(rel, t, pattern, cond));
                current = *nested;
            }
            Operation::Lookup(value, arity, t, nested) => {
                layers.push(Layer::Lookup(value, arity, t));
                current = *nested;
            }
            Operation::Aggregate(func, value, source, t, nested) => {
                let (rewritten_source, _) = transform(*source);
                layers.push(Layer::Aggregate(func, value, rewritten_source, t));
                current = *nested;
            }
            Operation::Filter(cond, nested) => {
                for conjunct in cond.conjuncts() {
                    conditions.push((condition_level(conjunct), conjunct.clone()));
                }
                current = *nested;
            }
            leaf @ (Operation::Project(..) | Operation::Return(_)) => {
                return (layers, conditions, leaf);
            }
        }
    }
}

/// Rebuilds the chain inside-out: innermost layer first, attaching every
/// condition targeting that layer's tuple id as a `Filter` immediately
/// inside it. Anything left over (level-free, or targeting a tuple id no
/// longer present) is attached at the very root.
fn refold(layers: Vec<Layer>, mut conditions: Vec<(Option<TupleId>, Condition)>, leaf: Operation) -> Operation {
    let mut current = leaf;

    for layer in layers.into_iter().rev() {
        let here = layer.tuple();
        let (mine, rest): (Vec<_>, Vec<_>) = conditions.into_iter().partition(|(level, _)| *level == Some(here));
        conditions = rest;
        if let Some(cond) = Condition::conjoin(mine.into_iter().map(|(_, c)| c).collect()) {
            current = Operation::Filter(cond, Box::new(current));
        }
        current = layer.rewrap(current);
    }

    if let Some(cond) = Condition::conjoin(conditions.into_iter().map(|(_, c)| c).collect()) {
        current = Operation::Filter(cond, Box::new(current));
    }

    current
}
