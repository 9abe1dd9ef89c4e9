//! # Analyses
//!
//! Pure, stateless functions from a RAM subtree to a derived fact. None of
//! these cache anything and none of them mutate the tree — they are cheap
//! enough that the transformer pipeline just re-requests them after every
//! rewrite rather than threading incremental state through.

use crate::ram::{Condition, Operation, Pattern, TupleId, Value};

/// The deepest (largest) tuple id referenced inside a `Value`, or `None` if
/// the value is tuple-free (usable at any level, including before the
/// outermost scan).
pub fn expression_level(value: &Value) -> Option<TupleId> {
    match value {
        Value::ElementAccess(t, _, _) => Some(*t),
        Value::Intrinsic(_, args) => args.iter().filter_map(expression_level).max(),
        Value::Pack(args) => args.iter().flatten().filter_map(expression_level).max(),
        Value::Number(_) | Value::Argument(_) | Value::AutoIncrement => None,
    }
}

/// The deepest tuple id a `Condition` depends on. A condition can be placed
/// immediately inside the scan that introduces that id.
pub fn condition_level(cond: &Condition) -> Option<TupleId> {
    match cond {
        Condition::Conjunction(l, r) => {
            condition_level(l).into_iter().chain(condition_level(r)).max()
        }
        Condition::Comparison(_, lhs, rhs) => {
            expression_level(lhs).into_iter().chain(expression_level(rhs)).max()
        }
        Condition::ExistenceCheck(_, pattern) | Condition::NotExistenceCheck(_, pattern) => {
            pattern_level(pattern)
        }
        Condition::Empty(_) => None,
    }
}

fn pattern_level(pattern: &Pattern) -> Option<TupleId> {
    pattern.iter().flatten().filter_map(expression_level).max()
}

/// Whether a `Value` is a compile-time constant: a number, or an intrinsic
/// applied purely to constants. `ElementAccess`, `Argument`, and
/// `AutoIncrement` are never constant.
pub fn const_value(value: &Value) -> bool {
    match value {
        Value::Number(_) => true,
        Value::Intrinsic(_, args) => args.iter().all(const_value),
        Value::Pack(args) => args.iter().flatten().all(const_value),
        Value::ElementAccess(..) | Value::Argument(_) | Value::AutoIncrement => false,
    }
}

/// A bitmask over a pattern's slots: bit `i` set iff `pattern[i]` is a
/// concrete (non-wildcard) value.
pub fn index_scan_keys(pattern: &Pattern) -> u64 {
    let mut mask = 0u64;
    for (i, slot) in pattern.iter().enumerate() {
        if slot.is_some() {
            mask |= 1 << i;
        }
    }
    mask
}

/// Whether tuple id `t` is referenced anywhere inside `op` (used by
/// `ConvertExistenceChecksTransformer`/`SearchesToChoicesTransformer` to
/// decide if a scan's binding is still needed downstream).
pub fn operation_references_tuple(op: &Operation, t: TupleId) -> bool {
    match op {
        Operation::Scan(_, bound, nested) => *bound == t || operation_references_tuple(nested, t),
        Operation::IndexScan(_, bound, pattern, nested) => {
            *bound == t || pattern_references_tuple(pattern, t) || operation_references_tuple(nested, t)
        }
        Operation::Choice(_, bound, cond, nested) => {
            *bound == t || condition_references_tuple(cond, t) || operation_references_tuple(nested, t)
        }
        Operation::IndexChoice(_, bound, pattern, cond, nested) => {
            *bound == t
                || pattern_references_tuple(pattern, t)
                || condition_references_tuple(cond, t)
                || operation_references_tuple(nested, t)
        }
        Operation::Filter(cond, nested) => {
            condition_references_tuple(cond, t) || operation_references_tuple(nested, t)
        }
        Operation::Lookup(value, _, bound, nested) => {
            *bound == t || value_references_tuple(value, t) || operation_references_tuple(nested, t)
        }
        Operation::Aggregate(_, value, source, bound, nested) => {
            *bound == t
                || value_references_tuple(value, t)
                || operation_references_tuple(source, t)
                || operation_references_tuple(nested, t)
        }
        Operation::Project(_, values) => values.iter().any(|v| value_references_tuple(v, t)),
        Operation::Return(values) => values.iter().any(|v| value_references_tuple(v, t)),
    }
}

fn value_references_tuple(value: &Value, t: TupleId) -> bool {
    match value {
        Value::ElementAccess(bound, _, _) => *bound == t,
        Value::Intrinsic(_, args) => args.iter().any(|v| value_references_tuple(v, t)),
        Value::Pack(args) => args.iter().flatten().any(|v| value_references_tuple(v, t)),
        Value::Number(_) | Value::Argument(_) | Value::AutoIncrement => false,
    }
}

fn condition_references_tuple(cond: &Condition, t: TupleId) -> bool {
    match cond {
        Condition::Conjunction(l, r) => condition_references_tuple(l, t) || condition_references_tuple(r, t),
        Condition::Comparison(_, lhs, rhs) => value_references_tuple(lhs, t) || value_references_tuple(rhs, t),
        Condition::ExistenceCheck(_, pattern) | Condition::NotExistenceCheck(_, pattern) => {
            pattern_references_tuple(pattern, t)
        }
        Condition::Empty(_) => false,
    }
}

fn pattern_references_tuple(pattern: &Pattern, t: TupleId) -> bool {
    pattern.iter().flatten().any(|v| value_references_tuple(v, t))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ram::{AggregateFunc, CompareOp, Intrinsic};

    #[test]
    fn expression_level_of_tuple_free_value_is_none() {
        assert_eq!(expression_level(&Value::Number(4)), None);
    }

    #[test]
    fn expression_level_takes_deepest_operand() {
        let value = Value::Intrinsic(
            Intrinsic::Add,
            vec![Value::element_access(0, 0), Value::element_access(2, 1)],
        );
        assert_eq!(expression_level(&value), Some(2));
    }

    #[test]
    fn condition_level_at_least_expression_level_of_operands() {
        let value = Value::element_access(3, 0);
        let cond = Condition::Comparison(CompareOp::Eq, value.clone(), Value::Number(1));
        assert!(expression_level(&value) <= condition_level(&cond));
    }

    #[test]
    fn const_value_true_for_numbers_and_pure_intrinsics() {
        let v = Value::Intrinsic(Intrinsic::Add, vec![Value::Number(1), Value::Number(2)]);
        assert!(const_value(&v));
    }

    #[test]
    fn const_value_false_once_element_access_appears() {
        let v = Value::Intrinsic(Intrinsic::Add, vec![Value::Number(1), Value::element_access(0, 0)]);
        assert!(!const_value(&v));
    }

    #[test]
    fn index_scan_keys_masks_concrete_slots() {
        let pattern = vec![Some(Value::Number(1)), None, Some(Value::Number(2))];
        assert_eq!(index_scan_keys(&pattern), 0b101);
    }

    #[test]
    fn operation_references_tuple_detects_downstream_project() {
        let op = Operation::Project("r".into(), vec![Value::element_access(0, 0)]);
        assert!(operation_references_tuple(&op, 0));
        assert!(!operation_references_tuple(&op, 1));
    }

    #[test]
    fn aggregate_func_keyword_roundtrip_smoke() {
        assert_eq!(AggregateFunc::Sum.keyword(), "SUM");
    }
}
