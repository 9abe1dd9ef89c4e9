//! Generic pre-order tree rewrite over the four RAM node categories.
//!
//! A `NodeMapper` is a visitor with an extra argument built in: each hook
//! receives an owned node, may inspect or discard it, and must return an
//! owned replacement. The default implementation for every hook recurses
//! into the node's immediate children and reassembles the same variant,
//! which is exactly the identity transform when no hook is overridden.

use super::{CompareOp, Condition, Intrinsic, Operation, Statement, Value};

pub trait NodeMapper {
    fn map_value(&mut self, value: Value) -> Value {
        value.map_children(self)
    }

    fn map_condition(&mut self, cond: Condition) -> Condition {
        cond.map_children(self)
    }

    fn map_operation(&mut self, op: Operation) -> Operation {
        op.map_children(self)
    }

    fn map_statement(&mut self, stmt: Statement) -> Statement {
        stmt.map_children(self)
    }
}

/// A mapper that rebuilds every node unchanged; applying it to any tree
/// yields a structurally equal tree.
pub struct IdentityMapper;

impl NodeMapper for IdentityMapper {}

impl Value {
    /// Remaps each directly owned `Value` child through `mapper`, without
    /// touching `self`'s own variant or scalar fields.
    pub fn map_children<M: NodeMapper + ?Sized>(self, mapper: &mut M) -> Value {
        match self {
            Value::Intrinsic(op, args) => {
                Value::Intrinsic(op, args.into_iter().map(|a| mapper.map_value(a)).collect())
            }
            Value::Pack(args) => Value::Pack(
                args.into_iter()
                    .map(|slot| slot.map(|v| mapper.map_value(v)))
                    .collect(),
            ),
            other @ (Value::Number(_)
            | Value::ElementAccess(..)
            | Value::Argument(_)
            | Value::AutoIncrement) => other,
        }
    }

    /// Direct `Value` children, in the same order `map_children` visits them.
    pub fn value_children(&self) -> Vec<&Value> {
        match self {
            Value::Intrinsic(_, args) => args.iter().collect(),
            Value::Pack(args) => args.iter().flatten().collect(),
            Value::Number(_) | Value::ElementAccess(..) | Value::Argument(_) | Value::AutoIncrement => {
                Vec::new()
            }
        }
    }
}

impl Condition {
    pub fn map_children<M: NodeMapper + ?Sized>(self, mapper: &mut M) -> Condition {
        match self {
            Condition::Conjunction(l, r) => Condition::Conjunction(
                Box::new(mapper.map_condition(*l)),
                Box::new(mapper.map_condition(*r)),
            ),
            Condition::Comparison(op, lhs, rhs) => {
                Condition::Comparison(op, mapper.map_value(lhs), mapper.map_value(rhs))
            }
            Condition::ExistenceCheck(rel, pattern) => Condition::ExistenceCheck(
                rel,
                pattern.into_iter().map(|s| s.map(|v| mapper.map_value(v))).collect(),
            ),
            Condition::NotExistenceCheck(rel, pattern) => Condition::NotExistenceCheck(
                rel,
                pattern.into_iter().map(|s| s.map(|v| mapper.map_value(v))).collect(),
            ),
            Condition::Empty(rel) => Condition::Empty(rel),
        }
    }

    pub fn value_children(&self) -> Vec<&Value> {
        match self {
            Condition::Conjunction(..) => Vec::new(),
            Condition::Comparison(_, lhs, rhs) => vec![lhs, rhs],
            Condition::ExistenceCheck(_, pattern) | Condition::NotExistenceCheck(_, pattern) => {
                pattern.iter().flatten().collect()
            }
            Condition::Empty(_) => Vec::new(),
        }
    }

    pub fn condition_children(&self) -> Vec<&Condition> {
        match self {
            Condition::Conjunction(l, r) => vec![l.as_ref(), r.as_ref()],
            _ => Vec::new(),
        }
    }
}

impl Operation {
    pub fn map_children<M: NodeMapper + ?Sized>(self, mapper: &mut M) -> Operation {
        match self {
            Operation::Scan(rel, t, nested) => {
                Operation::Scan(rel, t, Box::new(mapper.map_operation(*nested)))
            }
            Operation::IndexScan(rel, t, pattern, nested) => Operation::IndexScan(
                rel,
                t,
                pattern.into_iter().map(|s| s.map(|v| mapper.map_value(v))).collect(),
                Box::new(mapper.map_operation(*nested)),
            ),
            Operation::Choice(rel, t, cond, nested) => Operation::Choice(
                rel,
                t,
                mapper.map_condition(cond),
                Box::new(mapper.map_operation(*nested)),
            ),
            Operation::IndexChoice(rel, t, pattern, cond, nested) => Operation::IndexChoice(
                rel,
                t,
                pattern.into_iter().map(|s| s.map(|v| mapper.map_value(v))).collect(),
                mapper.map_condition(cond),
                Box::new(mapper.map_operation(*nested)),
            ),
            Operation::Filter(cond, nested) => {
                Operation::Filter(mapper.map_condition(cond), Box::new(mapper.map_operation(*nested)))
            }
            Operation::Lookup(value, arity, t, nested) => Operation::Lookup(
                mapper.map_value(value),
                arity,
                t,
                Box::new(mapper.map_operation(*nested)),
            ),
            Operation::Aggregate(func, value, source, t, nested) => Operation::Aggregate(
                func,
                mapper.map_value(value),
                Box::new(mapper.map_operation(*source)),
                t,
                Box::new(mapper.map_operation(*nested)),
            ),
            Operation::Project(rel, values) => {
                Operation::Project(rel, values.into_iter().map(|v| mapper.map_value(v)).collect())
            }
            Operation::Return(values) => {
                Operation::Return(values.into_iter().map(|v| mapper.map_value(v)).collect())
            }
        }
    }

    pub fn operation_children(&self) -> Vec<&Operation> {
        match self {
            Operation::Scan(_, _, nested)
            | Operation::IndexScan(_, _, _, nested)
            | Operation::Choice(_, _, _, nested)
            | Operation::IndexChoice(_, _, _, _, nested)
            | Operation::Filter(_, nested)
            | Operation::Lookup(_, _, _, nested) => vec![nested.as_ref()],
            Operation::Aggregate(_, _, source, _, nested) => vec![source.as_ref(), nested.as_ref()],
            Operation::Project(_, _) | Operation::Return(_) => Vec::new(),
        }
    }
}

impl Statement {
    pub fn map_children<M: NodeMapper + ?Sized>(self, mapper: &mut M) -> Statement {
        match self {
            Statement::Sequence(stmts) => {
                Statement::Sequence(stmts.into_iter().map(|s| mapper.map_statement(s)).collect())
            }
            Statement::Parallel(stmts) => {
                Statement::Parallel(stmts.into_iter().map(|s| mapper.map_statement(s)).collect())
            }
            Statement::Loop(body) => Statement::Loop(Box::new(mapper.map_statement(*body))),
            Statement::Exit(cond) => Statement::Exit(mapper.map_condition(cond)),
            Statement::LogTimer(label, body) => {
                Statement::LogTimer(label, Box::new(mapper.map_statement(*body)))
            }
            Statement::Merge(a, b) => Statement::Merge(a, b),
            Statement::Swap(a, b) => Statement::Swap(a, b),
            Statement::Create(rel, arity) => Statement::Create(rel, arity),
            Statement::Load(rel, fmt) => Statement::Load(rel, fmt),
            Statement::Store(rel, fmt) => Statement::Store(rel, fmt),
            Statement::PrintSize(rel) => Statement::PrintSize(rel),
            Statement::Drop(rel) => Statement::Drop(rel),
            Statement::Stratum(idx, body) => Statement::Stratum(idx, Box::new(mapper.map_statement(*body))),
            Statement::Query(op) => Statement::Query(mapper.map_operation(op)),
        }
    }

    pub fn statement_children(&self) -> Vec<&Statement> {
        match self {
            Statement::Sequence(stmts) | Statement::Parallel(stmts) => stmts.iter().collect(),
            Statement::Loop(body) | Statement::LogTimer(_, body) | Statement::Stratum(_, body) => {
                vec![body.as_ref()]
            }
            _ => Vec::new(),
        }
    }
}

/// Useful as a building block for analyses that need operator arity without
/// importing `ast`.
pub fn intrinsic_arity(op: Intrinsic) -> Option<usize> {
    match op {
        Intrinsic::Neg | Intrinsic::LNot => Some(1),
        Intrinsic::Add
        | Intrinsic::Sub
        | Intrinsic::Mul
        | Intrinsic::Div
        | Intrinsic::Mod
        | Intrinsic::BAnd
        | Intrinsic::BOr
        | Intrinsic::BXor
        | Intrinsic::LAnd
        | Intrinsic::LOr
        | Intrinsic::Cat => Some(2),
        Intrinsic::Substr => Some(3),
        Intrinsic::Min | Intrinsic::Max => None,
    }
}

pub fn compare_op_from_symbol(symbol: &str) -> Option<CompareOp> {
    match symbol {
        "=" => Some(CompareOp::Eq),
        "!=" | "<>" => Some(CompareOp::Ne),
        "<" => Some(CompareOp::Lt),
        "<=" => Some(CompareOp::Le),
        ">" => Some(CompareOp::Gt),
        ">=" => Some(CompareOp::Ge),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ram::{CompareOp, Operation, Value};

    fn sample() -> Operation {
        Operation::Scan(
            "a".into(),
            0,
            Box::new(Operation::Filter(
                Condition::Comparison(CompareOp::Eq, Value::element_access(0, 0), Value::Number(1)),
                Box::new(Operation::Project("b".into(), vec![Value::element_access(0, 0)])),
            )),
        )
    }

    #[test]
    fn identity_mapper_preserves_structure() {
        let op = sample();
        let mut mapper = IdentityMapper;
        let rewritten = mapper.map_operation(op.clone());
        assert_eq!(op, rewritten);
    }

    struct ConstantFolder;
    impl NodeMapper for ConstantFolder {
        fn map_value(&mut self, value: Value) -> Value {
            let value = value.map_children(self);
            match &value {
                Value::Intrinsic(Intrinsic::Add, args) if args.len() == 2 => {
                    if let (Value::Number(a), Value::Number(b)) = (&args[0], &args[1]) {
                        return Value::Number(a + b);
                    }
                    value
                }
                _ => value,
            }
        }
    }

    #[test]
    fn custom_mapper_rewrites_nested_values() {
        let op = Operation::Project(
            "r".into(),
            vec![Value::Intrinsic(Intrinsic::Add, vec![Value::Number(2), Value::Number(3)])],
        );
        let mut mapper = ConstantFolder;
        let rewritten = mapper.map_operation(op);
        assert_eq!(rewritten, Operation::Project("r".into(), vec![Value::Number(5)]));
    }

    #[test]
    fn operation_children_reports_aggregate_source_and_nested() {
        let agg = Operation::Aggregate(
            crate::ram::AggregateFunc::Count,
            Value::element_access(1, 0),
            Box::new(Operation::Scan("s".into(), 1, Box::new(Operation::Return(vec![])))),
            2,
            Box::new(Operation::Return(vec![])),
        );
        assert_eq!(agg.operation_children().len(), 2);
    }
}
