//! Single-clause lowering (§4.3.2, §4.3.3).
//!
//! `lower_clause` builds the loop nest for one rule body in one pass: body
//! literals are scanned left to right, each positive atom allocating a
//! fresh sequential tuple id; every other literal (negation, comparison,
//! functor equality, record destructuring) is recorded as a *pending*
//! condition tagged with the deepest tuple id it depends on
//! ([`crate::analysis::condition_level`]/`expression_level`). The nest is
//! then assembled inside-out, each pending condition folded into a `Filter`
//! immediately inside the scan/lookup that introduces its level — this is
//! exactly "placed at the deepest level where all operands are ground"
//! (§4.3.2), so [`crate::transform::LevelConditionsTransformer`] is a no-op
//! on fresh translator output and only earns its keep after later rewrites
//! (e.g. index creation) reintroduce residual filters.
//!
//! The caller supplies a `finish` closure that turns the translated head
//! values into the clause's terminal operation — a `Project` for ordinary
//! rules, a `Filter(NotExistenceCheck(...), Project(new_R, ...))` for a
//! semi-naive recursive variant (§4.3.4), or a `Return` for a provenance
//! subproof (§4.3.5) — so this module stays agnostic to which of those
//! three shapes it is building.

use super::intrinsics;
use super::value_index::{Location, ValueIndex};
use crate::ast::{AggregateFunc as AstAggregateFunc, Atom, BodyPredicate, Rule, Term};
use crate::error::{ErrorReport, TranslateError};
use crate::ram::{AggregateFunc as RamAggregateFunc, CompareOp, Condition, Operation, Pattern, TupleId, Value};
use crate::upstream::TypeEnvironment;

/// Everything clause lowering needs to know about *where* it is, for error
/// attribution and relation-arity lookups.
pub struct ClauseCtx<'a> {
    pub types: &'a TypeEnvironment,
    pub relation: &'a str,
    pub clause_index: usize,
}

/// A loop-nest layer collected while scanning the clause body, assembled
/// inside-out once the head is known.
enum NestWrapper {
    Scan(String, TupleId),
    Lookup(Value, usize, TupleId),
    Aggregate(RamAggregateFunc, Value, Operation, TupleId),
}

impl NestWrapper {
    fn tuple_id(&self) -> TupleId {
        match self {
            NestWrapper::Scan(_, t) | NestWrapper::Lookup(_, _, t) | NestWrapper::Aggregate(_, _, _, t) => *t,
        }
    }

    fn wrap(self, nested: Operation) -> Operation {
        match self {
            NestWrapper::Scan(rel, t) => Operation::Scan(rel, t, Box::new(nested)),
            NestWrapper::Lookup(value, arity, t) => Operation::Lookup(value, arity, t, Box::new(nested)),
            NestWrapper::Aggregate(func, value, source, t) => {
                Operation::Aggregate(func, value, Box::new(source), t, Box::new(nested))
            }
        }
    }
}

/// Lowers `rule`'s body into a loop nest and hands the translated head
/// values to `finish` to produce the terminal operation. `atom_relation`
/// renames a positive body atom's relation for the scan it becomes (the
/// identity for ordinary translation; delta substitution for one atom in a
/// semi-naive recursive variant, §4.3.4). `argument_bindings` pre-binds head
/// variables to a provenance subroutine's `Argument(i)` parameters (§4.3.5;
/// empty for ordinary translation) — seeded before the body is scanned, so a
/// body occurrence of a pre-bound variable becomes an equality filter
/// against the argument instead of defining a fresh scan location. Returns
/// `None` if any invariant fires; the caller has already observed the
/// pushed `TranslateError`(s).
pub fn lower_clause<F>(
    rule: &Rule,
    ctx: &ClauseCtx,
    atom_relation: &dyn Fn(&str) -> String,
    argument_bindings: &[(String, usize)],
    finish: F,
    errors: &mut ErrorReport,
) -> Option<Operation>
where
    F: FnOnce(Vec<Value>, &ValueIndex) -> Operation,
{
    let mut value_index = ValueIndex::new();
    for (name, index) in argument_bindings {
        value_index.bind_argument(name, *index);
    }
    let mut wrappers: Vec<NestWrapper> = Vec::new();
    let mut pending: Vec<(Option<TupleId>, Condition)> = Vec::new();
    let mut next_tuple_id: TupleId = 0;
    let mut ok = true;

    for pred in &rule.body {
        match pred {
            BodyPredicate::Positive(atom) => {
                if !check_arity(atom, ctx, errors) {
                    ok = false;
                    continue;
                }
                let level = next_tuple_id;
                next_tuple_id += 1;
                wrappers.push(NestWrapper::Scan(atom_relation(&atom.relation), level));
                for (col, term) in atom.args.iter().enumerate() {
                    if !bind_term_at(
                        term,
                        level,
                        col,
                        &mut value_index,
                        &mut pending,
                        &mut wrappers,
                        &mut next_tuple_id,
                        ctx,
                        errors,
                    ) {
                        ok = false;
                    }
                }
            }
            BodyPredicate::Negated(atom) => {
                if !check_arity(atom, ctx, errors) {
                    ok = false;
                    continue;
                }
                match atom_pattern(atom, &value_index, ctx, errors) {
                    Some(pattern) => {
                        let cond = Condition::NotExistenceCheck(atom_relation(&atom.relation), pattern);
                        let level = crate::analysis::condition_level(&cond);
                        pending.push((level, cond));
                    }
                    None => ok = false,
                }
            }
            BodyPredicate::Comparison(lhs, op, rhs) => {
                let lv = translate_value_term(lhs, &value_index, ctx, errors);
                let rv = translate_value_term(rhs, &value_index, ctx, errors);
                match (lv, rv) {
                    (Some(l), Some(r)) => {
                        let cond = Condition::Comparison(intrinsics::to_ram_compare_op(*op), l, r);
                        let level = crate::analysis::condition_level(&cond);
                        pending.push((level, cond));
                    }
                    _ => ok = false,
                }
            }
        }
    }

    if !ok {
        return None;
    }

    for term in &rule.head.args {
        if let Term::Aggregate(func, var) = term {
            match build_aggregate_wrapper(func, var, rule, &value_index, &mut next_tuple_id, ctx, errors) {
                Some((wrapper, loc)) => {
                    value_index.define_aggregate(var, loc);
                    wrappers.push(wrapper);
                }
                None => ok = false,
            }
        }
    }

    if !ok {
        return None;
    }

    let head_values: Option<Vec<Value>> = rule
        .head
        .args
        .iter()
        .map(|t| translate_value_term(t, &value_index, ctx, errors))
        .collect();
    let head_values = head_values?;

    if let Some(expected) = ctx.types.arity(ctx.relation) {
        if head_values.len() != expected {
            errors.push(TranslateError::ArityMismatch {
                relation: ctx.relation.to_string(),
                expected,
                actual: head_values.len(),
            });
            return None;
        }
    }

    let mut node = finish(head_values, &value_index);
    node = fold_wrappers(wrappers, pending, node);
    Some(node)
}

/// Folds pending conditions and nest wrappers around `node`, inside-out:
/// the last-pushed (deepest) wrapper is applied first.
fn fold_wrappers(wrappers: Vec<NestWrapper>, mut pending: Vec<(Option<TupleId>, Condition)>, mut node: Operation) -> Operation {
    for wrapper in wrappers.into_iter().rev() {
        let bound = wrapper.tuple_id();
        let mut at_level = Vec::new();
        pending.retain(|(level, cond)| {
            if *level == Some(bound) {
                at_level.push(cond.clone());
                false
            } else {
                true
            }
        });
        if let Some(cond) = Condition::conjoin(at_level) {
            node = Operation::Filter(cond, Box::new(node));
        }
        node = wrapper.wrap(node);
    }
    let root_conds: Vec<Condition> = pending.into_iter().map(|(_, c)| c).collect();
    if let Some(cond) = Condition::conjoin(root_conds) {
        node = Operation::Filter(cond, Box::new(node));
    }
    node
}

fn check_arity(atom: &Atom, ctx: &ClauseCtx, errors: &mut ErrorReport) -> bool {
    match ctx.types.arity(&atom.relation) {
        Some(expected) if expected != atom.arity() => {
            errors.push(TranslateError::ArityMismatch {
                relation: atom.relation.clone(),
                expected,
                actual: atom.arity(),
            });
            false
        }
        Some(_) => true,
        None => {
            errors.push(TranslateError::UnknownRelation {
                relation: atom.relation.clone(),
            });
            false
        }
    }
}

/// Binds one column of one positive-atom scan: records a variable's
/// definition point, or (on a repeated variable, constant, functor, or
/// record pattern) pushes whatever condition/wrapper makes the column
/// match.
#[allow(clippy::too_many_arguments)]
fn bind_term_at(
    term: &Term,
    level: TupleId,
    col: usize,
    value_index: &mut ValueIndex,
    pending: &mut Vec<(Option<TupleId>, Condition)>,
    wrappers: &mut Vec<NestWrapper>,
    next_tuple_id: &mut TupleId,
    ctx: &ClauseCtx,
    errors: &mut ErrorReport,
) -> bool {
    match term {
        Term::Variable(name) => {
            if let Some(index) = value_index.argument_index(name) {
                let cond = Condition::Comparison(CompareOp::Eq, Value::element_access(level, col), Value::Argument(index));
                pending.push((Some(level), cond));
                return true;
            }
            let here = Location::new(level, col);
            if !value_index.define_variable(name, here) {
                let canonical = value_index.variable_location(name).expect("just failed to define => already bound");
                let cond = Condition::Comparison(
                    CompareOp::Eq,
                    Value::element_access(level, col),
                    Value::element_access(canonical.level, canonical.column),
                );
                let lvl = crate::analysis::condition_level(&cond);
                pending.push((lvl, cond));
            }
            true
        }
        Term::Constant(n) => {
            pending.push((
                Some(level),
                Condition::Comparison(CompareOp::Eq, Value::element_access(level, col), Value::Number(*n)),
            ));
            true
        }
        Term::Placeholder => true,
        Term::FunctionCall(..) | Term::RecordInit(..) => match translate_value_term(term, value_index, ctx, errors) {
            Some(value) => {
                let lvl = crate::analysis::expression_level(&value).max(Some(level));
                pending.push((
                    lvl,
                    Condition::Comparison(CompareOp::Eq, Value::element_access(level, col), value),
                ));
                true
            }
            None => false,
        },
        Term::RecordPattern(fields) => {
            let lookup_level = *next_tuple_id;
            *next_tuple_id += 1;
            for (idx, (name, _inner)) in fields.iter().enumerate() {
                let here = Location::new(lookup_level, idx);
                if !value_index.define_variable(name, here) {
                    let canonical = value_index.variable_location(name).expect("just failed to define => already bound");
                    let cond = Condition::Comparison(
                        CompareOp::Eq,
                        Value::element_access(lookup_level, idx),
                        Value::element_access(canonical.level, canonical.column),
                    );
                    let lvl = crate::analysis::condition_level(&cond);
                    pending.push((lvl, cond));
                }
            }
            wrappers.push(NestWrapper::Lookup(Value::element_access(level, col), fields.len(), lookup_level));
            true
        }
        Term::Aggregate(..) => {
            errors.push(TranslateError::UnsupportedShape {
                detail: format!(
                    "aggregate term nested inside an atom argument, clause {} of relation `{}`",
                    ctx.clause_index, ctx.relation
                ),
            });
            false
        }
    }
}

/// Translates a term that must already be fully ground into a `Value`:
/// used for head arguments and comparison operands. Never binds a new
/// location — an unbound variable here is a fatal ungrounded reference.
pub fn translate_value_term(term: &Term, value_index: &ValueIndex, ctx: &ClauseCtx, errors: &mut ErrorReport) -> Option<Value> {
    match term {
        Term::Variable(name) => {
            if let Some(index) = value_index.argument_index(name) {
                return Some(Value::Argument(index));
            }
            match value_index.variable_location(name) {
                Some(loc) => Some(Value::element_access(loc.level, loc.column)),
                None => {
                    errors.push(TranslateError::UngroundedVariable {
                        relation: ctx.relation.to_string(),
                        clause: ctx.clause_index,
                        variable: name.clone(),
                    });
                    None
                }
            }
        }
        Term::Constant(n) => Some(Value::Number(*n)),
        Term::Placeholder => {
            errors.push(TranslateError::UnsupportedShape {
                detail: format!(
                    "wildcard used in a value-producing position, clause {} of relation `{}`",
                    ctx.clause_index, ctx.relation
                ),
            });
            None
        }
        Term::Aggregate(_, var) => match value_index.aggregate_location(var) {
            Some(loc) => Some(Value::element_access(loc.level, loc.column)),
            None => {
                errors.push(TranslateError::UndefinedAggregateLookup {
                    relation: ctx.relation.to_string(),
                    clause: ctx.clause_index,
                });
                None
            }
        },
        Term::FunctionCall(op, args) => {
            let values: Option<Vec<Value>> = args.iter().map(|a| translate_value_term(a, value_index, ctx, errors)).collect();
            values.map(|vs| Value::Intrinsic(intrinsics::to_ram_intrinsic(*op), vs))
        }
        Term::RecordInit(fields) => {
            let values: Option<Vec<Option<Value>>> = fields
                .iter()
                .map(|slot| match slot {
                    Some(t) => translate_value_term(t, value_index, ctx, errors).map(Some),
                    None => Some(None),
                })
                .collect();
            values.map(Value::Pack)
        }
        Term::RecordPattern(_) => {
            errors.push(TranslateError::UnsupportedShape {
                detail: format!(
                    "record pattern used in a value-producing position, clause {} of relation `{}`",
                    ctx.clause_index, ctx.relation
                ),
            });
            None
        }
    }
}

fn atom_pattern(atom: &Atom, value_index: &ValueIndex, ctx: &ClauseCtx, errors: &mut ErrorReport) -> Option<Pattern> {
    let mut failed = false;
    let pattern: Pattern = atom
        .args
        .iter()
        .map(|t| match t {
            Term::Variable(name) => match value_index.variable_location(name) {
                Some(loc) => Some(Value::element_access(loc.level, loc.column)),
                None => {
                    errors.push(TranslateError::UngroundedVariable {
                        relation: ctx.relation.to_string(),
                        clause: ctx.clause_index,
                        variable: name.clone(),
                    });
                    failed = true;
                    None
                }
            },
            Term::Constant(n) => Some(Value::Number(*n)),
            Term::Placeholder => None,
            _ => {
                errors.push(TranslateError::UnsupportedShape {
                    detail: format!(
                        "unsupported term in a negated-atom pattern, clause {} of relation `{}`",
                        ctx.clause_index, ctx.relation
                    ),
                });
                failed = true;
                None
            }
        })
        .collect();
    if failed {
        None
    } else {
        Some(pattern)
    }
}

/// Builds the `source` nest and per-row value expression for one head
/// aggregate term (§4.3.2 "aggregator"). The source re-scans every positive
/// body atom that mentions `var`, correlated back to whatever the outer
/// clause has already bound (by seeding the inner `ValueIndex` with a copy
/// of the outer one, so a variable shared with the outer scope becomes an
/// equality filter rather than a fresh binding — exactly the existing
/// `bind_term_at` behavior, reused unchanged).
fn build_aggregate_wrapper(
    func: &AstAggregateFunc,
    var: &str,
    rule: &Rule,
    outer: &ValueIndex,
    next_tuple_id: &mut TupleId,
    ctx: &ClauseCtx,
    errors: &mut ErrorReport,
) -> Option<(NestWrapper, Location)> {
    let mut inner_index = outer.clone();
    let mut inner_wrappers: Vec<NestWrapper> = Vec::new();
    let mut inner_pending: Vec<(Option<TupleId>, Condition)> = Vec::new();
    let mut touched = false;
    let mut ok = true;

    for atom in rule.positive_body_atoms() {
        if !atom.variables().contains(var) {
            continue;
        }
        touched = true;
        if !check_arity(atom, ctx, errors) {
            ok = false;
            continue;
        }
        let level = *next_tuple_id;
        *next_tuple_id += 1;
        inner_wrappers.push(NestWrapper::Scan(atom.relation.clone(), level));
        for (col, term) in atom.args.iter().enumerate() {
            if !bind_term_at(
                term,
                level,
                col,
                &mut inner_index,
                &mut inner_pending,
                &mut inner_wrappers,
                next_tuple_id,
                ctx,
                errors,
            ) {
                ok = false;
            }
        }
    }

    if !touched {
        errors.push(TranslateError::UndefinedAggregateLookup {
            relation: ctx.relation.to_string(),
            clause: ctx.clause_index,
        });
        return None;
    }
    if !ok {
        return None;
    }

    let value = match inner_index.variable_location(var) {
        Some(loc) => Value::element_access(loc.level, loc.column),
        None => {
            errors.push(TranslateError::UngroundedVariable {
                relation: ctx.relation.to_string(),
                clause: ctx.clause_index,
                variable: var.to_string(),
            });
            return None;
        }
    };

    let source = fold_wrappers(inner_wrappers, inner_pending, Operation::Return(Vec::new()));

    let result_tuple = *next_tuple_id;
    *next_tuple_id += 1;
    let ram_func = match func {
        AstAggregateFunc::Count => RamAggregateFunc::Count,
        AstAggregateFunc::Sum => RamAggregateFunc::Sum,
        AstAggregateFunc::Min => RamAggregateFunc::Min,
        AstAggregateFunc::Max => RamAggregateFunc::Max,
    };
    Some((NestWrapper::Aggregate(ram_func, value, source, result_tuple), Location::new(result_tuple, 0)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builders::RuleBuilder;
    use crate::ast::{ComparisonOp, RelationDecl};
    use crate::upstream::TypeEnvironment;

    fn types() -> TypeEnvironment {
        let mut program = crate::ast::Program::new();
        program.add_relation(RelationDecl::new("a", 2));
        program.add_relation(RelationDecl::new("b", 2));
        program.add_relation(RelationDecl::new("c", 2));
        TypeEnvironment::from_program(&program)
    }

    fn identity(rel: &str) -> String {
        rel.to_string()
    }

    #[test]
    fn simple_join_places_filter_at_deepest_level() {
        let types = types();
        let rule = RuleBuilder::new("c")
            .head_vars(["x", "z"])
            .body_atom("a", ["x", "y"])
            .body_atom("b", ["y", "z"])
            .build();
        let ctx = ClauseCtx {
            types: &types,
            relation: "c",
            clause_index: 0,
        };
        let mut errors = ErrorReport::new();
        let op = lower_clause(&rule, &ctx, &identity, &[], |values, _| Operation::Project("c".into(), values), &mut errors).unwrap();
        assert!(errors.is_empty());

        match op {
            Operation::Scan(rel_a, 0, inner) => {
                assert_eq!(rel_a, "a");
                match *inner {
                    Operation::Scan(rel_b, 1, inner2) => {
                        assert_eq!(rel_b, "b");
                        match *inner2 {
                            Operation::Filter(cond, proj) => {
                                assert_eq!(
                                    cond,
                                    Condition::Comparison(
                                        CompareOp::Eq,
                                        Value::element_access(0, 1),
                                        Value::element_access(1, 0)
                                    )
                                );
                                assert_eq!(
                                    *proj,
                                    Operation::Project("c".into(), vec![Value::element_access(0, 0), Value::element_access(1, 1)])
                                );
                            }
                            other => panic!("expected filter innermost, got {other:?}"),
                        }
                    }
                    other => panic!("expected inner scan over b, got {other:?}"),
                }
            }
            other => panic!("expected outer scan over a, got {other:?}"),
        }
    }

    #[test]
    fn negation_and_constant_comparison_stay_at_level_zero() {
        let mut program = crate::ast::Program::new();
        program.add_relation(RelationDecl::new("a", 1));
        program.add_relation(RelationDecl::new("b", 1));
        program.add_relation(RelationDecl::new("p", 1));
        let types = TypeEnvironment::from_program(&program);
        let rule = RuleBuilder::new("p")
            .head_vars(["x"])
            .body_atom("a", ["x"])
            .body_negated("b", ["x"])
            .body_comparison(Term::Variable("x".into()), ComparisonOp::GreaterThan, Term::Constant(10))
            .build();
        let ctx = ClauseCtx {
            types: &types,
            relation: "p",
            clause_index: 0,
        };
        let mut errors = ErrorReport::new();
        let op = lower_clause(&rule, &ctx, &identity, &[], |values, _| Operation::Project("p".into(), values), &mut errors).unwrap();
        assert!(errors.is_empty());

        match op {
            Operation::Scan(rel, 0, inner) => {
                assert_eq!(rel, "a");
                match *inner {
                    Operation::Filter(cond, proj) => {
                        let conjuncts = cond.conjuncts();
                        assert_eq!(conjuncts.len(), 2);
                        assert!(matches!(conjuncts[0], Condition::NotExistenceCheck(..)));
                        assert!(matches!(conjuncts[1], Condition::Comparison(CompareOp::Gt, ..)));
                        assert_eq!(*proj, Operation::Project("p".into(), vec![Value::element_access(0, 0)]));
                    }
                    other => panic!("expected filter directly inside the only scan, got {other:?}"),
                }
            }
            other => panic!("expected scan over a at level 0, got {other:?}"),
        }
    }

    #[test]
    fn ungrounded_head_variable_is_reported_not_panicked() {
        let types = types();
        let rule = RuleBuilder::new("c").head_vars(["x", "q"]).body_atom("a", ["x", "y"]).build();
        let ctx = ClauseCtx {
            types: &types,
            relation: "c",
            clause_index: 2,
        };
        let mut errors = ErrorReport::new();
        let op = lower_clause(&rule, &ctx, &identity, &[], |values, _| Operation::Project("c".into(), values), &mut errors);
        assert!(op.is_none());
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn arity_mismatch_on_body_atom_is_reported() {
        let types = types();
        let rule = RuleBuilder::new("c").head_vars(["x", "y"]).body_atom("a", ["x", "y", "z"]).build();
        let ctx = ClauseCtx {
            types: &types,
            relation: "c",
            clause_index: 0,
        };
        let mut errors = ErrorReport::new();
        let op = lower_clause(&rule, &ctx, &identity, &[], |values, _| Operation::Project("c".into(), values), &mut errors);
        assert!(op.is_none());
        assert!(matches!(errors.iter().next(), Some(TranslateError::ArityMismatch { .. })));
    }

    #[test]
    fn count_aggregate_wraps_correlated_source() {
        let mut program = crate::ast::Program::new();
        program.add_relation(RelationDecl::new("a", 2));
        program.add_relation(RelationDecl::new("result", 2));
        let types = TypeEnvironment::from_program(&program);
        let rule = Rule::new(
            Atom::new("result", vec![Term::Variable("x".into()), Term::Aggregate(AstAggregateFunc::Count, "y".into())]),
            vec![BodyPredicate::Positive(Atom::new(
                "a",
                vec![Term::Variable("x".into()), Term::Variable("y".into())],
            ))],
        );
        let ctx = ClauseCtx {
            types: &types,
            relation: "result",
            clause_index: 0,
        };
        let mut errors = ErrorReport::new();
        let op = lower_clause(&rule, &ctx, &identity, &[], |values, _| Operation::Project("result".into(), values), &mut errors).unwrap();
        assert!(errors.is_empty());

        match op {
            Operation::Scan(_, 0, inner) => match *inner {
                Operation::Aggregate(func, value, source, result_tuple, nested) => {
                    assert_eq!(func, RamAggregateFunc::Count);
                    assert_eq!(value, Value::element_access(1, 1));
                    assert!(matches!(*source, Operation::Scan(..)));
                    assert_eq!(
                        *nested,
                        Operation::Project("result".into(), vec![Value::element_access(0, 0), Value::element_access(result_tuple, 0)])
                    );
                }
                other => panic!("expected aggregate nested inside outer scan, got {other:?}"),
            },
            other => panic!("expected outer scan over a, got {other:?}"),
        }
    }
}
