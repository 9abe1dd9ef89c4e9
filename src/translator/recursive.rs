//! Semi-naive evaluation of a recursive SCC (§4.3.4).
//!
//! Shape: lower every non-recursive clause of every member twice — once
//! into the relation itself, once mirrored into its delta — as the base
//! case; then loop, each iteration lowering every recursive clause once per
//! in-SCC body-atom *occurrence* it contains, with that single occurrence
//! substituted for its delta (every other atom in the clause — including
//! other occurrences of the very same in-SCC relation, and anything outside
//! the SCC — reads the accumulated base relation unchanged), filtered
//! against the base relation to keep only genuinely new derivations, and
//! written to that relation's `new` scratch. The iteration ends (`Exit`)
//! once every `new` scratch comes back empty; otherwise delta and new swap,
//! new merges into the base relation, and new is cleared for the next pass.
//!
//! Per-occurrence (not per-relation-name) variant selection matters for a
//! non-linear clause like `path(x,z) :- path(x,y), path(y,z).`: two variants
//! are emitted, one with the first `path` atom on Δ and the second on the
//! base relation, one the other way around, computing (Δ⋈R)∪(R⋈Δ) rather
//! than collapsing to a single Δ⋈Δ variant that would under-derive.

use super::clause::{lower_clause, ClauseCtx};
use super::{delta_name, new_name};
use crate::ast::Rule;
use crate::error::ErrorReport;
use crate::ram::{Condition, Operation, Pattern, Statement};
use crate::upstream::UpstreamAnalyses;
use std::cell::Cell;
use std::collections::{HashMap, HashSet};

fn identity(rel: &str) -> String {
    rel.to_string()
}

pub fn translate_recursive_body(
    upstream: &UpstreamAnalyses,
    members: &[String],
    clauses_by_relation: &HashMap<String, Vec<(usize, &Rule)>>,
    errors: &mut ErrorReport,
) -> Vec<Statement> {
    let member_set: HashSet<String> = members.iter().cloned().collect();
    let mut stmts = Vec::new();

    for relation in members {
        let Some(clauses) = clauses_by_relation.get(relation) else { continue };
        for (clause_index, rule) in clauses {
            if upstream.recursive.is_recursive(relation, *clause_index) {
                continue;
            }
            let ctx = ClauseCtx {
                types: &upstream.types,
                relation: relation.as_str(),
                clause_index: *clause_index,
            };
            let base_target = relation.clone();
            if let Some(op) = lower_clause(rule, &ctx, &identity, &[], move |values, _vi| Operation::Project(base_target, values), errors) {
                stmts.push(Statement::Query(op));
            }
            let delta_target = delta_name(relation);
            if let Some(op) = lower_clause(rule, &ctx, &identity, &[], move |values, _vi| Operation::Project(delta_target, values), errors) {
                stmts.push(Statement::Query(op));
            }
        }
    }

    let mut variant_queries: Vec<Statement> = Vec::new();
    for relation in members {
        let Some(clauses) = clauses_by_relation.get(relation) else { continue };
        for (clause_index, rule) in clauses {
            if !upstream.recursive.is_recursive(relation, *clause_index) {
                continue;
            }
            let occurrence_count = in_scc_atom_occurrence_count(rule, &member_set);
            for occurrence_index in 0..occurrence_count {
                let seen = Cell::new(0usize);
                let member_set = &member_set;
                let atom_relation = move |name: &str| -> String {
                    if member_set.contains(name) {
                        let this_occurrence = seen.get();
                        seen.set(this_occurrence + 1);
                        if this_occurrence == occurrence_index {
                            return delta_name(name);
                        }
                    }
                    name.to_string()
                };
                let ctx = ClauseCtx {
                    types: &upstream.types,
                    relation: relation.as_str(),
                    clause_index: *clause_index,
                };
                let dedupe_against = relation.clone();
                let write_into = new_name(relation);
                let finish = move |values: Vec<crate::ram::Value>, _vi: &_| {
                    let pattern: Pattern = values.iter().cloned().map(Some).collect();
                    Operation::Filter(
                        Condition::NotExistenceCheck(dedupe_against, pattern),
                        Box::new(Operation::Project(write_into, values)),
                    )
                };
                if let Some(op) = lower_clause(rule, &ctx, &atom_relation, &[], finish, errors) {
                    variant_queries.push(Statement::Query(op));
                }
            }
        }
    }

    let mut loop_body = vec![Statement::Parallel(variant_queries)];

    let exit_conds: Vec<Condition> = members.iter().map(|r| Condition::Empty(new_name(r))).collect();
    if let Some(cond) = Condition::conjoin(exit_conds) {
        loop_body.push(Statement::Exit(cond));
    }

    for relation in members {
        let arity = upstream.types.arity(relation).unwrap_or(0);
        loop_body.push(Statement::Swap(delta_name(relation), new_name(relation)));
        loop_body.push(Statement::Merge(relation.clone(), delta_name(relation)));
        loop_body.push(Statement::Drop(new_name(relation)));
        loop_body.push(Statement::Create(new_name(relation), arity));
    }

    stmts.push(Statement::Loop(Box::new(Statement::Sequence(loop_body))));
    stmts
}

/// Counts how many positive body atoms reference an in-SCC relation —
/// repeated occurrences of the same relation name each count separately,
/// since each gets its own delta-substituted variant.
fn in_scc_atom_occurrence_count(rule: &Rule, members: &HashSet<String>) -> usize {
    rule.positive_body_atoms().iter().filter(|atom| members.contains(&atom.relation)).count()
}
