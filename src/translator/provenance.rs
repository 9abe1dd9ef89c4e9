//! Provenance subproof subroutines (§4.3.5).
//!
//! One subroutine per non-fact clause, named `<relation>_<clauseIndex>_subproof`.
//! It takes one `Argument` per head column — the explainer hands it a tuple
//! it already believes is in the relation and asks "how" — pre-binds those
//! columns' variables via `lower_clause`'s `argument_bindings` instead of
//! letting the body define fresh locations for them, and re-derives the
//! body. It returns a witness tuple: every distinct body-bound variable, in
//! sorted order, so the explainer can recurse into whichever premise(s)
//! produced the derivation. Facts have no body to re-derive and are skipped.

use super::clause::{lower_clause, ClauseCtx};
use crate::ast::Rule;
use crate::error::ErrorReport;
use crate::ram::{Operation, Subroutine, Value};
use crate::upstream::UpstreamAnalyses;
use itertools::Itertools;
use std::collections::HashMap;

fn identity(rel: &str) -> String {
    rel.to_string()
}

pub fn build_subproofs(upstream: &UpstreamAnalyses, clauses_by_relation: &HashMap<String, Vec<(usize, &Rule)>>, errors: &mut ErrorReport) -> Vec<Subroutine> {
    let mut subroutines = Vec::new();

    for (relation, clauses) in clauses_by_relation {
        for (clause_index, rule) in clauses {
            if rule.is_fact() {
                continue;
            }
            let ctx = ClauseCtx {
                types: &upstream.types,
                relation: relation.as_str(),
                clause_index: *clause_index,
            };
            let arity = rule.head.args.len();
            let argument_bindings: Vec<(String, usize)> = rule
                .head
                .args
                .iter()
                .enumerate()
                .filter_map(|(i, term)| term.as_variable().map(|name| (name.to_string(), i)))
                .collect();

            let finish = |_head_values: Vec<Value>, vi: &_| build_witness(rule, vi);

            if let Some(op) = lower_clause(rule, &ctx, &identity, &argument_bindings, finish, errors) {
                subroutines.push(Subroutine {
                    name: format!("{relation}_{clause_index}_subproof"),
                    arity,
                    body: op,
                });
            }
        }
    }

    subroutines.sort_by(|a, b| a.name.cmp(&b.name));
    subroutines
}

fn build_witness(rule: &Rule, value_index: &super::value_index::ValueIndex) -> Operation {
    let names: Vec<String> = rule.body.iter().flat_map(|p| p.variables()).sorted().dedup().collect();
    let witness: Vec<Value> = names
        .iter()
        .filter_map(|name| value_index.variable_location(name))
        .map(|loc| Value::element_access(loc.level, loc.column))
        .collect();
    Operation::Return(witness)
}
