//! Per-stratum translation plan (§4.3.1): for each SCC, in topological
//! order, `Create` its relations (plus delta/new scratch for a recursive
//! SCC), `Load` whatever the stratum needs, translate the body (plain
//! clause-by-clause for a non-recursive singleton, semi-naive otherwise),
//! `PrintSize`/`Store` the outputs, and `Drop` whatever the rest of the
//! program no longer reads.

use super::clause::{lower_clause, ClauseCtx};
use super::recursive;
use super::{delta_name, new_name};
use crate::ast::{Program, Rule};
use crate::config::Config;
use crate::error::ErrorReport;
use crate::ram::{FileFormat, Operation, Statement};
use crate::upstream::UpstreamAnalyses;
use std::collections::{HashMap, HashSet};

fn identity(rel: &str) -> String {
    rel.to_string()
}

/// Translates one SCC's stratum into a `Statement::Stratum(topo_position, ...)`.
pub fn translate_stratum(
    program: &Program,
    upstream: &UpstreamAnalyses,
    config: &Config,
    scc_index: usize,
    topo_position: usize,
    clauses_by_relation: &HashMap<String, Vec<(usize, &Rule)>>,
    errors: &mut ErrorReport,
) -> Statement {
    let scc = upstream.sccs.scc(scc_index);
    let members = scc.members.clone();
    let recursive_scc = scc.is_recursive();
    let mut stmts: Vec<Statement> = Vec::new();

    // 1. Create.
    for rel in &members {
        let arity = upstream.types.arity(rel).unwrap_or(0);
        stmts.push(Statement::Create(rel.clone(), arity));
        if recursive_scc {
            stmts.push(Statement::Create(delta_name(rel), arity));
            stmts.push(Statement::Create(new_name(rel), arity));
        }
    }

    // 2. Load declared inputs.
    for rel in &members {
        if upstream.types.is_input(rel) {
            stmts.push(Statement::Load(rel.clone(), FileFormat::Facts));
        }
    }

    // 3. Engine mode stages in whatever an earlier stratum already stored.
    let external_preds = upstream.sccs.external_predecessors(program, scc_index);
    if config.engine {
        for rel in &external_preds {
            let format = if upstream.types.is_output(rel) { FileFormat::Csv } else { FileFormat::Facts };
            stmts.push(Statement::Load(rel.clone(), format));
        }
    }

    // 4. Body.
    if recursive_scc {
        stmts.extend(recursive::translate_recursive_body(upstream, &members, clauses_by_relation, errors));
    } else {
        stmts.extend(translate_non_recursive_body(upstream, &members, clauses_by_relation, errors));
    }

    // 5. PrintSize.
    for rel in &members {
        if upstream.types.is_printsize(rel) {
            stmts.push(Statement::PrintSize(rel.clone()));
        }
    }

    // 6. Engine mode stores whatever a later stratum will still need.
    if config.engine {
        let external_succ: HashSet<String> = upstream.sccs.external_successors(program, scc_index).into_iter().collect();
        for rel in &members {
            if external_succ.contains(rel) && !upstream.types.is_output(rel) {
                stmts.push(Statement::Store(rel.clone(), FileFormat::Facts));
            }
        }
    }

    // 7. Store declared outputs.
    for rel in &members {
        if upstream.types.is_output(rel) {
            stmts.push(Statement::Store(rel.clone(), FileFormat::Csv));
        }
    }

    // 8. Drop. Provenance mode keeps every intermediate around for subproof
    // subroutines to re-scan later; otherwise engine mode drops everything
    // this process touched (it has been staged to disk), and standalone mode
    // drops only what the relation-expiry schedule says is no longer read.
    if !config.provenance {
        if config.engine {
            for rel in members.iter().chain(external_preds.iter()) {
                stmts.push(Statement::Drop(rel.clone()));
            }
        } else {
            for rel in &members {
                if upstream.schedule.expired_by(rel, topo_position) {
                    stmts.push(Statement::Drop(rel.clone()));
                }
            }
        }
        if recursive_scc {
            for rel in &members {
                stmts.push(Statement::Drop(delta_name(rel)));
                stmts.push(Statement::Drop(new_name(rel)));
            }
        }
    }

    Statement::Stratum(topo_position, Box::new(Statement::Sequence(stmts)))
}

/// A non-recursive SCC is always a single relation (Tarjan never merges two
/// relations that aren't mutually reachable) — one `Query` per clause, in
/// declaration order.
fn translate_non_recursive_body(
    upstream: &UpstreamAnalyses,
    members: &[String],
    clauses_by_relation: &HashMap<String, Vec<(usize, &Rule)>>,
    errors: &mut ErrorReport,
) -> Vec<Statement> {
    let mut stmts = Vec::new();
    let Some(relation) = members.first() else { return stmts };
    let Some(clauses) = clauses_by_relation.get(relation) else { return stmts };
    for (clause_index, rule) in clauses {
        let ctx = ClauseCtx {
            types: &upstream.types,
            relation: relation.as_str(),
            clause_index: *clause_index,
        };
        let target = relation.clone();
        if let Some(op) = lower_clause(rule, &ctx, &identity, &[], move |values, _vi| Operation::Project(target, values), errors) {
            stmts.push(Statement::Query(op));
        }
    }
    stmts
}
