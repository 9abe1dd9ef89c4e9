//! # AST → RAM translation (§4)
//!
//! [`translate_unit`] is the middle end's single entry point: given a parsed
//! [`ast::Program`](crate::ast::Program), the upstream analyses the rest of
//! a full compiler would hand it ([`UpstreamAnalyses`]), and a
//! [`Config`](crate::config::Config), it produces a [`RamProgram`] plus an
//! [`ErrorReport`] of anything that went wrong along the way — translation
//! never panics on a malformed clause, it skips that clause and keeps going
//! (§5).
//!
//! Internally this module is layered bottom-up:
//! - [`value_index`] — the per-clause variable/aggregate binding table.
//! - [`intrinsics`] — AST operator → RAM operator mapping.
//! - [`clause`] — lowers one rule body into a loop nest (§4.3.2, §4.3.3).
//! - [`stratum`] — the per-SCC `Create`/`Load`/body/`Store`/`Drop` plan (§4.3.1).
//! - [`recursive`] — semi-naive evaluation of a recursive SCC (§4.3.4).
//! - [`provenance`] — subproof subroutine generation (§4.3.5).

pub mod clause;
pub mod intrinsics;
pub mod provenance;
pub mod recursive;
pub mod stratum;
pub mod value_index;

use crate::ast::{Program, Rule};
use crate::config::Config;
use crate::error::ErrorReport;
use crate::ram::{RamProgram, Relation, Statement};
use crate::report::DebugReport;
use crate::upstream::UpstreamAnalyses;
use std::collections::HashMap;
use std::time::Instant;

fn delta_name(relation: &str) -> String {
    format!("delta_{relation}")
}

fn new_name(relation: &str) -> String {
    format!("new_{relation}")
}

/// Numbers each relation's clauses sequentially in `program.rules` order —
/// the same convention `RecursiveClauses` uses internally, so the two stay
/// in agreement without either needing to know about the other's counter.
fn index_clauses(program: &Program) -> HashMap<String, Vec<(usize, &Rule)>> {
    let mut counters: HashMap<String, usize> = HashMap::new();
    let mut by_relation: HashMap<String, Vec<(usize, &Rule)>> = HashMap::new();
    for rule in &program.rules {
        let counter = counters.entry(rule.head.relation.clone()).or_insert(0);
        let this_index = *counter;
        *counter += 1;
        by_relation.entry(rule.head.relation.clone()).or_default().push((this_index, rule));
    }
    by_relation
}

/// The translator's output: the RAM program plus whatever diagnostics were
/// raised while building it. A non-empty `errors` does not necessarily mean
/// `program` is useless — clauses with no error translated fine and are
/// present; only the relations named by an error may be incomplete.
#[derive(Debug, Clone)]
pub struct RamTranslationUnit {
    pub program: RamProgram,
    pub errors: ErrorReport,
}

/// Lowers `program` to RAM. `upstream` is consumed verbatim — this function
/// does no stratification or type-checking of its own, it only walks the
/// already-computed SCC topological order and per-clause recursion flags.
pub fn translate_unit(program: &Program, upstream: &UpstreamAnalyses, config: &Config) -> RamTranslationUnit {
    translate_unit_with_report(program, upstream, config, &mut DebugReport::new())
}

/// As [`translate_unit`], but also appends the rendered RAM program and
/// translation wall-clock to `report` (§6) — split out so a caller that
/// doesn't want a debug report (e.g. a library consumer translating many
/// small programs in a loop) doesn't pay for timing instrumentation it
/// throws away.
pub fn translate_unit_with_report(program: &Program, upstream: &UpstreamAnalyses, config: &Config, report: &mut DebugReport) -> RamTranslationUnit {
    let started = Instant::now();
    let mut errors = ErrorReport::new();
    let clauses_by_relation = index_clauses(program);

    let mut strata = Vec::new();
    for (topo_position, &scc_index) in upstream.sccs.topological_order().iter().enumerate() {
        strata.push(stratum::translate_stratum(
            program,
            upstream,
            config,
            scc_index,
            topo_position,
            &clauses_by_relation,
            &mut errors,
        ));
    }

    let main = if config.profile {
        Statement::LogTimer("runtime".to_string(), Box::new(Statement::Sequence(strata)))
    } else {
        Statement::Sequence(strata)
    };

    let subroutines = if config.provenance {
        provenance::build_subproofs(upstream, &clauses_by_relation, &mut errors)
    } else {
        Vec::new()
    };

    let relations: Vec<Relation> = upstream
        .types
        .names()
        .map(|name| Relation {
            name: name.clone(),
            arity: upstream.types.arity(name).unwrap_or(0),
        })
        .collect();

    let ram_program = RamProgram {
        main,
        relations,
        subroutines,
    };

    report.add_ram_program(&ram_program, started.elapsed());

    RamTranslationUnit {
        program: ram_program,
        errors,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builders::RuleBuilder;
    use crate::ast::{Program, RelationDecl};

    fn reach_program() -> Program {
        let mut program = Program::new();
        program.add_relation(RelationDecl::new("edge", 2).input());
        program.add_relation(RelationDecl::new("reach", 2).output());
        program.add_rule(RuleBuilder::new("reach").head_vars(["x", "y"]).body_atom("edge", ["x", "y"]).build());
        program.add_rule(
            RuleBuilder::new("reach")
                .head_vars(["x", "z"])
                .body_atom("reach", ["x", "y"])
                .body_atom("edge", ["y", "z"])
                .build(),
        );
        program
    }

    #[test]
    fn reach_translates_without_errors() {
        let program = reach_program();
        let upstream = UpstreamAnalyses::compute(&program);
        let config = Config::default();
        let unit = translate_unit(&program, &upstream, &config);
        assert!(unit.errors.is_empty(), "unexpected errors: {:?}", unit.errors.iter().collect::<Vec<_>>());
    }

    #[test]
    fn reach_stratum_contains_a_loop_for_the_recursive_scc() {
        let program = reach_program();
        let upstream = UpstreamAnalyses::compute(&program);
        let config = Config::default();
        let unit = translate_unit(&program, &upstream, &config);
        let rendered = unit.program.pretty();
        assert!(rendered.contains("Loop {"));
        assert!(rendered.contains("delta_reach"));
        assert!(rendered.contains("new_reach"));
    }

    #[test]
    fn non_recursive_edge_stratum_has_no_loop_of_its_own() {
        let mut program = Program::new();
        program.add_relation(RelationDecl::new("a", 1).input());
        program.add_relation(RelationDecl::new("b", 1).output());
        program.add_rule(RuleBuilder::new("b").head_vars(["x"]).body_atom("a", ["x"]).build());
        let upstream = UpstreamAnalyses::compute(&program);
        let config = Config::default();
        let unit = translate_unit(&program, &upstream, &config);
        assert!(unit.errors.is_empty());
        assert!(!unit.program.pretty().contains("Loop {"));
    }

    #[test]
    fn provenance_mode_emits_one_subproof_per_non_fact_clause() {
        let program = reach_program();
        let upstream = UpstreamAnalyses::compute(&program);
        let mut config = Config::default();
        config.provenance = true;
        let unit = translate_unit(&program, &upstream, &config);
        assert_eq!(unit.program.subroutines.len(), 2);
        assert!(unit.program.subroutines.iter().any(|s| s.name == "reach_0_subproof"));
        assert!(unit.program.subroutines.iter().any(|s| s.name == "reach_1_subproof"));
    }

    #[test]
    fn provenance_mode_suppresses_intermediate_drops() {
        let program = reach_program();
        let upstream = UpstreamAnalyses::compute(&program);
        let mut config = Config::default();
        config.provenance = true;
        let unit = translate_unit(&program, &upstream, &config);
        assert!(!unit.program.pretty().contains("Drop(edge)"));
    }

    #[test]
    fn engine_mode_loads_and_stores_across_stratum_boundaries() {
        let mut program = Program::new();
        program.add_relation(RelationDecl::new("a", 1).input());
        program.add_relation(RelationDecl::new("mid", 1));
        program.add_relation(RelationDecl::new("b", 1).output());
        program.add_rule(RuleBuilder::new("mid").head_vars(["x"]).body_atom("a", ["x"]).build());
        program.add_rule(RuleBuilder::new("b").head_vars(["x"]).body_atom("mid", ["x"]).build());
        let upstream = UpstreamAnalyses::compute(&program);
        let mut config = Config::default();
        config.engine = true;
        let unit = translate_unit(&program, &upstream, &config);
        assert!(unit.errors.is_empty());
        let rendered = unit.program.pretty();
        assert!(rendered.contains("Store(mid.facts)"));
        assert!(rendered.contains("Load(mid.facts)"));
    }
}
