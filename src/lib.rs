//! # ramc — Datalog middle end
//!
//! The middle end of a Datalog compiler: lowers a semantically analyzed
//! Datalog program (the [`ast`]) into a relational algebra machine program
//! (the [`ram`] tree), then runs a fixpoint pipeline of analysis-driven
//! rewrites ([`transform`]) that turn the naive loop nest the translator
//! emits into an indexable, filtered, short-circuited one.
//!
//! ## Pipeline
//!
//! ```text
//! ast::Program ── translator::translate_unit ──► ram::RamProgram
//!                  (consumes upstream::UpstreamAnalyses)
//!                                  │
//!                                  ▼
//!                     transform::Pipeline::run
//!                     (fixpoint: level_conditions → create_indices →
//!                      convert_existence_checks → searches_to_choices)
//!                                  │
//!                                  ▼
//!                         optimized ram::RamProgram
//! ```
//!
//! Everything upstream of the AST (parsing, semantic analysis) and
//! downstream of the optimized RAM tree (interpretation/codegen) is out of
//! scope — this crate's job starts at an already-typed [`ast::Program`] and
//! ends at an optimized [`ram::RamProgram`].
//!
//! ## Example
//!
//! ```
//! use ramc::ast::builders::RuleBuilder;
//! use ramc::ast::{Program, RelationDecl};
//! use ramc::config::Config;
//! use ramc::upstream::UpstreamAnalyses;
//!
//! let mut program = Program::new();
//! program.add_relation(RelationDecl::new("edge", 2).input());
//! program.add_relation(RelationDecl::new("path", 2).output());
//! program.add_rule(RuleBuilder::new("path").head_vars(["x", "y"]).body_atom("edge", ["x", "y"]).build());
//! program.add_rule(
//!     RuleBuilder::new("path")
//!         .head_vars(["x", "z"])
//!         .body_atom("path", ["x", "y"])
//!         .body_atom("edge", ["y", "z"])
//!         .build(),
//! );
//!
//! let unit = ramc::compile(&program, &Config::default());
//! assert!(unit.errors.is_empty());
//! println!("{}", unit.program.pretty());
//! ```

pub mod analysis;
pub mod ast;
pub mod config;
pub mod error;
pub mod ram;
pub mod report;
pub mod transform;
pub mod translator;
pub mod upstream;

use ast::Program;
use config::Config;
use report::DebugReport;
use translator::RamTranslationUnit;
use upstream::UpstreamAnalyses;

/// Runs the whole middle end over `program`: computes the upstream
/// analyses (§6), translates to RAM (§4.3), and optimizes to fixpoint
/// (§4.4). This is the facade most callers want; [`translator::translate_unit`]
/// and [`transform::Pipeline`] are exposed separately for callers that
/// already have their own [`UpstreamAnalyses`] or want to observe the
/// pre-optimization tree.
pub fn compile(program: &Program, config: &Config) -> RamTranslationUnit {
    let mut report = DebugReport::new();
    let unit = compile_with_report(program, config, &mut report);
    if let Some(path) = &config.debug_report {
        if let Err(err) = std::fs::write(path, report.format_report()) {
            tracing::warn!(path = %path.display(), error = %err, "failed to write debug report");
        }
    }
    unit
}

/// As [`compile`], but lets the caller supply (and keep) the [`DebugReport`]
/// instead of having one created and discarded internally.
pub fn compile_with_report(program: &Program, config: &Config, report: &mut DebugReport) -> RamTranslationUnit {
    let upstream = UpstreamAnalyses::compute(program);
    let mut unit = translator::translate_unit_with_report(program, &upstream, config, report);
    let pipeline = transform::Pipeline::new(config);
    pipeline.run(&mut unit.program);
    unit
}
