//! Developer tool: builds a small in-memory AST translation unit, runs the
//! translator and transformer pipeline with tracing enabled, and prints the
//! before/after textual RAM dump (§6) to stdout. Not a product surface.

use ramc::ast::builders::RuleBuilder;
use ramc::ast::{Program, RelationDecl};
use ramc::config::Config;
use ramc::transform::Pipeline;
use ramc::translator;
use ramc::upstream::UpstreamAnalyses;
use tracing_subscriber::EnvFilter;

fn sample_program() -> Program {
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

fn main() {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let program = sample_program();
    let config = Config::default();
    let upstream = UpstreamAnalyses::compute(&program);

    let mut unit = translator::translate_unit(&program, &upstream, &config);
    println!("=== before optimization ===");
    println!("{}", unit.program.pretty());

    if !unit.errors.is_empty() {
        for error in unit.errors.iter() {
            eprintln!("translation error: {error}");
        }
    }

    Pipeline::new(&config).run(&mut unit.program);
    println!("\n=== after optimization ===");
    println!("{}", unit.program.pretty());
}
