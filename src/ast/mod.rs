//! # Datalog AST
//!
//! The input side of the middle end: the semantically analyzed program this
//! crate lowers into RAM. Parsing and semantic analysis themselves happen
//! upstream (out of scope here); this module only defines the shapes the
//! translator consumes.
//!
//! For programmatic construction of AST nodes (tests, the `debug_ram`
//! binary), see [`builders`], which provides fluent APIs like `AtomBuilder`
//! and `RuleBuilder`.

use std::collections::HashSet;

pub mod builders;

// ============================================================================
// Core AST Types
// ============================================================================

/// Aggregation function carried by an aggregator term (`count<x>`, `sum<y>`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AggregateFunc {
    Count,
    Sum,
    Min,
    Max,
}

/// Built-in intrinsic operators available inside arithmetic/functor terms.
///
/// Arity and semantics are fixed by the operator itself (the mapping from
/// source operator to intrinsic is resolved explicitly rather than guessed;
/// see `translator::intrinsics`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinFunc {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Neg,
    BAnd,
    BOr,
    BXor,
    LAnd,
    LOr,
    LNot,
    Min,
    Max,
    Cat,
    Substr,
}

impl BuiltinFunc {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "+" => Some(BuiltinFunc::Add),
            "-" => Some(BuiltinFunc::Sub),
            "*" => Some(BuiltinFunc::Mul),
            "/" => Some(BuiltinFunc::Div),
            "%" => Some(BuiltinFunc::Mod),
            "neg" => Some(BuiltinFunc::Neg),
            "band" => Some(BuiltinFunc::BAnd),
            "bor" => Some(BuiltinFunc::BOr),
            "bxor" => Some(BuiltinFunc::BXor),
            "land" => Some(BuiltinFunc::LAnd),
            "lor" => Some(BuiltinFunc::LOr),
            "lnot" => Some(BuiltinFunc::LNot),
            "min" => Some(BuiltinFunc::Min),
            "max" => Some(BuiltinFunc::Max),
            "cat" => Some(BuiltinFunc::Cat),
            "substr" => Some(BuiltinFunc::Substr),
            _ => None,
        }
    }

    /// Fixed arity of the operator (`None` for the n-ary min/max family).
    pub fn arity(&self) -> Option<usize> {
        match self {
            BuiltinFunc::Neg | BuiltinFunc::LNot => Some(1),
            BuiltinFunc::Add
            | BuiltinFunc::Sub
            | BuiltinFunc::Mul
            | BuiltinFunc::Div
            | BuiltinFunc::Mod
            | BuiltinFunc::BAnd
            | BuiltinFunc::BOr
            | BuiltinFunc::BXor
            | BuiltinFunc::LAnd
            | BuiltinFunc::LOr
            | BuiltinFunc::Cat => Some(2),
            BuiltinFunc::Substr => Some(3),
            BuiltinFunc::Min | BuiltinFunc::Max => None,
        }
    }
}

/// A variable, constant, or compound term in a Datalog rule.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Variable(String),
    Constant(i64),
    /// `_`, a don't-care position.
    Placeholder,
    /// Aggregation term: `count<x>`, `sum<y>`, `min<z>`, `max<z>`.
    Aggregate(AggregateFunc, String),
    /// Functor application: `x + 1`, `cat(a, b)`, `band(x, 0xff)`.
    FunctionCall(BuiltinFunc, Vec<Term>),
    /// Record construction: `{x, y, _}` — `None` entries are wildcard fields.
    RecordInit(Vec<Option<Term>>),
    /// Record destructuring binding fields to fresh variables: `U = {id, name}`.
    RecordPattern(Vec<(String, Term)>),
}

impl Term {
    pub fn is_variable(&self) -> bool {
        matches!(self, Term::Variable(_))
    }

    pub fn is_constant(&self) -> bool {
        matches!(self, Term::Constant(_))
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, Term::Aggregate(_, _))
    }

    pub fn is_record_init(&self) -> bool {
        matches!(self, Term::RecordInit(_))
    }

    pub fn as_variable(&self) -> Option<&str> {
        if let Term::Variable(name) = self {
            Some(name)
        } else {
            None
        }
    }

    /// All variables referenced anywhere inside this term.
    pub fn variables(&self) -> HashSet<String> {
        let mut vars = HashSet::new();
        self.collect_variables(&mut vars);
        vars
    }

    fn collect_variables(&self, vars: &mut HashSet<String>) {
        match self {
            Term::Variable(name) => {
                vars.insert(name.clone());
            }
            Term::Constant(_) | Term::Placeholder => {}
            Term::Aggregate(_, var) => {
                vars.insert(var.clone());
            }
            Term::FunctionCall(_, args) => {
                for a in args {
                    a.collect_variables(vars);
                }
            }
            Term::RecordInit(fields) => {
                for f in fields.iter().flatten() {
                    f.collect_variables(vars);
                }
            }
            Term::RecordPattern(fields) => {
                for (_, t) in fields {
                    t.collect_variables(vars);
                }
            }
        }
    }
}

/// An atom such as `edge(x, y)` or `reach(x)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    pub relation: String,
    pub args: Vec<Term>,
}

impl Atom {
    pub fn new(relation: impl Into<String>, args: Vec<Term>) -> Self {
        Atom {
            relation: relation.into(),
            args,
        }
    }

    pub fn variables(&self) -> HashSet<String> {
        let mut vars = HashSet::new();
        for term in &self.args {
            vars.extend(term.variables());
        }
        vars
    }

    pub fn arity(&self) -> usize {
        self.args.len()
    }

    pub fn has_aggregates(&self) -> bool {
        self.args.iter().any(Term::is_aggregate)
    }

    pub fn aggregates(&self) -> Vec<(&AggregateFunc, &str)> {
        self.args
            .iter()
            .filter_map(|t| {
                if let Term::Aggregate(f, v) = t {
                    Some((f, v.as_str()))
                } else {
                    None
                }
            })
            .collect()
    }
}

/// Comparison operators usable in a `Comparison` body predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Equal,
    NotEqual,
    LessThan,
    LessOrEqual,
    GreaterThan,
    GreaterOrEqual,
}

/// A single literal in a rule body.
#[derive(Debug, Clone, PartialEq)]
pub enum BodyPredicate {
    Positive(Atom),
    Negated(Atom),
    Comparison(Term, ComparisonOp, Term),
}

impl BodyPredicate {
    pub fn atom(&self) -> Option<&Atom> {
        match self {
            BodyPredicate::Positive(atom) | BodyPredicate::Negated(atom) => Some(atom),
            BodyPredicate::Comparison(..) => None,
        }
    }

    pub fn is_positive(&self) -> bool {
        matches!(self, BodyPredicate::Positive(_))
    }

    pub fn is_negated(&self) -> bool {
        matches!(self, BodyPredicate::Negated(_))
    }

    pub fn variables(&self) -> HashSet<String> {
        match self {
            BodyPredicate::Positive(atom) | BodyPredicate::Negated(atom) => atom.variables(),
            BodyPredicate::Comparison(left, _, right) => {
                let mut vars = HashSet::new();
                vars.extend(left.variables());
                vars.extend(right.variables());
                vars
            }
        }
    }
}

/// A single Datalog rule: `head :- body1, body2, ...`.
///
/// Body literals are stored in the order the upstream planner has already
/// chosen for evaluation — the translator lowers them in that order without
/// re-planning.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub head: Atom,
    pub body: Vec<BodyPredicate>,
}

impl Rule {
    pub fn new(head: Atom, body: Vec<BodyPredicate>) -> Self {
        Rule { head, body }
    }

    pub fn new_simple(head: Atom, body: Vec<Atom>) -> Self {
        Rule {
            head,
            body: body.into_iter().map(BodyPredicate::Positive).collect(),
        }
    }

    pub fn variables(&self) -> HashSet<String> {
        let mut vars = self.head.variables();
        for pred in &self.body {
            vars.extend(pred.variables());
        }
        vars
    }

    pub fn positive_body_atoms(&self) -> Vec<&Atom> {
        self.body
            .iter()
            .filter_map(|pred| match pred {
                BodyPredicate::Positive(atom) => Some(atom),
                _ => None,
            })
            .collect()
    }

    pub fn negated_body_atoms(&self) -> Vec<&Atom> {
        self.body
            .iter()
            .filter_map(|pred| match pred {
                BodyPredicate::Negated(atom) => Some(atom),
                _ => None,
            })
            .collect()
    }

    /// A clause is a fact if it has no body literals at all.
    pub fn is_fact(&self) -> bool {
        self.body.is_empty()
    }

    /// Whether any body atom targets the head's own relation.
    pub fn head_recurses(&self) -> bool {
        self.body
            .iter()
            .any(|p| p.atom().map(|a| a.relation == self.head.relation).unwrap_or(false))
    }
}

/// How a relation is reached from outside this translation unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RelationIo {
    /// Loaded from `fact-dir` before the owning stratum's body runs.
    pub input: bool,
    /// Stored to `output-dir` after the owning stratum's body runs.
    pub output: bool,
    /// Emit a `PrintSize` statement for this relation.
    pub printsize: bool,
}

/// Static declaration of a relation: name, arity, and I/O role.
///
/// Produced by the upstream type environment; the translator only reads it.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationDecl {
    pub name: String,
    pub arity: usize,
    pub io: RelationIo,
}

impl RelationDecl {
    pub fn new(name: impl Into<String>, arity: usize) -> Self {
        RelationDecl {
            name: name.into(),
            arity,
            io: RelationIo::default(),
        }
    }

    pub fn input(mut self) -> Self {
        self.io.input = true;
        self
    }

    pub fn output(mut self) -> Self {
        self.io.output = true;
        self
    }

    pub fn printsize(mut self) -> Self {
        self.io.printsize = true;
        self
    }
}

/// A complete semantically analyzed Datalog program: relation declarations
/// plus rules, in the shape the translator expects as input.
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub relations: Vec<RelationDecl>,
    pub rules: Vec<Rule>,
}

impl Program {
    pub fn new() -> Self {
        Program::default()
    }

    pub fn add_relation(&mut self, decl: RelationDecl) {
        self.relations.push(decl);
    }

    pub fn add_rule(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    pub fn relation(&self, name: &str) -> Option<&RelationDecl> {
        self.relations.iter().find(|r| r.name == name)
    }

    pub fn rules_for(&self, relation: &str) -> Vec<&Rule> {
        self.rules.iter().filter(|r| r.head.relation == relation).collect()
    }

    /// Relations that appear as the head of some rule (IDBs), sorted for
    /// determinism.
    pub fn idbs(&self) -> Vec<String> {
        let mut idbs: Vec<String> = self
            .rules
            .iter()
            .map(|rule| rule.head.relation.clone())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        idbs.sort();
        idbs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atom_creation_and_arity() {
        let atom = Atom::new("edge", vec![Term::Variable("x".into()), Term::Variable("y".into())]);
        assert_eq!(atom.relation, "edge");
        assert_eq!(atom.arity(), 2);
    }

    #[test]
    fn term_variables_through_aggregate() {
        let term = Term::Aggregate(AggregateFunc::Count, "y".to_string());
        let vars = term.variables();
        assert!(vars.contains("y"));
    }

    #[test]
    fn term_variables_through_function_call() {
        let term = Term::FunctionCall(
            BuiltinFunc::Add,
            vec![Term::Variable("d".into()), Term::Constant(1)],
        );
        let vars = term.variables();
        assert_eq!(vars.len(), 1);
        assert!(vars.contains("d"));
    }

    #[test]
    fn rule_head_recurses() {
        let head = Atom::new("reach", vec![Term::Variable("y".into())]);
        let body = vec![
            BodyPredicate::Positive(Atom::new("reach", vec![Term::Variable("x".into())])),
            BodyPredicate::Positive(Atom::new(
                "edge",
                vec![Term::Variable("x".into()), Term::Variable("y".into())],
            )),
        ];
        let rule = Rule::new(head, body);
        assert!(rule.head_recurses());
    }

    #[test]
    fn program_idbs() {
        let mut program = Program::new();
        program.add_rule(Rule::new_simple(
            Atom::new("reach", vec![Term::Variable("x".into())]),
            vec![Atom::new("source", vec![Term::Variable("x".into())])],
        ));
        program.add_rule(Rule::new_simple(
            Atom::new("reach", vec![Term::Variable("y".into())]),
            vec![
                Atom::new("reach", vec![Term::Variable("x".into())]),
                Atom::new(
                    "edge",
                    vec![Term::Variable("x".into()), Term::Variable("y".into())],
                ),
            ],
        ));
        assert_eq!(program.idbs(), vec!["reach"]);
    }

    #[test]
    fn builtin_func_arity() {
        assert_eq!(BuiltinFunc::Add.arity(), Some(2));
        assert_eq!(BuiltinFunc::Neg.arity(), Some(1));
        assert_eq!(BuiltinFunc::Substr.arity(), Some(3));
        assert_eq!(BuiltinFunc::Min.arity(), None);
    }

    #[test]
    fn atom_has_aggregates() {
        let atom = Atom::new(
            "result",
            vec![
                Term::Variable("x".into()),
                Term::Aggregate(AggregateFunc::Sum, "y".into()),
            ],
        );
        assert!(atom.has_aggregates());
        assert_eq!(atom.aggregates().len(), 1);
    }
}
