//! Builder Patterns for AST Construction
//!
//! Fluent APIs for constructing AST nodes, mainly useful for tests and the
//! `debug_ram` binary.
//!
//! ## Example
//!
//! ```rust
//! use ramc::ast::builders::{AtomBuilder, RuleBuilder};
//!
//! let atom = AtomBuilder::new("path").var("x").var("y").build();
//!
//! let rule = RuleBuilder::new("path")
//!     .head_vars(["x", "y"])
//!     .body_atom("edge", ["x", "y"])
//!     .build();
//!
//! let recursive = RuleBuilder::new("path")
//!     .head_vars(["x", "z"])
//!     .body_atom("path", ["x", "y"])
//!     .body_atom("edge", ["y", "z"])
//!     .build();
//! ```

use super::{Atom, BodyPredicate, ComparisonOp, Rule, Term};

/// Builder for constructing `Atom` instances.
#[derive(Debug, Clone)]
pub struct AtomBuilder {
    relation: String,
    args: Vec<Term>,
}

impl AtomBuilder {
    pub fn new(relation: impl Into<String>) -> Self {
        AtomBuilder {
            relation: relation.into(),
            args: Vec::new(),
        }
    }

    pub fn var(mut self, name: impl Into<String>) -> Self {
        self.args.push(Term::Variable(name.into()));
        self
    }

    pub fn constant(mut self, value: i64) -> Self {
        self.args.push(Term::Constant(value));
        self
    }

    pub fn placeholder(mut self) -> Self {
        self.args.push(Term::Placeholder);
        self
    }

    pub fn term(mut self, term: Term) -> Self {
        self.args.push(term);
        self
    }

    pub fn build(self) -> Atom {
        Atom::new(self.relation, self.args)
    }
}

/// Builder for constructing `Rule` instances from a head relation name and a
/// sequence of body predicates.
#[derive(Debug, Clone)]
pub struct RuleBuilder {
    head_relation: String,
    head_args: Vec<Term>,
    body: Vec<BodyPredicate>,
}

impl RuleBuilder {
    pub fn new(head_relation: impl Into<String>) -> Self {
        RuleBuilder {
            head_relation: head_relation.into(),
            head_args: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn head_vars<I, S>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.head_args = vars.into_iter().map(|v| Term::Variable(v.into())).collect();
        self
    }

    pub fn head_arg(mut self, term: Term) -> Self {
        self.head_args.push(term);
        self
    }

    pub fn body_atom<I, S>(mut self, relation: impl Into<String>, vars: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args = vars.into_iter().map(|v| Term::Variable(v.into())).collect();
        self.body.push(BodyPredicate::Positive(Atom::new(relation, args)));
        self
    }

    pub fn body_negated<I, S>(mut self, relation: impl Into<String>, vars: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let args = vars.into_iter().map(|v| Term::Variable(v.into())).collect();
        self.body.push(BodyPredicate::Negated(Atom::new(relation, args)));
        self
    }

    pub fn body_comparison(mut self, lhs: Term, op: ComparisonOp, rhs: Term) -> Self {
        self.body.push(BodyPredicate::Comparison(lhs, op, rhs));
        self
    }

    pub fn build(self) -> Rule {
        Rule::new(Atom::new(self.head_relation, self.head_args), self.body)
    }
}
