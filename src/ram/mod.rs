//! # RAM — Relational Algebra Machine IR
//!
//! The tree IR produced by [`crate::translator`] and rewritten by
//! [`crate::transform`]. Every node category (`Value`, `Condition`,
//! `Operation`, `Statement`) is a closed sum type rather than a class
//! hierarchy: clone, structural equality, child enumeration, and mapping are
//! free functions/derives dispatching on the variant instead of virtual
//! calls. Tuple ids are concrete integers; there is no alpha-renaming.
//!
//! Trees are strictly owned: every variant holds its children behind a `Box`
//! or a `Vec`, never shared. Reuse requires `.clone()`.

pub mod visit;

use std::fmt;

/// Names the loop (Scan/IndexScan/Choice/IndexChoice/Lookup/Aggregate) that
/// bound the tuple an `ElementAccess` refers to. Assigned sequentially by
/// the translator within one `Query`.
pub type TupleId = u32;

/// Built-in operator selecting arity and semantics for `Value::Intrinsic`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intrinsic {
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

impl Intrinsic {
    pub fn symbol(self) -> &'static str {
        match self {
            Intrinsic::Add => "add",
            Intrinsic::Sub => "sub",
            Intrinsic::Mul => "mul",
            Intrinsic::Div => "div",
            Intrinsic::Mod => "mod",
            Intrinsic::Neg => "neg",
            Intrinsic::BAnd => "band",
            Intrinsic::BOr => "bor",
            Intrinsic::BXor => "bxor",
            Intrinsic::LAnd => "land",
            Intrinsic::LOr => "lor",
            Intrinsic::LNot => "lnot",
            Intrinsic::Min => "min",
            Intrinsic::Max => "max",
            Intrinsic::Cat => "cat",
            Intrinsic::Substr => "substr",
        }
    }
}

/// A pure expression evaluated inside a loop nest.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(i64),
    /// `tuple_id`, `column_index`, optional human-readable label (debug only,
    /// not compared structurally beyond presence — see `PartialEq` below).
    ElementAccess(TupleId, usize, Option<String>),
    Intrinsic(Intrinsic, Vec<Value>),
    /// `None` entries are unnamed/wildcard fields.
    Pack(Vec<Option<Value>>),
    Argument(usize),
    AutoIncrement,
}

impl Value {
    pub fn element_access(tuple: TupleId, column: usize) -> Value {
        Value::ElementAccess(tuple, column, None)
    }

    pub fn is_constant(&self) -> bool {
        crate::analysis::const_value(self)
    }

    pub fn pretty(&self) -> String {
        match self {
            Value::Number(n) => format!("number({n})"),
            Value::ElementAccess(t, c, _) => format!("env(t{t}, i{c})"),
            Value::Intrinsic(op, args) => {
                let inner: Vec<String> = args.iter().map(Value::pretty).collect();
                format!("{}({})", op.symbol(), inner.join(","))
            }
            Value::Pack(args) => {
                let inner: Vec<String> = args
                    .iter()
                    .map(|a| a.as_ref().map(Value::pretty).unwrap_or_else(|| "_".to_string()))
                    .collect();
                format!("[{}]", inner.join(","))
            }
            Value::Argument(i) => format!("arg({i})"),
            Value::AutoIncrement => "autoinc()".to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.pretty())
    }
}

/// Comparison operator over domain ints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

/// A column pattern for `IndexScan`/`ExistenceCheck`: `None` is a wildcard
/// slot, `Some(v)` a concrete value the column must equal.
pub type Pattern = Vec<Option<Value>>;

/// A boolean expression over `Value`s.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Conjunction(Box<Condition>, Box<Condition>),
    Comparison(CompareOp, Value, Value),
    ExistenceCheck(String, Pattern),
    NotExistenceCheck(String, Pattern),
    Empty(String),
}

impl Condition {
    pub fn and(self, other: Condition) -> Condition {
        Condition::Conjunction(Box::new(self), Box::new(other))
    }

    /// Flattens a right- or left-leaning conjunction tree into its conjuncts
    /// in left-to-right order.
    pub fn conjuncts(&self) -> Vec<&Condition> {
        let mut out = Vec::new();
        fn walk<'a>(cond: &'a Condition, out: &mut Vec<&'a Condition>) {
            if let Condition::Conjunction(l, r) = cond {
                walk(l, out);
                walk(r, out);
            } else {
                out.push(cond);
            }
        }
        walk(self, &mut out);
        out
    }

    /// Rebuilds a left-associated conjunction from a list of conjuncts.
    /// Returns `None` for an empty list (caller substitutes `no filter`).
    pub fn conjoin(conjuncts: Vec<Condition>) -> Option<Condition> {
        let mut iter = conjuncts.into_iter();
        let first = iter.next()?;
        Some(iter.fold(first, |acc, c| acc.and(c)))
    }

    fn pattern_str(pattern: &Pattern) -> String {
        let inner: Vec<String> = pattern
            .iter()
            .map(|slot| slot.as_ref().map(Value::pretty).unwrap_or_else(|| "_".to_string()))
            .collect();
        format!("[{}]", inner.join(","))
    }

    pub fn pretty(&self) -> String {
        match self {
            Condition::Conjunction(l, r) => format!("({} \u{2227} {})", l.pretty(), r.pretty()),
            Condition::Comparison(op, lhs, rhs) => {
                format!("{} {} {}", lhs.pretty(), op.symbol(), rhs.pretty())
            }
            Condition::ExistenceCheck(rel, pat) => {
                format!("ExistenceCheck({rel}, {})", Self::pattern_str(pat))
            }
            Condition::NotExistenceCheck(rel, pat) => {
                format!("NotExistenceCheck({rel}, {})", Self::pattern_str(pat))
            }
            Condition::Empty(rel) => format!("Empty({rel})"),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.pretty())
    }
}

/// Aggregation function for `Operation::Aggregate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunc {
    Min,
    Max,
    Count,
    Sum,
}

impl AggregateFunc {
    pub fn keyword(self) -> &'static str {
        match self {
            AggregateFunc::Min => "MIN",
            AggregateFunc::Max => "MAX",
            AggregateFunc::Count => "COUNT",
            AggregateFunc::Sum => "SUM",
        }
    }
}

/// A node in a loop nest.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Scan(String, TupleId, Box<Operation>),
    IndexScan(String, TupleId, Pattern, Box<Operation>),
    Choice(String, TupleId, Condition, Box<Operation>),
    IndexChoice(String, TupleId, Pattern, Condition, Box<Operation>),
    Filter(Condition, Box<Operation>),
    /// Unpacks the record `value` into a fresh tuple of `arity`, bound to
    /// `tuple_id`.
    Lookup(Value, usize, TupleId, Box<Operation>),
    /// `func`, `value_expr`, `scan_source`, the tuple id the aggregate
    /// result is bound to, `nested`.
    Aggregate(AggregateFunc, Value, Box<Operation>, TupleId, Box<Operation>),
    Project(String, Vec<Value>),
    Return(Vec<Value>),
}

impl Operation {
    /// The tuple id this node introduces, if any.
    pub fn binds_tuple(&self) -> Option<TupleId> {
        match self {
            Operation::Scan(_, t, _)
            | Operation::IndexScan(_, t, _, _)
            | Operation::Choice(_, t, _, _)
            | Operation::IndexChoice(_, t, _, _, _)
            | Operation::Lookup(_, _, t, _)
            | Operation::Aggregate(_, _, _, t, _) => Some(*t),
            Operation::Filter(_, _) | Operation::Project(_, _) | Operation::Return(_) => None,
        }
    }

    /// The directly nested operation, if this variant carries exactly one.
    pub fn nested(&self) -> Option<&Operation> {
        match self {
            Operation::Scan(_, _, n)
            | Operation::IndexScan(_, _, _, n)
            | Operation::Choice(_, _, _, n)
            | Operation::IndexChoice(_, _, _, _, n)
            | Operation::Filter(_, n)
            | Operation::Lookup(_, _, _, n)
            | Operation::Aggregate(_, _, _, _, n) => Some(n),
            Operation::Project(_, _) | Operation::Return(_) => None,
        }
    }

    pub fn pretty(&self, indent: usize) -> String {
        let pad = "\t".repeat(indent);
        let child_pad = "\t".repeat(indent + 1);
        match self {
            Operation::Scan(rel, t, nested) => {
                format!("{pad}Scan({rel}, t{t})\n{child_pad}{}", nested.pretty(indent + 1))
            }
            Operation::IndexScan(rel, t, pattern, nested) => {
                format!(
                    "{pad}IndexScan({rel}, t{t}, {})\n{child_pad}{}",
                    Condition::pattern_str(pattern),
                    nested.pretty(indent + 1)
                )
            }
            Operation::Choice(rel, t, cond, nested) => {
                format!(
                    "{pad}Choice({rel}, t{t}, {})\n{child_pad}{}",
                    cond.pretty(),
                    nested.pretty(indent + 1)
                )
            }
            Operation::IndexChoice(rel, t, pattern, cond, nested) => {
                format!(
                    "{pad}IndexChoice({rel}, t{t}, {}, {})\n{child_pad}{}",
                    Condition::pattern_str(pattern),
                    cond.pretty(),
                    nested.pretty(indent + 1)
                )
            }
            Operation::Filter(cond, nested) => {
                format!("{pad}Filter({})\n{child_pad}{}", cond.pretty(), nested.pretty(indent + 1))
            }
            Operation::Lookup(value, arity, t, nested) => {
                format!(
                    "{pad}Lookup({}, arity={arity}, t{t})\n{child_pad}{}",
                    value.pretty(),
                    nested.pretty(indent + 1)
                )
            }
            Operation::Aggregate(func, value, source, t, nested) => {
                format!(
                    "{pad}Aggregate({}, {}, t{t})\n{child_pad}{}\n{child_pad}{}",
                    func.keyword(),
                    value.pretty(),
                    source.pretty(indent + 1),
                    nested.pretty(indent + 1)
                )
            }
            Operation::Project(rel, values) => {
                let inner: Vec<String> = values.iter().map(Value::pretty).collect();
                format!("{pad}Project({rel}, [{}])", inner.join(", "))
            }
            Operation::Return(values) => {
                let inner: Vec<String> = values.iter().map(Value::pretty).collect();
                format!("{pad}Return([{}])", inner.join(", "))
            }
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.pretty(0))
    }
}

/// On-disk format a `Load`/`Store` statement targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Facts,
    Csv,
}

impl FileFormat {
    pub fn extension(self) -> &'static str {
        match self {
            FileFormat::Facts => ".facts",
            FileFormat::Csv => ".csv",
        }
    }
}

/// Outer control structure wrapping loop nests.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Sequence(Vec<Statement>),
    Parallel(Vec<Statement>),
    Loop(Box<Statement>),
    Exit(Condition),
    LogTimer(String, Box<Statement>),
    Merge(String, String),
    Swap(String, String),
    Create(String, usize),
    Load(String, FileFormat),
    Store(String, FileFormat),
    PrintSize(String),
    Drop(String),
    Stratum(usize, Box<Statement>),
    Query(Operation),
}

impl Statement {
    pub fn pretty(&self, indent: usize) -> String {
        let pad = "\t".repeat(indent);
        match self {
            Statement::Sequence(stmts) => {
                let inner: Vec<String> = stmts.iter().map(|s| s.pretty(indent + 1)).collect();
                format!("{pad}Sequence {{\n{}\n{pad}}}", inner.join("\n"))
            }
            Statement::Parallel(stmts) => {
                let inner: Vec<String> = stmts.iter().map(|s| s.pretty(indent + 1)).collect();
                format!("{pad}Parallel {{\n{}\n{pad}}}", inner.join("\n"))
            }
            Statement::Loop(body) => format!("{pad}Loop {{\n{}\n{pad}}}", body.pretty(indent + 1)),
            Statement::Exit(cond) => format!("{pad}Exit({})", cond.pretty()),
            Statement::LogTimer(label, body) => {
                format!("{pad}LogTimer(\"{label}\") {{\n{}\n{pad}}}", body.pretty(indent + 1))
            }
            Statement::Merge(target, source) => format!("{pad}Merge({target}, {source})"),
            Statement::Swap(a, b) => format!("{pad}Swap({a}, {b})"),
            Statement::Create(rel, arity) => format!("{pad}Create({rel}, arity={arity})"),
            Statement::Load(rel, fmt) => format!("{pad}Load({rel}{})", fmt.extension()),
            Statement::Store(rel, fmt) => format!("{pad}Store({rel}{})", fmt.extension()),
            Statement::PrintSize(rel) => format!("{pad}PrintSize({rel})"),
            Statement::Drop(rel) => format!("{pad}Drop({rel})"),
            Statement::Stratum(index, body) => {
                format!("{pad}Stratum({index}) {{\n{}\n{pad}}}", body.pretty(indent + 1))
            }
            Statement::Query(op) => format!("{pad}Query(\n{}\n{pad})", op.pretty(indent + 1)),
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.pretty(0))
    }
}

/// A relation's name and arity, as carried through the RAM tree (distinct
/// from the richer `ast::RelationDecl`, which also carries I/O role).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    pub name: String,
    pub arity: usize,
}

/// A named subroutine emitted for a provenance subproof: takes `arity`
/// `Argument` parameters and runs `body` to completion, which must end in a
/// `Return`.
#[derive(Debug, Clone, PartialEq)]
pub struct Subroutine {
    pub name: String,
    pub arity: usize,
    pub body: Operation,
}

/// The translator's/transformer's unit of work: the top-level `Sequence` of
/// `Stratum` statements, plus any provenance subroutines keyed by name.
#[derive(Debug, Clone, PartialEq)]
pub struct RamProgram {
    pub main: Statement,
    pub relations: Vec<Relation>,
    pub subroutines: Vec<Subroutine>,
}

impl RamProgram {
    pub fn empty() -> Self {
        RamProgram {
            main: Statement::Sequence(Vec::new()),
            relations: Vec::new(),
            subroutines: Vec::new(),
        }
    }

    pub fn pretty(&self) -> String {
        let mut out = self.main.pretty(0);
        for sub in &self.subroutines {
            out.push_str(&format!(
                "\nsubroutine {}(arity={}) {{\n\t{}\n}}",
                sub.name,
                sub.arity,
                sub.body.pretty(1)
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_operation() -> Operation {
        Operation::Scan(
            "a".into(),
            0,
            Box::new(Operation::Scan(
                "b".into(),
                1,
                Box::new(Operation::Filter(
                    Condition::Comparison(
                        CompareOp::Eq,
                        Value::element_access(0, 1),
                        Value::element_access(1, 0),
                    ),
                    Box::new(Operation::Project(
                        "c".into(),
                        vec![Value::element_access(0, 0), Value::element_access(1, 1)],
                    )),
                )),
            )),
        )
    }

    #[test]
    fn clone_is_structurally_equal() {
        let op = sample_operation();
        let cloned = op.clone();
        assert_eq!(op, cloned);
    }

    #[test]
    fn clone_does_not_alias() {
        let op = sample_operation();
        let mut cloned = op.clone();
        if let Operation::Scan(rel, ..) = &mut cloned {
            *rel = "z".into();
        }
        assert_ne!(op, cloned);
    }

    #[test]
    fn equality_is_variant_aware() {
        let scan = Operation::Scan("a".into(), 0, Box::new(Operation::Return(vec![])));
        let choice = Operation::Choice(
            "a".into(),
            0,
            Condition::Empty("a".into()),
            Box::new(Operation::Return(vec![])),
        );
        assert_ne!(scan, choice);
    }

    #[test]
    fn tuple_ids_are_not_alpha_converted() {
        let a = Operation::Scan("r".into(), 0, Box::new(Operation::Return(vec![])));
        let b = Operation::Scan("r".into(), 1, Box::new(Operation::Return(vec![])));
        assert_ne!(a, b);
    }

    #[test]
    fn binds_tuple_reports_introduced_id() {
        let op = Operation::IndexScan(
            "r".into(),
            3,
            vec![None, Some(Value::Number(1))],
            Box::new(Operation::Return(vec![])),
        );
        assert_eq!(op.binds_tuple(), Some(3));
    }

    #[test]
    fn conjuncts_flatten_left_associated_tree() {
        let cond = Condition::Comparison(CompareOp::Eq, Value::Number(1), Value::Number(1))
            .and(Condition::Comparison(CompareOp::Lt, Value::Number(2), Value::Number(3)))
            .and(Condition::Comparison(CompareOp::Gt, Value::Number(4), Value::Number(5)));
        assert_eq!(cond.conjuncts().len(), 3);
    }

    #[test]
    fn conjoin_is_inverse_of_conjuncts_for_singletons() {
        let single = Condition::Empty("r".into());
        let rebuilt = Condition::conjoin(vec![single.clone()]).unwrap();
        assert_eq!(single, rebuilt);
    }

    #[test]
    fn pretty_prints_expected_shape() {
        let value = Value::Intrinsic(Intrinsic::Add, vec![Value::element_access(0, 1), Value::Number(1)]);
        assert_eq!(value.pretty(), "add(env(t0, i1),number(1))");
    }

    #[test]
    fn pattern_pretty_uses_wildcards() {
        let pattern: Pattern = vec![Some(Value::Number(1)), None];
        assert_eq!(Condition::pattern_str(&pattern), "[number(1),_]");
    }
}
