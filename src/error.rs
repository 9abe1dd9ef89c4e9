//! Translator/transformer error types.
//!
//! Analyses never fail (§4.2: "pure, stateless functions"). Only the
//! translator and the transformer orchestrator can observe an invariant
//! violation, and even then the failure is reported rather than panicking:
//! it is pushed into an [`ErrorReport`] and the affected clause or stratum
//! simply yields no RAM output, so one bad clause does not abort translation
//! of the rest of the program.

use thiserror::Error;

/// A fatal problem encountered while lowering AST to RAM.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TranslateError {
    #[error("undefined variable `{variable}` referenced in clause {clause} of relation `{relation}`")]
    UngroundedVariable {
        relation: String,
        clause: usize,
        variable: String,
    },

    #[error("aggregator result referenced before it is bound, in clause {clause} of relation `{relation}`")]
    UndefinedAggregateLookup { relation: String, clause: usize },

    #[error("relation `{relation}` expects arity {expected}, got {actual}")]
    ArityMismatch {
        relation: String,
        expected: usize,
        actual: usize,
    },

    #[error("unknown operator `{operator}`")]
    UnknownOperator { operator: String },

    #[error("unsupported AST shape: {detail}")]
    UnsupportedShape { detail: String },

    #[error("relation `{relation}` is not declared")]
    UnknownRelation { relation: String },
}

impl TranslateError {
    /// The relation this error is attributable to, if any — used to decide
    /// which clause/stratum's output to suppress.
    pub fn relation(&self) -> Option<&str> {
        match self {
            TranslateError::UngroundedVariable { relation, .. }
            | TranslateError::UndefinedAggregateLookup { relation, .. }
            | TranslateError::ArityMismatch { relation, .. }
            | TranslateError::UnknownRelation { relation } => Some(relation),
            TranslateError::UnknownOperator { .. } | TranslateError::UnsupportedShape { .. } => None,
        }
    }
}

/// Append-only sink for translation diagnostics, threaded by reference
/// through the translator the way the symbol table is (§5: "the symbol
/// table and error reporter are... append-only during translation").
#[derive(Debug, Default, Clone)]
pub struct ErrorReport {
    errors: Vec<TranslateError>,
}

impl ErrorReport {
    pub fn new() -> Self {
        ErrorReport::default()
    }

    pub fn push(&mut self, error: TranslateError) {
        self.errors.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TranslateError> {
        self.errors.iter()
    }

    pub fn has_errors_for(&self, relation: &str) -> bool {
        self.errors.iter().any(|e| e.relation() == Some(relation))
    }
}
