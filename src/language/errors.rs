use crate::language::span::Span;
use miette::SourceSpan;
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct SyntaxError {
    pub message: String,
    pub label: String,
    pub span: Span,
    pub help: Option<String>,
}

impl SyntaxError {
    pub fn new(message: impl Into<String>, span: Span) -> Self {
        let message = message.into();
        Self {
            label: message.clone(),
            message,
            span,
            help: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    pub fn to_source_span(&self) -> SourceSpan {
        self.span.into()
    }
}

#[derive(Clone, Debug)]
pub struct SyntaxErrors {
    pub errors: Vec<SyntaxError>,
}

impl SyntaxErrors {
    pub fn new(errors: Vec<SyntaxError>) -> Self {
        Self { errors }
    }
}

/// Every soft error the semantic passes can report. Analysis always
/// continues after one of these with a fallback type.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Error)]
pub enum SemanticError {
    #[error("Type with the same name ({0}) already in context.")]
    DuplicateClass(String),

    #[error("Attribute \"{name}\" is already defined in {class}.")]
    DuplicateAttribute { name: String, class: String },

    #[error("Method \"{name}\" is already defined in {class}.")]
    DuplicateMethod { name: String, class: String },

    #[error("Method \"{name}\" already defined in \"{ancestor}\" with a different signature.")]
    MethodSignatureMismatch { name: String, ancestor: String },

    #[error("Type \"{0}\" is not defined.")]
    UnknownType(String),

    #[error("Class \"{class}\" cannot inherit from \"{parent}\".")]
    IllegalParent { class: String, parent: String },

    #[error("Class \"{0}\" is part of an inheritance cycle.")]
    CyclicInheritance(String),

    #[error("Variable \"{name}\" is not defined in \"{scope}\".")]
    VariableNotDefined { name: String, scope: String },

    #[error("Variable \"self\" is read-only.")]
    SelfReadonly,

    #[error("Cannot convert \"{found}\" into \"{expected}\".")]
    IncompatibleTypes { found: String, expected: String },

    #[error("Operation is not defined between \"{left}\" and \"{right}\".")]
    InvalidOperation { left: String, right: String },

    #[error("Comparison is not defined between \"{left}\" and \"{right}\".")]
    InvalidComparison { left: String, right: String },

    #[error("Was expected a bool, not \"{0}\".")]
    BoolExpected(String),

    #[error("Type \"{found}\" is not descendent of \"{ancestor}\".")]
    StaticDispatchAncestorViolation { found: String, ancestor: String },

    #[error("Method \"{method}\" is not defined in {ty}.")]
    MethodNotDefined { method: String, ty: String },

    #[error("Method {method} takes {expected} arguments but {found} were given.")]
    ArityMismatch {
        method: String,
        expected: usize,
        found: usize,
    },

    #[error("No possible type of \"{receiver}\" defines method \"{method}\" with {arity} arguments.")]
    NoMethodCandidate {
        receiver: String,
        method: String,
        arity: usize,
    },

    #[error("Can't infer type of \"{name}\", between [{}].", .candidates.join(", "))]
    AmbiguousType {
        name: String,
        candidates: Vec<String>,
    },
}

/// A semantic error anchored to the source text.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TypeError {
    pub error: SemanticError,
    pub span: Span,
}

impl TypeError {
    pub fn new(error: SemanticError, span: Span) -> Self {
        Self { error, span }
    }

    pub fn message(&self) -> String {
        self.error.to_string()
    }

    pub fn to_source_span(&self) -> SourceSpan {
        self.span.into()
    }
}

/// Ordered, duplicate-free sink threaded through every pass.
#[derive(Clone, Debug, Default)]
pub struct Diagnostics {
    errors: Vec<TypeError>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, error: SemanticError, span: Span) {
        let err = TypeError::new(error, span);
        if !self.errors.contains(&err) {
            self.errors.push(err);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn errors(&self) -> &[TypeError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<TypeError> {
        self.errors
    }
}

/// Fatal inference failures. Everything else is a soft [`SemanticError`].
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum InferenceError {
    #[error("type inference did not converge after {sweeps} sweeps")]
    NotConverged { sweeps: usize },
}
