use crate::language::errors::{InferenceError, SyntaxError, SyntaxErrors, TypeError};
use miette::{Diagnostic, NamedSource, Report, SourceSpan};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic, Clone)]
#[error("{message}")]
#[diagnostic(code(cool::syntax))]
pub struct SyntaxDiagnostic {
    #[source_code]
    src: NamedSource<String>,
    #[label("{label}")]
    span: SourceSpan,
    #[help]
    help: Option<String>,
    message: String,
    label: String,
}

impl SyntaxDiagnostic {
    pub fn from_error(src: NamedSource<String>, err: SyntaxError) -> Self {
        Self {
            src,
            span: err.to_source_span(),
            help: err.help.clone(),
            message: err.message.clone(),
            label: err.label,
        }
    }
}

#[derive(Debug, Error, Diagnostic, Clone)]
#[error("{message}")]
#[diagnostic(code(cool::semantic))]
pub struct SemanticDiagnostic {
    #[source_code]
    src: NamedSource<String>,
    #[label("here")]
    span: SourceSpan,
    #[help]
    help: Option<String>,
    message: String,
}

impl SemanticDiagnostic {
    pub fn from_error(src: NamedSource<String>, err: &TypeError) -> Self {
        Self {
            src,
            span: err.to_source_span(),
            help: None,
            message: err.message(),
        }
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }
}

fn named_source(path: &Path, source: &str) -> NamedSource<String> {
    NamedSource::new(path.display().to_string(), source.to_string())
}

pub fn emit_syntax_errors(path: &Path, source: &str, errors: &SyntaxErrors) {
    let src = named_source(path, source);
    for err in &errors.errors {
        let diagnostic = SyntaxDiagnostic::from_error(src.clone(), err.clone());
        eprintln!("{:?}", Report::new(diagnostic));
    }
}

pub fn emit_type_errors(path: &Path, source: &str, errors: &[TypeError], help: Option<&str>) {
    let src = named_source(path, source);
    for err in errors {
        let mut diagnostic = SemanticDiagnostic::from_error(src.clone(), err);
        if let Some(help) = help {
            diagnostic = diagnostic.with_help(help);
        }
        eprintln!("{:?}", Report::new(diagnostic));
    }
}

pub fn report_inference_error(path: &Path, error: &InferenceError) {
    eprintln!("Inference failed for {}: {}", path.display(), error);
}

pub fn report_io_error(path: &Path, error: &std::io::Error) {
    eprintln!("Failed to access {}: {}", path.display(), error);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::{errors::SemanticError, span::Span};

    #[test]
    fn semantic_diagnostic_points_at_the_error_span() {
        let source = "class A { a : Int <- \"x\"; };";
        let err = TypeError::new(
            SemanticError::IncompatibleTypes {
                found: "String".into(),
                expected: "Int".into(),
            },
            Span::new(21, 24),
        );
        let diagnostic =
            SemanticDiagnostic::from_error(named_source(Path::new("a.cl"), source), &err);
        assert_eq!(
            diagnostic.to_string(),
            "Cannot convert \"String\" into \"Int\"."
        );
        let labels: Vec<_> = diagnostic.labels().expect("labels").collect();
        assert_eq!(labels[0].offset(), 21);
        assert_eq!(labels[0].len(), 3);
    }
}
