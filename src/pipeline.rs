use crate::language::{
    ast::Program,
    errors::{Diagnostics, InferenceError, SyntaxErrors, TypeError},
    inference::{infer, Ambiguity},
    parser::parse_program,
    typecheck::typecheck,
};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AnalysisOptions {
    pub infer: bool,
    /// `None` derives the bound from the collected bags.
    pub max_sweeps: Option<usize>,
}

impl AnalysisOptions {
    pub fn check() -> Self {
        Self {
            infer: false,
            max_sweeps: None,
        }
    }

    pub fn infer() -> Self {
        Self {
            infer: true,
            max_sweeps: None,
        }
    }

    pub fn with_max_sweeps(mut self, max_sweeps: Option<usize>) -> Self {
        self.max_sweeps = max_sweeps;
        self
    }
}

#[derive(Clone, Debug)]
pub struct Analysis {
    /// The input program, with placeholders rewritten when inference ran.
    pub program: Program,
    /// Errors of the strict check on the program as written.
    pub errors: Vec<TypeError>,
    pub inferred: Option<InferenceSummary>,
    /// Errors of the strict check on the rewritten program.
    pub final_errors: Vec<TypeError>,
}

#[derive(Clone, Debug)]
pub struct InferenceSummary {
    pub sweeps: usize,
    pub replaced: usize,
    pub diagnostics: Vec<TypeError>,
    pub ambiguities: Vec<Ambiguity>,
    /// Final bag contents, one scope per line.
    pub bags: String,
}

impl Analysis {
    pub fn inference_errors(&self) -> &[TypeError] {
        self.inferred
            .as_ref()
            .map(|summary| summary.diagnostics.as_slice())
            .unwrap_or_default()
    }

    pub fn ambiguities(&self) -> &[Ambiguity] {
        self.inferred
            .as_ref()
            .map(|summary| summary.ambiguities.as_slice())
            .unwrap_or_default()
    }

    /// Every error in the order the passes produced them.
    pub fn all_errors(&self) -> impl Iterator<Item = &TypeError> {
        self.errors
            .iter()
            .chain(self.inference_errors())
            .chain(self.final_errors.iter())
    }

    pub fn is_clean(&self) -> bool {
        self.all_errors().next().is_none()
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("found {} syntax error(s)", .0.errors.len())]
    Syntax(SyntaxErrors),
    #[error(transparent)]
    Inference(#[from] InferenceError),
}

impl From<SyntaxErrors> for SourceError {
    fn from(errors: SyntaxErrors) -> Self {
        SourceError::Syntax(errors)
    }
}

/// Checks `program` and, when asked and the check is clean, infers every
/// placeholder and checks the rewritten program again.
pub fn analyze(mut program: Program, options: &AnalysisOptions) -> Result<Analysis, InferenceError> {
    let mut diagnostics = Diagnostics::new();
    let table = typecheck(&program, &mut diagnostics);
    let errors = diagnostics.into_errors();
    debug!(errors = errors.len(), "semantic check finished");

    if !options.infer || !errors.is_empty() || !program.has_placeholders() {
        return Ok(Analysis {
            program,
            errors,
            inferred: None,
            final_errors: Vec::new(),
        });
    }

    let inference = infer(&mut program, &table, options.max_sweeps)?;
    info!(
        sweeps = inference.sweeps,
        replaced = inference.replaced,
        ambiguous = inference.ambiguities.len(),
        "placeholders inferred"
    );
    let inferred = InferenceSummary {
        sweeps: inference.sweeps,
        replaced: inference.replaced,
        bags: inference.tree.render(&table.context),
        diagnostics: inference.diagnostics.into_errors(),
        ambiguities: inference.ambiguities,
    };

    let mut diagnostics = Diagnostics::new();
    typecheck(&program, &mut diagnostics);
    let final_errors = diagnostics.into_errors();
    debug!(errors = final_errors.len(), "post-inference check finished");

    Ok(Analysis {
        program,
        errors,
        inferred: Some(inferred),
        final_errors,
    })
}

pub fn analyze_source(source: &str, options: &AnalysisOptions) -> Result<Analysis, SourceError> {
    let program = parse_program(source)?;
    debug!(classes = program.classes.len(), "parsed program");
    Ok(analyze(program, options)?)
}

pub fn check_source(source: &str) -> Result<Analysis, SourceError> {
    analyze_source(source, &AnalysisOptions::check())
}

pub fn infer_source(source: &str) -> Result<Analysis, SourceError> {
    analyze_source(source, &AnalysisOptions::infer())
}
