mod bags;
mod collector;
mod reducer;
mod replacer;

pub use bags::{BagEntry, BagId, BagKind, BagNode, BagTree, Candidates, Slot, TypeSet};
pub use collector::collect;
pub use reducer::{reduce, sweep_bound, Reduction};
pub use replacer::{ambiguity_report, replace, resolve_entry, Ambiguity};

use crate::language::{
    ast::Program,
    errors::{Diagnostics, InferenceError, SemanticError},
    typecheck::ClassTable,
};
use tracing::{debug, warn};

/// Everything one inference run produced.
#[derive(Clone, Debug)]
pub struct Inference {
    pub tree: BagTree,
    pub sweeps: usize,
    /// Diagnostics of the converged sweep followed by one entry per ambiguity.
    pub diagnostics: Diagnostics,
    pub ambiguities: Vec<Ambiguity>,
    /// Number of placeholder slots rewritten in the program.
    pub replaced: usize,
}

/// Collects, reduces to a fixpoint, and rewrites every `AUTO_TYPE` slot of
/// `program` with the join of its surviving candidates.
pub fn infer(
    program: &mut Program,
    table: &ClassTable,
    max_sweeps: Option<usize>,
) -> Result<Inference, InferenceError> {
    let ctx = &table.context;
    let mut tree = collect(program, table);
    let Reduction {
        sweeps,
        mut diagnostics,
    } = reduce(program, table, &mut tree, max_sweeps)?;

    let ambiguities = ambiguity_report(&tree, ctx);
    for ambiguity in &ambiguities {
        diagnostics.report(
            SemanticError::AmbiguousType {
                name: ambiguity.name.clone(),
                candidates: ambiguity.candidates.clone(),
            },
            ambiguity.span,
        );
    }
    if !ambiguities.is_empty() {
        warn!(count = ambiguities.len(), "some placeholders stayed ambiguous");
    }

    let replaced = replace(program, &tree, ctx);
    debug!(sweeps, replaced, "inference finished");

    Ok(Inference {
        tree,
        sweeps,
        diagnostics,
        ambiguities,
        replaced,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::{
        ast::{Feature, AUTO_TYPE},
        parser::parse_program,
        typecheck::typecheck,
    };
    use indoc::indoc;

    fn infer_source(source: &str) -> (Program, Inference) {
        let mut program = parse_program(source).expect("parse");
        let mut diagnostics = Diagnostics::new();
        let table = typecheck(&program, &mut diagnostics);
        assert!(diagnostics.is_empty(), "{:?}", diagnostics.errors());
        let inference = infer(&mut program, &table, None).expect("converges");
        (program, inference)
    }

    #[test]
    fn rewrites_every_placeholder_slot() {
        let (program, inference) = infer_source(indoc! {"
            class Main {
                n : AUTO_TYPE <- 0;
                twice(x : AUTO_TYPE) : AUTO_TYPE { x + x };
                greet() : AUTO_TYPE { let s : AUTO_TYPE <- \"hi\" in s };
            };
        "});
        assert!(!program.has_placeholders());
        assert_eq!(inference.replaced, 5);
        assert!(inference.ambiguities.is_empty());

        let class = &program.classes[0];
        let declared: Vec<String> = class
            .features
            .iter()
            .map(|feature| match feature {
                Feature::Attribute(attr) => format!("{}:{}", attr.name, attr.ty),
                Feature::Method(method) => format!("{}:{}", method.name, method.return_type),
            })
            .collect();
        assert_eq!(declared, vec!["n:Int", "twice:Int", "greet:String"]);
    }

    #[test]
    fn unconstrained_placeholder_is_reported_and_joined() {
        let (program, inference) = infer_source(indoc! {"
            class Main {
                x : AUTO_TYPE;
            };
        "});
        assert_eq!(inference.ambiguities.len(), 1);
        assert_eq!(inference.ambiguities[0].name, "x");
        assert_eq!(inference.diagnostics.len(), 1);
        assert!(inference.diagnostics.errors()[0]
            .message()
            .starts_with("Can't infer type of \"x\", between [Bool, IO, Int, Main, Object, String]"));

        let Feature::Attribute(attr) = &program.classes[0].features[0] else {
            panic!("expected attribute");
        };
        assert_eq!(attr.ty, "Object");
        assert_ne!(attr.ty, AUTO_TYPE);
    }

    #[test]
    fn sweep_limit_is_fatal() {
        let mut program = parse_program(indoc! {"
            class Main {
                f(a : AUTO_TYPE) : AUTO_TYPE { a + 1 };
            };
        "})
        .expect("parse");
        let mut diagnostics = Diagnostics::new();
        let table = typecheck(&program, &mut diagnostics);
        let err = infer(&mut program, &table, Some(1)).expect_err("one sweep is not enough");
        assert_eq!(err, InferenceError::NotConverged { sweeps: 1 });
        assert!(program.has_placeholders());
    }
}
