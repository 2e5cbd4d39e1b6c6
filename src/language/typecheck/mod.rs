mod builder;
mod checker;
mod scope;

pub use builder::{build_context, ClassTable};
pub use checker::check_program;
pub use scope::Scope;

use crate::language::{ast::Program, errors::Diagnostics};

/// Registers every class of `program` and type-checks all bodies, appending
/// what goes wrong to `diagnostics`.
pub fn typecheck(program: &Program, diagnostics: &mut Diagnostics) -> ClassTable {
    let table = build_context(program, diagnostics);
    check_program(program, &table, diagnostics);
    table
}
