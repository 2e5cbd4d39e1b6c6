use crate::language::{
    ast::{Class, Program},
    errors::{Diagnostics, SemanticError},
    span::Span,
    types::{Context, Method, TypeId},
};
use tracing::debug;

/// The type context of a program together with the type registered for
/// each class declaration (`None` when the declaration was rejected).
#[derive(Clone, Debug)]
pub struct ClassTable {
    pub context: Context,
    pub classes: Vec<Option<TypeId>>,
}

impl ClassTable {
    pub fn registered<'a, 'p: 'a>(
        &'a self,
        program: &'p Program,
    ) -> impl Iterator<Item = (&'p Class, TypeId)> + 'a {
        registered(program, &self.classes)
    }
}

fn registered<'a, 'p: 'a>(
    program: &'p Program,
    classes: &'a [Option<TypeId>],
) -> impl Iterator<Item = (&'p Class, TypeId)> + 'a {
    program
        .classes
        .iter()
        .zip(classes)
        .filter_map(|(class, id)| id.map(|id| (class, id)))
}

pub fn build_context(program: &Program, diagnostics: &mut Diagnostics) -> ClassTable {
    let mut context = Context::new();

    let classes: Vec<Option<TypeId>> = program
        .classes
        .iter()
        .map(|class| match context.create_type(&class.name) {
            Ok(id) => Some(id),
            Err(err) => {
                diagnostics.report(err, class.span);
                None
            }
        })
        .collect();

    let registered: Vec<(&Class, TypeId)> = registered(program, &classes).collect();

    for (class, id) in &registered {
        link_parent(&mut context, class, *id, diagnostics);
    }
    for (class, id) in &registered {
        define_features(&mut context, class, *id, diagnostics);
    }
    for (class, id) in &registered {
        validate_inherited(&mut context, class, *id, diagnostics);
    }

    debug!(
        classes = registered.len(),
        errors = diagnostics.len(),
        "built class table"
    );
    ClassTable { context, classes }
}

fn link_parent(ctx: &mut Context, class: &Class, id: TypeId, diagnostics: &mut Diagnostics) {
    let Some(parent_name) = &class.parent else {
        return;
    };
    match ctx.get_type(parent_name) {
        Ok(parent) => {
            if let Err(err) = ctx.set_parent(id, parent) {
                diagnostics.report(err, class.span);
            }
        }
        Err(err) => {
            diagnostics.report(err, class.span);
            // Unknown parents are recorded as the error type.
            if let Err(err) = ctx.set_parent(id, TypeId::ERROR) {
                diagnostics.report(err, class.span);
            }
        }
    }
}

fn resolve(ctx: &Context, name: &str, span: Span, diagnostics: &mut Diagnostics) -> TypeId {
    ctx.get_type(name).unwrap_or_else(|err| {
        diagnostics.report(err, span);
        TypeId::ERROR
    })
}

fn define_features(ctx: &mut Context, class: &Class, id: TypeId, diagnostics: &mut Diagnostics) {
    for attr in class.attributes() {
        let ty = resolve(ctx, &attr.ty, attr.span, diagnostics);
        if ctx.type_(id).own_attribute(&attr.name).is_some() {
            diagnostics.report(
                SemanticError::DuplicateAttribute {
                    name: attr.name.clone(),
                    class: class.name.clone(),
                },
                attr.span,
            );
            continue;
        }
        ctx.define_attribute(id, &attr.name, ty);
    }

    for method in class.methods() {
        let params = method
            .params
            .iter()
            .map(|param| {
                (
                    param.name.clone(),
                    resolve(ctx, &param.ty, param.span, diagnostics),
                )
            })
            .collect();
        let return_type = resolve(ctx, &method.return_type, method.span, diagnostics);
        if ctx.type_(id).own_method(&method.name).is_some() {
            diagnostics.report(
                SemanticError::DuplicateMethod {
                    name: method.name.clone(),
                    class: class.name.clone(),
                },
                method.span,
            );
            continue;
        }
        ctx.define_method(
            id,
            Method {
                name: method.name.clone(),
                params,
                return_type,
            },
        );
    }
}

/// Runs once every class has its own features, so declaration order does
/// not matter.
fn validate_inherited(
    ctx: &mut Context,
    class: &Class,
    id: TypeId,
    diagnostics: &mut Diagnostics,
) {
    let Some(parent) = ctx.parent(id) else {
        return;
    };

    let mut shadowing = Vec::new();
    for attr in &ctx.type_(id).attributes {
        if let Some((owner, _)) = ctx.get_attribute(parent, &attr.name) {
            shadowing.push(attr.name.clone());
            let span = class
                .attributes()
                .find(|decl| decl.name == attr.name)
                .map_or(class.span, |decl| decl.span);
            diagnostics.report(
                SemanticError::DuplicateAttribute {
                    name: attr.name.clone(),
                    class: ctx.name(owner).to_string(),
                },
                span,
            );
        }
    }
    ctx.type_mut(id)
        .attributes
        .retain(|attr| !shadowing.contains(&attr.name));

    for method in &ctx.type_(id).methods {
        let Some((owner, inherited)) = ctx.get_method(parent, &method.name) else {
            continue;
        };
        if !method.same_signature(inherited) {
            let span = class
                .methods()
                .find(|decl| decl.name == method.name)
                .map_or(class.span, |decl| decl.span);
            diagnostics.report(
                SemanticError::MethodSignatureMismatch {
                    name: method.name.clone(),
                    ancestor: ctx.name(owner).to_string(),
                },
                span,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::parser::parse_program;
    use indoc::indoc;

    fn build(source: &str) -> (ClassTable, Vec<SemanticError>) {
        let program = parse_program(source).expect("parse");
        let mut diagnostics = Diagnostics::new();
        let table = build_context(&program, &mut diagnostics);
        let errors = diagnostics
            .into_errors()
            .into_iter()
            .map(|err| err.error)
            .collect();
        (table, errors)
    }

    #[test]
    fn registers_classes_in_any_order() {
        let (table, errors) = build(indoc! {"
            class B inherits A { y : Int; };
            class A { x : String; f() : Int { 1 }; };
        "});
        assert!(errors.is_empty(), "{errors:?}");
        let ctx = &table.context;
        let b = ctx.get_type("B").expect("B");
        let a = ctx.get_type("A").expect("A");
        assert_eq!(ctx.parent(b), Some(a));
        assert!(ctx.get_method(b, "f").is_some());
        assert_eq!(ctx.all_attributes(b).len(), 2);
    }

    #[test]
    fn duplicate_class_is_skipped() {
        let (table, errors) = build("class A { }; class A { x : Int; }; class Int { };");
        assert_eq!(
            errors,
            vec![
                SemanticError::DuplicateClass("A".into()),
                SemanticError::DuplicateClass("Int".into()),
            ]
        );
        assert_eq!(table.classes.iter().filter(|id| id.is_some()).count(), 1);
        let a = table.context.get_type("A").expect("A");
        assert!(table.context.type_(a).attributes.is_empty());
    }

    #[test]
    fn unknown_parent_falls_back_to_error_type() {
        let (table, errors) = build("class A inherits Missing { };");
        assert_eq!(errors, vec![SemanticError::UnknownType("Missing".into())]);
        let a = table.context.get_type("A").expect("A");
        assert_eq!(table.context.parent(a), Some(TypeId::ERROR));
    }

    #[test]
    fn rejects_illegal_and_cyclic_parents() {
        let (_, errors) = build(indoc! {"
            class A inherits Int { };
            class B inherits C { };
            class C inherits B { };
        "});
        assert_eq!(
            errors,
            vec![
                SemanticError::IllegalParent {
                    class: "A".into(),
                    parent: "Int".into(),
                },
                SemanticError::CyclicInheritance("C".into()),
            ]
        );
    }

    #[test]
    fn reports_duplicate_and_inherited_attributes() {
        let (_, errors) = build(indoc! {"
            class A { c : Int; c : String; };
            class B inherits A { c : Bool; };
        "});
        assert_eq!(
            errors,
            vec![
                SemanticError::DuplicateAttribute {
                    name: "c".into(),
                    class: "A".into(),
                },
                SemanticError::DuplicateAttribute {
                    name: "c".into(),
                    class: "A".into(),
                },
            ]
        );
    }

    #[test]
    fn override_must_keep_signature() {
        let (_, errors) = build(indoc! {"
            class A { f(x : Int) : Int { x }; g() : Object { self }; };
            class B inherits A { f(y : Int) : Int { y }; g(z : Int) : Object { z }; };
            class C inherits B { type_name() : Int { 1 }; };
        "});
        assert_eq!(
            errors,
            vec![
                SemanticError::MethodSignatureMismatch {
                    name: "g".into(),
                    ancestor: "A".into(),
                },
                SemanticError::MethodSignatureMismatch {
                    name: "type_name".into(),
                    ancestor: "Object".into(),
                },
            ]
        );
    }

    #[test]
    fn unknown_feature_types_are_reported() {
        let (table, errors) = build("class A { x : Nope; f(p : Gone) : Int { 1 }; };");
        assert_eq!(
            errors,
            vec![
                SemanticError::UnknownType("Nope".into()),
                SemanticError::UnknownType("Gone".into()),
            ]
        );
        let a = table.context.get_type("A").expect("A");
        assert_eq!(table.context.type_(a).attributes[0].ty, TypeId::ERROR);
    }
}
