use super::{builder::ClassTable, scope::Scope};
use crate::language::{
    ast::*,
    errors::{Diagnostics, SemanticError},
    span::Span,
    types::{Context, Method, TypeId},
};
use tracing::debug;

pub fn check_program(program: &Program, table: &ClassTable, diagnostics: &mut Diagnostics) {
    let before = diagnostics.len();
    let mut checker = Checker {
        ctx: &table.context,
        diagnostics,
        scope: Scope::new(),
        current_class: TypeId::OBJECT,
        scope_name: String::new(),
    };
    for (class, id) in table.registered(program) {
        checker.check_class(class, id);
    }
    debug!(
        errors = checker.diagnostics.len() - before,
        "checked program bodies"
    );
}

struct Checker<'a> {
    ctx: &'a Context,
    diagnostics: &'a mut Diagnostics,
    scope: Scope,
    current_class: TypeId,
    /// Name used by "not defined in" messages: the method, or the class
    /// while checking attribute initializers.
    scope_name: String,
}

impl Checker<'_> {
    fn report(&mut self, error: SemanticError, span: Span) {
        self.diagnostics.report(error, span);
    }

    fn name(&self, ty: TypeId) -> String {
        self.ctx.name(ty).to_string()
    }

    /// Declared type of a slot, with the dynamic-self marker resolved.
    fn declared(&self, name: &str) -> TypeId {
        let ty = self.ctx.get_type(name).unwrap_or(TypeId::ERROR);
        self.ctx.resolve_self(ty, self.current_class)
    }

    /// Like [`Checker::declared`], for slots the class builder never sees.
    fn declared_local(&mut self, name: &str, span: Span) -> TypeId {
        match self.ctx.get_type(name) {
            Ok(ty) => self.ctx.resolve_self(ty, self.current_class),
            Err(err) => {
                self.report(err, span);
                TypeId::ERROR
            }
        }
    }

    fn expect_conforms(&mut self, found: TypeId, expected: TypeId, span: Span) {
        if !self.ctx.conforms_to(found, expected) {
            let error = SemanticError::IncompatibleTypes {
                found: self.name(found),
                expected: self.name(expected),
            };
            self.report(error, span);
        }
    }

    fn check_class(&mut self, class: &Class, id: TypeId) {
        self.current_class = id;
        self.scope.push();
        self.scope.declare(SELF_NAME, id);
        for attr in self.ctx.all_attributes(id) {
            let ty = self.ctx.resolve_self(attr.ty, id);
            self.scope.declare(&attr.name, ty);
        }

        for feature in &class.features {
            match feature {
                Feature::Attribute(attr) => {
                    let Some(init) = &attr.init else {
                        continue;
                    };
                    self.scope_name = class.name.clone();
                    let found = self.visit(init);
                    let expected = self.declared(&attr.ty);
                    self.expect_conforms(found, expected, init.span);
                }
                Feature::Method(method) => self.check_method(method),
            }
        }
        self.scope.pop();
    }

    fn check_method(&mut self, method: &MethodDecl) {
        self.scope_name = method.name.clone();
        self.scope.push();
        for param in &method.params {
            let ty = self.declared(&param.ty);
            self.scope.declare(&param.name, ty);
        }
        let found = self.visit(&method.body);
        let expected = self.declared(&method.return_type);
        self.expect_conforms(found, expected, method.body.span);
        self.scope.pop();
    }

    fn visit(&mut self, expr: &Expr) -> TypeId {
        match &expr.kind {
            ExprKind::Assign { name, value } => {
                let found = self.visit(value);
                if name == SELF_NAME {
                    self.report(SemanticError::SelfReadonly, expr.span);
                    return TypeId::ERROR;
                }
                match self.scope.lookup(name) {
                    Some(target) => {
                        self.expect_conforms(found, target, value.span);
                        target
                    }
                    None => {
                        self.report_undefined(name, expr.span);
                        TypeId::ERROR
                    }
                }
            }
            ExprKind::Dispatch {
                receiver,
                method,
                args,
            } => {
                let receiver_ty = match receiver {
                    Some(receiver) => self.visit(receiver),
                    None => self.current_class,
                };
                if receiver_ty == TypeId::AUTO {
                    for arg in args {
                        self.visit(arg);
                    }
                    return TypeId::AUTO;
                }
                let Some(signature) = self.lookup_method(receiver_ty, method, args, expr.span)
                else {
                    return TypeId::ERROR;
                };
                self.check_args(&signature, args, expr.span);
                self.ctx.resolve_self(signature.return_type, receiver_ty)
            }
            ExprKind::StaticDispatch {
                receiver,
                ancestor,
                method,
                args,
            } => {
                let receiver_ty = self.visit(receiver);
                let ancestor_ty = self.declared_local(ancestor, expr.span);
                if !self.ctx.conforms_to(receiver_ty, ancestor_ty) {
                    let error = SemanticError::StaticDispatchAncestorViolation {
                        found: self.name(receiver_ty),
                        ancestor: self.name(ancestor_ty),
                    };
                    self.report(error, receiver.span);
                }
                let Some(signature) = self.lookup_method(ancestor_ty, method, args, expr.span)
                else {
                    return TypeId::ERROR;
                };
                self.check_args(&signature, args, expr.span);
                self.ctx.resolve_self(signature.return_type, receiver_ty)
            }
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.check_condition(cond);
                let then_ty = self.visit(then_branch);
                let else_ty = self.visit(else_branch);
                self.ctx.least_upper_bound(then_ty, else_ty)
            }
            ExprKind::While { cond, body } => {
                self.check_condition(cond);
                self.visit(body);
                TypeId::OBJECT
            }
            ExprKind::Let { bindings, body } => {
                self.scope.push();
                for binding in bindings {
                    let declared = self.declared_local(&binding.ty, binding.span);
                    if let Some(init) = &binding.init {
                        let found = self.visit(init);
                        self.expect_conforms(found, declared, init.span);
                    }
                    self.scope.declare(&binding.name, declared);
                }
                let ty = self.visit(body);
                self.scope.pop();
                ty
            }
            ExprKind::Case { scrutinee, arms } => {
                self.visit(scrutinee);
                let mut result: Option<TypeId> = None;
                for arm in arms {
                    self.scope.push();
                    let declared = self.declared_local(&arm.ty, arm.span);
                    self.scope.declare(&arm.name, declared);
                    let ty = self.visit(&arm.body);
                    self.scope.pop();
                    result = Some(match result {
                        Some(acc) => self.ctx.least_upper_bound(acc, ty),
                        None => ty,
                    });
                }
                result.unwrap_or(TypeId::OBJECT)
            }
            ExprKind::Block(exprs) => {
                let mut last = TypeId::OBJECT;
                for expr in exprs {
                    last = self.visit(expr);
                }
                last
            }
            ExprKind::Binary { op, left, right } => {
                let left_ty = self.visit(left);
                let right_ty = self.visit(right);
                if op.is_arithmetic() {
                    let ints = self.ctx.conforms_to(left_ty, TypeId::INT)
                        && self.ctx.conforms_to(right_ty, TypeId::INT);
                    if !ints {
                        let error = SemanticError::InvalidOperation {
                            left: self.name(left_ty),
                            right: self.name(right_ty),
                        };
                        self.report(error, expr.span);
                    }
                    TypeId::INT
                } else {
                    let related = self.ctx.conforms_to(left_ty, right_ty)
                        || self.ctx.conforms_to(right_ty, left_ty);
                    if !related {
                        let error = SemanticError::InvalidComparison {
                            left: self.name(left_ty),
                            right: self.name(right_ty),
                        };
                        self.report(error, expr.span);
                    }
                    TypeId::BOOL
                }
            }
            ExprKind::Unary { op, expr: inner } => {
                let ty = self.visit(inner);
                match op {
                    UnaryOp::Not => {
                        if ty != TypeId::BOOL && !self.ctx.is_wildcard(ty) {
                            self.report(SemanticError::BoolExpected(self.name(ty)), inner.span);
                        }
                        TypeId::BOOL
                    }
                    UnaryOp::Negate => {
                        if !self.ctx.conforms_to(ty, TypeId::INT) {
                            let error = SemanticError::InvalidOperation {
                                left: self.name(ty),
                                right: self.name(TypeId::INT),
                            };
                            self.report(error, expr.span);
                        }
                        TypeId::INT
                    }
                    UnaryOp::IsVoid => TypeId::BOOL,
                }
            }
            ExprKind::New(ty) => self.declared_local(ty, expr.span),
            ExprKind::Paren(inner) => self.visit(inner),
            ExprKind::Identifier(name) => match self.scope.lookup(name) {
                Some(ty) => ty,
                None => {
                    self.report_undefined(name, expr.span);
                    TypeId::ERROR
                }
            },
            ExprKind::Integer(_) => TypeId::INT,
            ExprKind::String(_) => TypeId::STRING,
            ExprKind::Bool(_) => TypeId::BOOL,
        }
    }

    fn report_undefined(&mut self, name: &str, span: Span) {
        let error = SemanticError::VariableNotDefined {
            name: name.to_string(),
            scope: self.scope_name.clone(),
        };
        self.report(error, span);
    }

    fn check_condition(&mut self, cond: &Expr) {
        let ty = self.visit(cond);
        if !self.ctx.conforms_to(ty, TypeId::BOOL) {
            self.report(SemanticError::BoolExpected(self.name(ty)), cond.span);
        }
    }

    /// Resolves `method` on `owner`. On failure the arguments are still
    /// visited so errors inside them surface. An `<error>` owner was already
    /// reported and fails silently.
    fn lookup_method(
        &mut self,
        owner: TypeId,
        method: &str,
        args: &[Expr],
        span: Span,
    ) -> Option<Method> {
        match self.ctx.get_method(owner, method) {
            Some((_, signature)) => Some(signature.clone()),
            None if owner == TypeId::ERROR => {
                for arg in args {
                    self.visit(arg);
                }
                None
            }
            None => {
                let error = SemanticError::MethodNotDefined {
                    method: method.to_string(),
                    ty: self.name(owner),
                };
                self.report(error, span);
                for arg in args {
                    self.visit(arg);
                }
                None
            }
        }
    }

    fn check_args(&mut self, signature: &Method, args: &[Expr], span: Span) {
        if signature.arity() != args.len() {
            let error = SemanticError::ArityMismatch {
                method: signature.name.clone(),
                expected: signature.arity(),
                found: args.len(),
            };
            self.report(error, span);
            for arg in args {
                self.visit(arg);
            }
            return;
        }
        for (arg, (_, param_ty)) in args.iter().zip(&signature.params) {
            let found = self.visit(arg);
            self.expect_conforms(found, *param_ty, arg.span);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::{parser::parse_program, typecheck::build_context};
    use indoc::indoc;

    fn check(source: &str) -> Vec<String> {
        let program = parse_program(source).expect("parse");
        let mut diagnostics = Diagnostics::new();
        let table = build_context(&program, &mut diagnostics);
        check_program(&program, &table, &mut diagnostics);
        diagnostics
            .into_errors()
            .into_iter()
            .map(|err| err.message())
            .collect()
    }

    #[test]
    fn accepts_well_typed_program() {
        let errors = check(indoc! {r#"
            class Main inherits IO {
                count : Int <- 0;
                main() : SELF_TYPE {
                    {
                        while count < 10 loop count <- count + 1 pool;
                        if isvoid self then out_string("void") else out_int(count) fi;
                    }
                };
                name() : String { type_name().concat("!").substr(0, 1) };
                me() : Main { copy() };
            };
        "#});
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn method_body_and_argument_mismatches() {
        let errors = check(indoc! {"
            class A {
                d : Int;
                init(e : String) : Bool { { let z : Int <- d, x : Int <- 5 in z + x; } };
            };
            class Main {
                c : A;
                d : Int;
                main() : Object { c.init(d) };
            };
        "});
        assert_eq!(
            errors,
            vec![
                "Cannot convert \"Int\" into \"Bool\".",
                "Cannot convert \"Int\" into \"String\".",
            ]
        );
    }

    #[test]
    fn undefined_variables_name_their_scope() {
        let errors = check(indoc! {"
            class A {
                a : Int <- b;
                f() : Int { c };
                g() : Object { self <- new A };
            };
        "});
        assert_eq!(
            errors,
            vec![
                "Variable \"b\" is not defined in \"A\".",
                "Variable \"c\" is not defined in \"f\".",
                "Variable \"self\" is read-only.",
            ]
        );
    }

    #[test]
    fn let_bindings_are_sequential() {
        let errors = check(indoc! {"
            class A {
                f() : Int { let x : Int <- y, y : Int <- x in x + y };
            };
        "});
        assert_eq!(errors, vec!["Variable \"y\" is not defined in \"f\"."]);
    }

    #[test]
    fn operators_and_conditions() {
        let errors = check(indoc! {r#"
            class A {
                f() : Object {
                    {
                        1 + "a";
                        ~true;
                        not 3;
                        "a" < 2;
                        if 1 then 2 else 3 fi;
                    }
                };
            };
        "#});
        assert_eq!(
            errors,
            vec![
                "Operation is not defined between \"Int\" and \"String\".",
                "Operation is not defined between \"Bool\" and \"Int\".",
                "Was expected a bool, not \"Int\".",
                "Comparison is not defined between \"String\" and \"Int\".",
                "Was expected a bool, not \"Int\".",
            ]
        );
    }

    #[test]
    fn branches_join_to_common_ancestor() {
        let errors = check(indoc! {"
            class A { };
            class B inherits A { };
            class C inherits A { };
            class Main {
                pick(flag : Bool) : A { if flag then new B else new C fi };
                arm(o : Object) : A {
                    case o of b : B => b; c : C => c; esac
                };
                bad(flag : Bool) : B { if flag then new B else new C fi };
            };
        "});
        assert_eq!(errors, vec!["Cannot convert \"A\" into \"B\"."]);
    }

    #[test]
    fn dispatch_errors() {
        let errors = check(indoc! {"
            class A { f(x : Int) : Int { x }; };
            class B inherits A { };
            class Main {
                a : A;
                b : B;
                main() : Object {
                    {
                        a.g();
                        a.f(1, 2);
                        a@B.f(1);
                        b@A.f(2);
                        b@Missing.f(2);
                    }
                };
            };
        "});
        assert_eq!(
            errors,
            vec![
                "Method \"g\" is not defined in A.",
                "Method f takes 1 arguments but 2 were given.",
                "Type \"A\" is not descendent of \"B\".",
                "Type \"Missing\" is not defined.",
            ]
        );
    }

    #[test]
    fn error_receivers_do_not_cascade() {
        let errors = check(indoc! {"
            class A {
                f() : Object {
                    {
                        missing.foo();
                        (new Nope).bar(1);
                        self@Gone.baz();
                    }
                };
            };
        "});
        assert_eq!(
            errors,
            vec![
                "Variable \"missing\" is not defined in \"f\".",
                "Type \"Nope\" is not defined.",
                "Type \"Gone\" is not defined.",
            ]
        );
    }

    #[test]
    fn placeholder_receiver_still_checks_arguments() {
        let errors = check(indoc! {"
            class A {
                a : AUTO_TYPE;
                f() : Object { a.foo(missing, 1 + true) };
            };
        "});
        assert_eq!(
            errors,
            vec![
                "Variable \"missing\" is not defined in \"f\".",
                "Operation is not defined between \"Int\" and \"Bool\".",
            ]
        );
    }

    #[test]
    fn static_dispatch_keeps_the_receiver_type_for_self_type() {
        let errors = check(indoc! {"
            class A { me() : SELF_TYPE { self }; };
            class B inherits A { only() : Int { 1 }; };
            class Main {
                b : B <- new B;
                f() : Int { b@A.me().only() };
            };
        "});
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn placeholder_types_conform_everywhere() {
        let errors = check(indoc! {r#"
            class A {
                a : AUTO_TYPE;
                f(x : AUTO_TYPE) : AUTO_TYPE { { a <- x + 1; a.whatever(x); "s"; } };
            };
        "#});
        assert!(errors.is_empty(), "{errors:?}");
    }
}
