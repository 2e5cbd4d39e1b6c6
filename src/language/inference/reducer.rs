use super::bags::{BagId, BagTree, Candidates, Slot, TypeSet};
use crate::language::{
    ast::*,
    errors::{Diagnostics, InferenceError, SemanticError},
    typecheck::ClassTable,
    types::{Context, Method, TypeId},
};
use tracing::{debug, trace};

#[derive(Clone, Debug)]
pub struct Reduction {
    pub sweeps: usize,
    /// Diagnostics of the converged sweep only.
    pub diagnostics: Diagnostics,
}

/// Sweeps needed in the worst case. Before an entry turns ambiguous it can
/// only shrink, the flag flips once, and afterwards it can only grow.
pub fn sweep_bound(tree: &BagTree) -> usize {
    1 + tree.unlocked_entries() * (2 * tree.universe().len() + 1)
}

/// Re-walks the program until a sweep leaves `tree` unchanged.
pub fn reduce(
    program: &Program,
    table: &ClassTable,
    tree: &mut BagTree,
    max_sweeps: Option<usize>,
) -> Result<Reduction, InferenceError> {
    let bound = max_sweeps.unwrap_or_else(|| sweep_bound(tree));
    debug!(bound, "reducing bags");

    for sweep in 1..=bound {
        let before = tree.clone();
        let mut diagnostics = Diagnostics::new();
        let mut walker = Sweep {
            ctx: &table.context,
            tree: &mut *tree,
            diagnostics: &mut diagnostics,
            class: TypeId::OBJECT,
            changes: 0,
        };
        walker.run(program, table);
        let changes = walker.changes;
        trace!(sweep, changes, "reducer sweep");

        if *tree == before {
            debug!(sweeps = sweep, "inference converged");
            return Ok(Reduction {
                sweeps: sweep,
                diagnostics,
            });
        }
    }

    Err(InferenceError::NotConverged { sweeps: bound })
}

struct Sweep<'a> {
    ctx: &'a Context,
    tree: &'a mut BagTree,
    diagnostics: &'a mut Diagnostics,
    class: TypeId,
    changes: usize,
}

impl Sweep<'_> {
    fn run(&mut self, program: &Program, table: &ClassTable) {
        for (class, id) in table.registered(program) {
            let Some(bag) = self.tree.for_node(class.id) else {
                continue;
            };
            self.class = id;
            for feature in &class.features {
                match feature {
                    Feature::Attribute(attr) => {
                        let Some(init) = &attr.init else {
                            continue;
                        };
                        let slot = Slot::var(&attr.name);
                        let value = self.visit(init, bag, None);
                        self.reduce_slot(bag, &slot, &value);
                        self.restrict_to_slot(init, bag, bag, &slot);
                    }
                    Feature::Method(method) => {
                        let Some(method_bag) = self.tree.for_node(method.id) else {
                            continue;
                        };
                        let slot = Slot::Return(method.name.clone());
                        let value = self.visit(&method.body, method_bag, None);
                        self.reduce_slot(method_bag, &slot, &value);
                        self.restrict_to_slot(&method.body, method_bag, method_bag, &slot);
                    }
                }
            }
        }
    }

    fn snapshot(&self, bag: BagId, slot: &Slot) -> Option<Candidates> {
        self.tree
            .get(self.ctx, bag, slot)
            .map(|entry| entry.snapshot())
    }

    fn reduce_slot(&mut self, bag: BagId, slot: &Slot, incoming: &Candidates) {
        if let Some(entry) = self.tree.get_mut(self.ctx, bag, slot) {
            if entry.reduce(incoming) {
                self.changes += 1;
            }
        }
    }

    /// Narrows the variable `expr` names, if it names one.
    fn narrow(&mut self, expr: &Expr, bag: BagId, incoming: &Candidates) {
        if let Some(name) = expr.variable() {
            self.reduce_slot(bag, &Slot::var(name), incoming);
        }
    }

    /// Drops from the variable `value` names every candidate that no type
    /// in `target` accepts. Entries that already gave up narrowing, and
    /// targets that did, are left alone.
    fn restrict(&mut self, value: &Expr, bag: BagId, target: &Candidates) {
        if target.ambiguous {
            return;
        }
        let Some(name) = value.variable() else {
            return;
        };
        let slot = Slot::var(name);
        let ctx = self.ctx;
        let Some(entry) = self.tree.get(ctx, bag, &slot) else {
            return;
        };
        if entry.locked || entry.ambiguous {
            return;
        }
        let accepted: TypeSet = entry
            .candidates
            .iter()
            .copied()
            .filter(|ty| target.types.iter().any(|to| ctx.conforms_to(*ty, *to)))
            .collect();
        self.reduce_slot(bag, &slot, &Candidates::of(accepted));
    }

    /// Restricts `value`, evaluated in `bag`, to what `slot` (seen from
    /// `slot_bag`) currently holds.
    fn restrict_to_slot(&mut self, value: &Expr, bag: BagId, slot_bag: BagId, slot: &Slot) {
        if let Some(target) = self.snapshot(slot_bag, slot) {
            self.restrict(value, bag, &target);
        }
    }

    fn visit(&mut self, expr: &Expr, bag: BagId, restriction: Option<&Candidates>) -> Candidates {
        let ctx = self.ctx;
        match &expr.kind {
            ExprKind::Integer(_) => Candidates::single(TypeId::INT),
            ExprKind::String(_) => Candidates::single(TypeId::STRING),
            ExprKind::Bool(_) => Candidates::single(TypeId::BOOL),
            ExprKind::Identifier(name) => self
                .snapshot(bag, &Slot::var(name))
                .unwrap_or_else(|| self.tree.everything()),
            ExprKind::New(ty) => match ctx.get_type(ty) {
                Ok(TypeId::SELF_TYPE) => Candidates::single(self.class),
                Ok(TypeId::AUTO) | Err(_) => self.tree.everything(),
                Ok(ty) => Candidates::single(ty),
            },
            ExprKind::Paren(inner) => self.visit(inner, bag, restriction),
            ExprKind::Assign { name, value } => {
                let slot = Slot::var(name);
                let target = self.snapshot(bag, &slot);
                let found = self.visit(value, bag, target.as_ref());
                self.reduce_slot(bag, &slot, &found);
                self.restrict_to_slot(value, bag, bag, &slot);
                self.snapshot(bag, &slot).unwrap_or(found)
            }
            ExprKind::Block(exprs) => {
                let Some((last, init)) = exprs.split_last() else {
                    return Candidates::single(TypeId::OBJECT);
                };
                for expr in init {
                    self.visit(expr, bag, None);
                }
                let result = self.visit(last, bag, restriction);
                if let Some(restriction) = restriction {
                    self.narrow(last, bag, restriction);
                }
                result
            }
            ExprKind::Binary { op, left, right } => {
                if op.is_arithmetic() {
                    let int = Candidates::single(TypeId::INT);
                    self.visit(left, bag, Some(&int));
                    self.visit(right, bag, Some(&int));
                    self.narrow(left, bag, &int);
                    self.narrow(right, bag, &int);
                    int
                } else {
                    self.visit(left, bag, None);
                    self.visit(right, bag, None);
                    Candidates::single(TypeId::BOOL)
                }
            }
            ExprKind::Unary { op, expr: inner } => match op {
                UnaryOp::Not => {
                    self.condition(inner, bag);
                    Candidates::single(TypeId::BOOL)
                }
                UnaryOp::Negate => {
                    let int = Candidates::single(TypeId::INT);
                    self.visit(inner, bag, Some(&int));
                    self.narrow(inner, bag, &int);
                    int
                }
                UnaryOp::IsVoid => {
                    self.visit(inner, bag, None);
                    Candidates::single(TypeId::BOOL)
                }
            },
            ExprKind::While { cond, body } => {
                self.condition(cond, bag);
                self.visit(body, bag, None);
                Candidates::single(TypeId::OBJECT)
            }
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                self.condition(cond, bag);
                let then_c = self.visit(then_branch, bag, None);
                let else_c = self.visit(else_branch, bag, None);
                let common: TypeSet = then_c
                    .types
                    .iter()
                    .filter(|ty| else_c.types.contains(*ty))
                    .copied()
                    .collect();
                if common.is_empty() {
                    then_c.union(&else_c)
                } else {
                    Candidates {
                        types: common,
                        ambiguous: then_c.ambiguous || else_c.ambiguous,
                    }
                }
            }
            ExprKind::Let { bindings, body } => {
                let mut scope = bag;
                for binding in bindings {
                    let node = self.tree.for_node(binding.id).unwrap_or(scope);
                    if let Some(init) = &binding.init {
                        let slot = Slot::var(&binding.name);
                        let found = self.visit(init, scope, None);
                        self.reduce_slot(node, &slot, &found);
                        self.restrict_to_slot(init, scope, node, &slot);
                    }
                    scope = node;
                }
                self.visit(body, scope, restriction)
            }
            ExprKind::Case { scrutinee, arms } => {
                self.visit(scrutinee, bag, None);
                arms.iter().fold(Candidates::default(), |acc, arm| {
                    let node = self.tree.for_node(arm.id).unwrap_or(bag);
                    let arm_c = self.visit(&arm.body, node, None);
                    acc.union(&arm_c)
                })
            }
            ExprKind::Dispatch {
                receiver,
                method,
                args,
            } => {
                let receiver_c = match receiver {
                    Some(receiver) => self.visit(receiver, bag, None),
                    None => Candidates::single(self.class),
                };
                let candidates: TypeSet = receiver_c
                    .types
                    .iter()
                    .copied()
                    .filter(|ty| {
                        ctx.get_method(*ty, method)
                            .is_some_and(|(_, m)| m.arity() == args.len())
                    })
                    .collect();

                if candidates.is_empty() {
                    let label = match receiver {
                        Some(receiver) => receiver
                            .variable()
                            .map(str::to_string)
                            .unwrap_or_else(|| self.describe(&receiver_c)),
                        None => SELF_NAME.to_string(),
                    };
                    self.no_candidate(label, method, args, bag, expr);
                    return self.tree.everything();
                }

                if let Some(receiver) = receiver {
                    self.narrow(receiver, bag, &Candidates::of(candidates.clone()));
                }

                let narrow_args = candidates.len() == 1;
                let mut result = Candidates::default();
                for ty in &candidates {
                    let Some((owner, signature)) = ctx.get_method(*ty, method) else {
                        continue;
                    };
                    if narrow_args {
                        self.bind_args(owner, signature, args, bag);
                    }
                    result = result.union(&self.returns(owner, *ty, signature));
                }
                if !narrow_args {
                    for arg in args {
                        self.visit(arg, bag, None);
                    }
                }
                result
            }
            ExprKind::StaticDispatch {
                receiver,
                ancestor,
                method,
                args,
            } => {
                let receiver_c = self.visit(receiver, bag, None);
                let ancestor_ty = ctx.get_type(ancestor).unwrap_or(TypeId::ERROR);
                let found = ctx
                    .get_method(ancestor_ty, method)
                    .filter(|(_, m)| m.arity() == args.len());
                let Some((owner, signature)) = found else {
                    self.no_candidate(ancestor.clone(), method, args, bag, expr);
                    return self.tree.everything();
                };
                self.bind_args(owner, signature, args, bag);
                if signature.return_type == TypeId::SELF_TYPE {
                    return receiver_c;
                }
                self.returns(owner, ancestor_ty, signature)
            }
        }
    }

    fn condition(&mut self, cond: &Expr, bag: BagId) {
        let boolean = Candidates::single(TypeId::BOOL);
        self.visit(cond, bag, Some(&boolean));
        self.narrow(cond, bag, &boolean);
    }

    fn describe(&self, candidates: &Candidates) -> String {
        let names: Vec<&str> = candidates
            .types
            .iter()
            .map(|ty| self.ctx.name(*ty))
            .collect();
        format!("{{{}}}", names.join(", "))
    }

    fn no_candidate(
        &mut self,
        receiver: String,
        method: &str,
        args: &[Expr],
        bag: BagId,
        expr: &Expr,
    ) {
        self.diagnostics.report(
            SemanticError::NoMethodCandidate {
                receiver,
                method: method.to_string(),
                arity: args.len(),
            },
            expr.span,
        );
        for arg in args {
            self.visit(arg, bag, None);
        }
    }

    /// Candidate set of parameter `index` of `signature`, declared on `owner`.
    fn param(&self, owner: TypeId, signature: &Method, index: usize) -> Candidates {
        let (name, declared) = &signature.params[index];
        self.tree
            .method_node(owner, &signature.name)
            .and_then(|method_bag| self.snapshot(method_bag, &Slot::var(name)))
            .unwrap_or_else(|| Candidates::single(*declared))
    }

    /// Feeds each argument into the matching parameter bag and narrows the
    /// argument toward what the parameter accepts.
    fn bind_args(&mut self, owner: TypeId, signature: &Method, args: &[Expr], bag: BagId) {
        let method_bag = self.tree.method_node(owner, &signature.name);
        for (index, arg) in args.iter().enumerate() {
            let param = self.param(owner, signature, index);
            let found = self.visit(arg, bag, Some(&param));
            if let Some(method_bag) = method_bag {
                let slot = Slot::var(&signature.params[index].0);
                self.reduce_slot(method_bag, &slot, &found);
            }
            self.narrow(arg, bag, &param);
        }
    }

    /// Possible results of calling `signature` on a receiver of type
    /// `receiver`, with the dynamic-self marker resolved to it.
    fn returns(&self, owner: TypeId, receiver: TypeId, signature: &Method) -> Candidates {
        if signature.return_type == TypeId::SELF_TYPE {
            return Candidates::single(receiver);
        }
        self.tree
            .class_node(owner)
            .and_then(|class_bag| self.snapshot(class_bag, &Slot::Return(signature.name.clone())))
            .unwrap_or_else(|| Candidates::single(signature.return_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::{inference::collect, parser::parse_program, typecheck::typecheck};
    use indoc::indoc;

    struct Reduced {
        table: ClassTable,
        tree: BagTree,
        reduction: Reduction,
        program: Program,
    }

    impl Reduced {
        fn names(&self, bag: BagId, slot: Slot) -> Vec<String> {
            let ctx = &self.table.context;
            let entry = self.tree.get(ctx, bag, &slot).expect("entry");
            let mut names: Vec<String> = entry
                .candidates
                .iter()
                .map(|ty| ctx.name(*ty).to_string())
                .collect();
            names.sort();
            names
        }

        fn class_bag(&self, index: usize) -> BagId {
            self.tree
                .for_node(self.program.classes[index].id)
                .expect("class bag")
        }

        fn method_bag(&self, class: &str, method: &str) -> BagId {
            let ty = self.table.context.get_type(class).expect("class");
            self.tree.method_node(ty, method).expect("method bag")
        }
    }

    fn reduce_source(source: &str) -> Reduced {
        let program = parse_program(source).expect("parse");
        let mut diagnostics = Diagnostics::new();
        let table = typecheck(&program, &mut diagnostics);
        assert!(diagnostics.is_empty(), "{:?}", diagnostics.errors());
        let mut tree = collect(&program, &table);
        let reduction = reduce(&program, &table, &mut tree, None).expect("converges");
        Reduced {
            table,
            tree,
            reduction,
            program,
        }
    }

    #[test]
    fn arithmetic_pins_operands_to_int() {
        let reduced = reduce_source(indoc! {"
            class A {
                f(a : AUTO_TYPE, b : AUTO_TYPE) : AUTO_TYPE { a + b };
            };
        "});
        let method = reduced.method_bag("A", "f");
        assert_eq!(reduced.names(method, Slot::var("a")), vec!["Int"]);
        assert_eq!(reduced.names(method, Slot::var("b")), vec!["Int"]);
        assert_eq!(
            reduced.names(reduced.class_bag(0), Slot::Return("f".into())),
            vec!["Int"]
        );
        assert!(reduced.reduction.diagnostics.is_empty());
    }

    #[test]
    fn conflicting_uses_widen_instead_of_emptying() {
        let reduced = reduce_source(indoc! {r#"
            class A {
                d : AUTO_TYPE;
                e : AUTO_TYPE;
                f : AUTO_TYPE;
                g() : Object { { d <- e + f; f <- "asd"; d <- true; } };
            };
        "#});
        let class = reduced.class_bag(0);
        assert_eq!(reduced.names(class, Slot::var("e")), vec!["Int"]);
        assert_eq!(reduced.names(class, Slot::var("f")), vec!["Int", "String"]);
        assert_eq!(reduced.names(class, Slot::var("d")), vec!["Bool", "Int"]);
        let entry = reduced
            .tree
            .get(&reduced.table.context, class, &Slot::var("f"))
            .expect("f");
        assert!(entry.ambiguous);
    }

    #[test]
    fn dispatch_keeps_only_receivers_defining_the_method() {
        let reduced = reduce_source(indoc! {"
            class B { met() : Int { 1 }; };
            class C { other() : Int { 2 }; };
            class Main {
                a : AUTO_TYPE;
                main() : Object { { a <- new B; a <- new C; a.met(); } };
            };
        "});
        // The assignments already conflict, so the call cannot narrow `a`.
        assert_eq!(reduced.names(reduced.class_bag(2), Slot::var("a")), vec!["B", "C"]);
    }

    #[test]
    fn single_candidate_receiver_narrows_parameters() {
        let reduced = reduce_source(indoc! {r#"
            class A {
                set(x : AUTO_TYPE) : Object { x };
            };
            class Main {
                a : A <- new A;
                main() : Object { a.set("text") };
            };
        "#});
        let set = reduced.method_bag("A", "set");
        assert_eq!(reduced.names(set, Slot::var("x")), vec!["String"]);
    }

    #[test]
    fn missing_method_is_reported_on_the_final_sweep() {
        let reduced = reduce_source(indoc! {"
            class Main {
                a : AUTO_TYPE;
                b : Int;
                main() : Object { a.init(b) };
            };
        "});
        let errors: Vec<SemanticError> = reduced
            .reduction
            .diagnostics
            .errors()
            .iter()
            .map(|err| err.error.clone())
            .collect();
        assert_eq!(
            errors,
            vec![SemanticError::NoMethodCandidate {
                receiver: "a".into(),
                method: "init".into(),
                arity: 1,
            }]
        );
    }

    #[test]
    fn declared_targets_narrow_bare_placeholders() {
        let reduced = reduce_source(indoc! {"
            class A {
                x : Int;
                a : AUTO_TYPE;
                b : AUTO_TYPE;
                c : Int <- b;
                f() : Object { x <- a };
                g(p : AUTO_TYPE) : String { p };
                h(q : AUTO_TYPE) : Object { let y : Bool <- q in y };
            };
        "});
        let class = reduced.class_bag(0);
        assert_eq!(reduced.names(class, Slot::var("a")), vec!["Int"]);
        assert_eq!(reduced.names(class, Slot::var("b")), vec!["Int"]);
        assert_eq!(
            reduced.names(reduced.method_bag("A", "g"), Slot::var("p")),
            vec!["String"]
        );
        assert_eq!(
            reduced.names(reduced.method_bag("A", "h"), Slot::var("q")),
            vec!["Bool"]
        );
    }

    #[test]
    fn object_targets_accept_every_candidate() {
        let reduced = reduce_source(indoc! {"
            class A {
                o : Object;
                a : AUTO_TYPE;
                f() : Object { o <- a };
            };
        "});
        let a = reduced.names(reduced.class_bag(0), Slot::var("a"));
        assert_eq!(a.len(), reduced.table.context.universe().len());
    }

    #[test]
    fn static_dispatch_binds_the_ancestor_signature() {
        let reduced = reduce_source(indoc! {r#"
            class A {
                m(x : AUTO_TYPE) : Int { 1 };
                me() : SELF_TYPE { self };
            };
            class B inherits A { };
            class Main {
                b : B <- new B;
                main() : Object { b@A.m("s") };
                same() : AUTO_TYPE { b@A.me() };
            };
        "#});
        assert_eq!(
            reduced.names(reduced.method_bag("A", "m"), Slot::var("x")),
            vec!["String"]
        );
        assert_eq!(
            reduced.names(reduced.class_bag(2), Slot::Return("same".into())),
            vec!["B"]
        );
        assert!(reduced.reduction.diagnostics.is_empty());
    }

    #[test]
    fn static_dispatch_to_an_ancestor_without_the_method() {
        let program = parse_program(indoc! {"
            class A { };
            class B inherits A { };
            class Main {
                b : B;
                p : AUTO_TYPE;
                main() : Object { b@A.zap(p) };
            };
        "})
        .expect("parse");
        let mut diagnostics = Diagnostics::new();
        let table = typecheck(&program, &mut diagnostics);
        let mut tree = collect(&program, &table);
        let reduction = reduce(&program, &table, &mut tree, None).expect("converges");
        let errors: Vec<SemanticError> = reduction
            .diagnostics
            .errors()
            .iter()
            .map(|err| err.error.clone())
            .collect();
        assert_eq!(
            errors,
            vec![SemanticError::NoMethodCandidate {
                receiver: "A".into(),
                method: "zap".into(),
                arity: 1,
            }]
        );
    }

    #[test]
    fn converged_tree_is_a_fixpoint() {
        let mut reduced = reduce_source(indoc! {r#"
            class A {
                x : AUTO_TYPE;
                y : AUTO_TYPE;
                f(p : AUTO_TYPE) : AUTO_TYPE {
                    {
                        x <- p;
                        y <- if x then 1 else p fi;
                        let z : AUTO_TYPE <- y in z * 2;
                    }
                };
            };
        "#});
        let snapshot = reduced.tree.clone();
        let again = reduce(
            &reduced.program,
            &reduced.table,
            &mut reduced.tree,
            None,
        )
        .expect("converges");
        assert_eq!(again.sweeps, 1);
        assert_eq!(reduced.tree, snapshot);
    }

    #[test]
    fn exceeding_the_sweep_bound_is_fatal() {
        let program = parse_program(indoc! {"
            class A { f(a : AUTO_TYPE) : AUTO_TYPE { a + 1 }; };
        "})
        .expect("parse");
        let mut diagnostics = Diagnostics::new();
        let table = typecheck(&program, &mut diagnostics);
        let mut tree = collect(&program, &table);
        assert_eq!(
            reduce(&program, &table, &mut tree, Some(1)).map(|r| r.sweeps),
            Err(InferenceError::NotConverged { sweeps: 1 })
        );
    }
}
