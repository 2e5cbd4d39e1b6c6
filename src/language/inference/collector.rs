use super::bags::{BagEntry, BagId, BagKind, BagTree, Slot};
use crate::language::{
    ast::*,
    span::Span,
    typecheck::ClassTable,
    types::{Context, TypeId},
};
use tracing::debug;

/// Seeds one bag node per class, method, `let` binding and `case` arm.
/// Placeholder slots start with every concrete type; everything else is a
/// locked singleton.
pub fn collect(program: &Program, table: &ClassTable) -> BagTree {
    let mut collector = Collector {
        ctx: &table.context,
        tree: BagTree::new(table.context.universe()),
        class: TypeId::OBJECT,
    };
    for (class, id) in table.registered(program) {
        collector.collect_class(class, id);
    }
    debug!(
        unlocked = collector.tree.unlocked_entries(),
        universe = collector.tree.universe().len(),
        "collected bags"
    );
    collector.tree
}

struct Collector<'a> {
    ctx: &'a Context,
    tree: BagTree,
    class: TypeId,
}

impl Collector<'_> {
    fn seed(&self, declared: &str, span: Span) -> BagEntry {
        let entry = match self.ctx.get_type(declared) {
            Ok(TypeId::AUTO) => BagEntry::open(self.tree.universe()),
            Ok(ty) => BagEntry::locked(self.ctx.resolve_self(ty, self.class)),
            Err(_) => BagEntry::locked(TypeId::ERROR),
        };
        entry.at(span)
    }

    fn collect_class(&mut self, class: &Class, id: TypeId) {
        self.class = id;
        let bag = self.tree.add_class(class.id, id, &class.name);
        self.tree
            .define(bag, Slot::var(SELF_NAME), BagEntry::locked(id).at(class.span));
        for attr in class.attributes() {
            let entry = self.seed(&attr.ty, attr.span);
            self.tree.define(bag, Slot::var(&attr.name), entry);
        }
        for method in class.methods() {
            let entry = self.seed(&method.return_type, method.span);
            self.tree
                .define(bag, Slot::Return(method.name.clone()), entry);
        }

        for feature in &class.features {
            match feature {
                Feature::Attribute(attr) => {
                    if let Some(init) = &attr.init {
                        self.collect_expr(init, bag);
                    }
                }
                Feature::Method(method) => {
                    let method_bag =
                        self.tree
                            .add_child(bag, method.id, BagKind::Method(method.name.clone()));
                    for param in &method.params {
                        let entry = self.seed(&param.ty, param.span);
                        self.tree.define(method_bag, Slot::var(&param.name), entry);
                    }
                    self.collect_expr(&method.body, method_bag);
                }
            }
        }
    }

    fn collect_expr(&mut self, expr: &Expr, bag: BagId) {
        match &expr.kind {
            ExprKind::Let { bindings, body } => {
                let mut scope = bag;
                for binding in bindings {
                    if let Some(init) = &binding.init {
                        self.collect_expr(init, scope);
                    }
                    let node = self.tree.add_child(scope, binding.id, BagKind::Let);
                    let entry = self.seed(&binding.ty, binding.span);
                    self.tree.define(node, Slot::var(&binding.name), entry);
                    scope = node;
                }
                self.collect_expr(body, scope);
            }
            ExprKind::Case { scrutinee, arms } => {
                self.collect_expr(scrutinee, bag);
                for arm in arms {
                    let node = self.tree.add_child(bag, arm.id, BagKind::Case);
                    let entry = self.seed(&arm.ty, arm.span);
                    self.tree.define(node, Slot::var(&arm.name), entry);
                    self.collect_expr(&arm.body, node);
                }
            }
            _ => {
                for child in expr.children() {
                    self.collect_expr(child, bag);
                }
            }
        }
    }
}
