use super::bags::{BagEntry, BagId, BagTree, Slot};
use crate::language::{
    ast::*,
    span::Span,
    types::{Context, TypeId},
};
use std::fmt;

/// An entry that inference could not narrow to a single type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ambiguity {
    pub name: String,
    pub candidates: Vec<String>,
    pub span: Span,
}

impl fmt::Display for Ambiguity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: [{}]", self.name, self.candidates.join(", "))
    }
}

/// Unlocked entries still holding more than one candidate, in scope order.
pub fn ambiguity_report(tree: &BagTree, ctx: &Context) -> Vec<Ambiguity> {
    tree.preorder()
        .into_iter()
        .flat_map(|id| tree.node(id).entries.iter())
        .filter(|(_, entry)| !entry.locked && entry.candidates.len() > 1)
        .map(|(slot, entry)| {
            let mut candidates: Vec<String> = entry
                .candidates
                .iter()
                .map(|ty| ctx.name(*ty).to_string())
                .collect();
            candidates.sort();
            Ambiguity {
                name: slot.name().to_string(),
                candidates,
                span: entry.span,
            }
        })
        .collect()
}

/// Joins the surviving candidates in insertion order.
pub fn resolve_entry(entry: &BagEntry, ctx: &Context) -> TypeId {
    let mut types = entry.candidates.iter().copied();
    let Some(first) = types.next() else {
        return TypeId::OBJECT;
    };
    types.fold(first, |acc, ty| ctx.least_upper_bound(acc, ty))
}

/// Writes the resolved type of every placeholder slot back into `program`.
/// Returns how many slots were rewritten.
pub fn replace(program: &mut Program, tree: &BagTree, ctx: &Context) -> usize {
    let mut replacer = Replacer {
        tree,
        ctx,
        replaced: 0,
    };
    for class in &mut program.classes {
        let Some(class_bag) = tree.for_node(class.id) else {
            continue;
        };
        for feature in &mut class.features {
            match feature {
                Feature::Attribute(attr) => {
                    replacer.rewrite(&mut attr.ty, class_bag, &Slot::var(&attr.name));
                    if let Some(init) = &mut attr.init {
                        replacer.rewrite_expr(init);
                    }
                }
                Feature::Method(method) => {
                    let slot = Slot::Return(method.name.clone());
                    replacer.rewrite(&mut method.return_type, class_bag, &slot);
                    if let Some(method_bag) = tree.for_node(method.id) {
                        for param in &mut method.params {
                            replacer.rewrite(&mut param.ty, method_bag, &Slot::var(&param.name));
                        }
                    }
                    replacer.rewrite_expr(&mut method.body);
                }
            }
        }
    }
    replacer.replaced
}

struct Replacer<'a> {
    tree: &'a BagTree,
    ctx: &'a Context,
    replaced: usize,
}

impl Replacer<'_> {
    fn rewrite(&mut self, declared: &mut String, bag: BagId, slot: &Slot) {
        if declared != AUTO_TYPE {
            return;
        }
        let Some(entry) = self.tree.node(bag).entries.get(slot) else {
            return;
        };
        let resolved = resolve_entry(entry, self.ctx);
        *declared = self.ctx.name(resolved).to_string();
        self.replaced += 1;
    }

    fn rewrite_expr(&mut self, expr: &mut Expr) {
        match &mut expr.kind {
            ExprKind::Let { bindings, .. } => {
                for binding in bindings {
                    if let Some(bag) = self.tree.for_node(binding.id) {
                        let slot = Slot::var(&binding.name);
                        self.rewrite(&mut binding.ty, bag, &slot);
                    }
                }
            }
            ExprKind::Case { arms, .. } => {
                for arm in arms {
                    if let Some(bag) = self.tree.for_node(arm.id) {
                        let slot = Slot::var(&arm.name);
                        self.rewrite(&mut arm.ty, bag, &slot);
                    }
                }
            }
            _ => {}
        }
        for child in expr.children_mut() {
            self.rewrite_expr(child);
        }
    }
}
