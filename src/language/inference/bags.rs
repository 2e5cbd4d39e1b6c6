use crate::language::{
    ast::NodeId,
    span::Span,
    types::{Context, TypeId},
};
use indexmap::{IndexMap, IndexSet};
use std::{collections::HashMap, fmt};

pub type TypeSet = IndexSet<TypeId>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BagId(usize);

/// What a bag entry stands for inside its node.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Slot {
    Var(String),
    /// Return type of the named method of the node's class.
    Return(String),
}

impl Slot {
    pub fn var(name: &str) -> Self {
        Slot::Var(name.to_string())
    }

    pub fn name(&self) -> &str {
        match self {
            Slot::Var(name) | Slot::Return(name) => name,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Var(name) => f.write_str(name),
            Slot::Return(name) => write!(f, "{name}()"),
        }
    }
}

/// Types an expression may still have, plus whether they come from an
/// entry that already gave up narrowing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Candidates {
    pub types: TypeSet,
    pub ambiguous: bool,
}

impl Candidates {
    pub fn single(ty: TypeId) -> Self {
        Self::of(std::iter::once(ty).collect())
    }

    pub fn of(types: TypeSet) -> Self {
        Self {
            types,
            ambiguous: false,
        }
    }

    pub fn union(mut self, other: &Candidates) -> Self {
        self.types.extend(other.types.iter().copied());
        self.ambiguous |= other.ambiguous;
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BagEntry {
    pub candidates: TypeSet,
    pub locked: bool,
    pub ambiguous: bool,
    /// Declaration the entry was seeded from.
    pub span: Span,
}

impl BagEntry {
    pub fn locked(ty: TypeId) -> Self {
        Self {
            candidates: std::iter::once(ty).collect(),
            locked: true,
            ambiguous: false,
            span: Span::default(),
        }
    }

    pub fn open(universe: &[TypeId]) -> Self {
        Self {
            candidates: universe.iter().copied().collect(),
            locked: false,
            ambiguous: false,
            span: Span::default(),
        }
    }

    pub fn at(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn snapshot(&self) -> Candidates {
        Candidates {
            types: self.candidates.clone(),
            ambiguous: self.ambiguous,
        }
    }

    /// Narrows the entry by `incoming`. An empty intersection widens to the
    /// union instead and marks the entry ambiguous; from then on the entry
    /// only grows. Returns whether anything changed.
    pub fn reduce(&mut self, incoming: &Candidates) -> bool {
        if self.locked {
            return false;
        }
        let before = (self.candidates.clone(), self.ambiguous);
        let intersection: TypeSet = self
            .candidates
            .iter()
            .filter(|ty| incoming.types.contains(*ty))
            .copied()
            .collect();

        if intersection.is_empty() {
            self.candidates.extend(incoming.types.iter().copied());
            self.ambiguous = true;
        } else if self.ambiguous {
            self.candidates.extend(incoming.types.iter().copied());
        } else if incoming.ambiguous {
            self.candidates = incoming.types.clone();
            self.ambiguous = true;
        } else {
            self.candidates = intersection;
        }
        before != (self.candidates.clone(), self.ambiguous)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BagKind {
    Class(String),
    Method(String),
    Let,
    Case,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BagNode {
    pub kind: BagKind,
    pub class: TypeId,
    pub parent: Option<BagId>,
    pub children: Vec<BagId>,
    pub entries: IndexMap<Slot, BagEntry>,
}

/// Candidate-type environments shaped like the program's scopes and keyed
/// by the [`NodeId`] of the construct that opens each one.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BagTree {
    nodes: Vec<BagNode>,
    roots: Vec<BagId>,
    by_node: HashMap<NodeId, BagId>,
    class_nodes: HashMap<TypeId, BagId>,
    method_nodes: HashMap<(TypeId, String), BagId>,
    universe: Vec<TypeId>,
}

impl BagTree {
    pub fn new(universe: Vec<TypeId>) -> Self {
        Self {
            universe,
            ..Self::default()
        }
    }

    pub fn universe(&self) -> &[TypeId] {
        &self.universe
    }

    pub fn everything(&self) -> Candidates {
        Candidates::of(self.universe.iter().copied().collect())
    }

    fn push(&mut self, owner: NodeId, node: BagNode) -> BagId {
        let id = BagId(self.nodes.len());
        match node.parent {
            Some(parent) => self.nodes[parent.0].children.push(id),
            None => self.roots.push(id),
        }
        self.nodes.push(node);
        self.by_node.insert(owner, id);
        id
    }

    pub fn add_class(&mut self, owner: NodeId, class: TypeId, name: &str) -> BagId {
        let id = self.push(
            owner,
            BagNode {
                kind: BagKind::Class(name.to_string()),
                class,
                parent: None,
                children: Vec::new(),
                entries: IndexMap::new(),
            },
        );
        self.class_nodes.insert(class, id);
        id
    }

    pub fn add_child(&mut self, parent: BagId, owner: NodeId, kind: BagKind) -> BagId {
        let class = self.nodes[parent.0].class;
        let method = match &kind {
            BagKind::Method(name) => Some(name.clone()),
            _ => None,
        };
        let id = self.push(
            owner,
            BagNode {
                kind,
                class,
                parent: Some(parent),
                children: Vec::new(),
                entries: IndexMap::new(),
            },
        );
        if let Some(method) = method {
            self.method_nodes.insert((class, method), id);
        }
        id
    }

    /// Adds `entry` unless the node already has this slot.
    pub fn define(&mut self, bag: BagId, slot: Slot, entry: BagEntry) {
        self.nodes[bag.0].entries.entry(slot).or_insert(entry);
    }

    pub fn node(&self, id: BagId) -> &BagNode {
        &self.nodes[id.0]
    }

    pub fn for_node(&self, owner: NodeId) -> Option<BagId> {
        self.by_node.get(&owner).copied()
    }

    pub fn class_node(&self, class: TypeId) -> Option<BagId> {
        self.class_nodes.get(&class).copied()
    }

    pub fn method_node(&self, class: TypeId, method: &str) -> Option<BagId> {
        self.method_nodes.get(&(class, method.to_string())).copied()
    }

    /// Finds the node holding `slot` as seen from `from`: enclosing scopes
    /// first, then the nodes of the ancestor classes.
    pub fn resolve(&self, ctx: &Context, from: BagId, slot: &Slot) -> Option<BagId> {
        let mut id = from;
        loop {
            let node = &self.nodes[id.0];
            if node.entries.contains_key(slot) {
                return Some(id);
            }
            match node.parent {
                Some(parent) => id = parent,
                None => break,
            }
        }
        ctx.ancestors(self.nodes[id.0].class)
            .skip(1)
            .filter_map(|ancestor| self.class_node(ancestor))
            .find(|id| self.nodes[id.0].entries.contains_key(slot))
    }

    pub fn get(&self, ctx: &Context, from: BagId, slot: &Slot) -> Option<&BagEntry> {
        let id = self.resolve(ctx, from, slot)?;
        self.nodes[id.0].entries.get(slot)
    }

    pub fn get_mut(&mut self, ctx: &Context, from: BagId, slot: &Slot) -> Option<&mut BagEntry> {
        let id = self.resolve(ctx, from, slot)?;
        self.nodes[id.0].entries.get_mut(slot)
    }

    /// Every node, parents before children, classes in declaration order.
    pub fn preorder(&self) -> Vec<BagId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<BagId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.nodes[id.0].children.iter().rev().copied());
        }
        order
    }

    pub fn unlocked_entries(&self) -> usize {
        self.nodes
            .iter()
            .flat_map(|node| node.entries.values())
            .filter(|entry| !entry.locked)
            .count()
    }

    pub fn render(&self, ctx: &Context) -> String {
        let mut out = String::new();
        for id in self.preorder() {
            let node = &self.nodes[id.0];
            let depth = self.depth(id);
            let indent = "  ".repeat(depth);
            let header = match &node.kind {
                BagKind::Class(name) => format!("class {name}"),
                BagKind::Method(name) => format!("method {name}"),
                BagKind::Let => "let".to_string(),
                BagKind::Case => "case".to_string(),
            };
            out.push_str(&format!("{indent}{header}\n"));
            for (slot, entry) in &node.entries {
                let names: Vec<&str> = entry.candidates.iter().map(|ty| ctx.name(*ty)).collect();
                let flag = if entry.locked {
                    " (locked)"
                } else if entry.ambiguous {
                    " (ambiguous)"
                } else {
                    ""
                };
                out.push_str(&format!(
                    "{indent}  {slot}: {{{}}}{flag}\n",
                    names.join(", ")
                ));
            }
        }
        out
    }

    fn depth(&self, id: BagId) -> usize {
        let mut depth = 0;
        let mut current = self.nodes[id.0].parent;
        while let Some(parent) = current {
            depth += 1;
            current = self.nodes[parent.0].parent;
        }
        depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(types: &[TypeId]) -> Candidates {
        Candidates::of(types.iter().copied().collect())
    }

    #[test]
    fn reduce_intersects_until_impossible() {
        let mut entry = BagEntry::open(&[TypeId::INT, TypeId::STRING, TypeId::BOOL]);
        assert!(entry.reduce(&set(&[TypeId::INT, TypeId::BOOL])));
        assert_eq!(entry.candidates.len(), 2);
        assert!(!entry.reduce(&set(&[TypeId::INT, TypeId::BOOL])));

        assert!(entry.reduce(&set(&[TypeId::STRING])));
        assert!(entry.ambiguous);
        assert_eq!(entry.candidates.len(), 3);

        // Ambiguous entries keep growing instead of narrowing again.
        assert!(!entry.reduce(&set(&[TypeId::INT])));
        assert!(entry.reduce(&set(&[TypeId::OBJECT])));
        assert_eq!(entry.candidates.len(), 4);
    }

    #[test]
    fn ambiguity_spreads_from_incoming_sets() {
        let mut entry = BagEntry::open(&[TypeId::INT, TypeId::STRING, TypeId::BOOL]);
        let mut incoming = set(&[TypeId::INT, TypeId::OBJECT]);
        incoming.ambiguous = true;
        assert!(entry.reduce(&incoming));
        assert!(entry.ambiguous);
        assert_eq!(
            entry.candidates,
            [TypeId::INT, TypeId::OBJECT].into_iter().collect::<TypeSet>()
        );
    }

    #[test]
    fn locked_entries_never_change() {
        let mut entry = BagEntry::locked(TypeId::INT);
        assert!(!entry.reduce(&set(&[TypeId::STRING])));
        assert!(!entry.reduce(&set(&[TypeId::INT, TypeId::BOOL])));
        assert_eq!(entry, BagEntry::locked(TypeId::INT));
    }

    #[test]
    fn resolve_walks_scopes_then_ancestor_classes() {
        let mut ctx = Context::new();
        let a = ctx.create_type("A").expect("A");
        let b = ctx.create_type("B").expect("B");
        ctx.set_parent(b, a).expect("B inherits A");

        let mut tree = BagTree::new(ctx.universe());
        let a_bag = tree.add_class(NodeId(0), a, "A");
        let b_bag = tree.add_class(NodeId(1), b, "B");
        tree.define(a_bag, Slot::var("x"), BagEntry::locked(TypeId::INT));
        tree.define(b_bag, Slot::var("self"), BagEntry::locked(b));
        let method = tree.add_child(b_bag, NodeId(2), BagKind::Method("f".into()));
        let inner = tree.add_child(method, NodeId(3), BagKind::Let);
        tree.define(inner, Slot::var("x"), BagEntry::locked(TypeId::STRING));

        assert_eq!(tree.resolve(&ctx, inner, &Slot::var("x")), Some(inner));
        assert_eq!(tree.resolve(&ctx, method, &Slot::var("x")), Some(a_bag));
        assert_eq!(tree.resolve(&ctx, method, &Slot::var("self")), Some(b_bag));
        assert_eq!(tree.resolve(&ctx, method, &Slot::var("y")), None);
        assert_eq!(tree.method_node(b, "f"), Some(method));
        assert_eq!(tree.for_node(NodeId(3)), Some(inner));
        assert_eq!(tree.preorder(), vec![a_bag, b_bag, method, inner]);
    }

    #[test]
    fn render_lists_entries_by_scope() {
        let ctx = Context::new();
        let mut tree = BagTree::new(ctx.universe());
        let io = tree.add_class(NodeId(0), TypeId::IO, "Main");
        tree.define(io, Slot::Return("main".into()), BagEntry::locked(TypeId::INT));
        let method = tree.add_child(io, NodeId(1), BagKind::Method("main".into()));
        let mut entry = BagEntry::open(&[TypeId::INT, TypeId::BOOL]);
        entry.ambiguous = true;
        tree.define(method, Slot::var("x"), entry);
        assert_eq!(
            tree.render(&ctx),
            "class Main\n  main(): {Int} (locked)\n  method main\n    x: {Int, Bool} (ambiguous)\n"
        );
    }
}
