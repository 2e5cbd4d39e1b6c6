use crate::language::span::Span;

/// Declared-type marker asking the inference engine to pick the type.
pub const AUTO_TYPE: &str = "AUTO_TYPE";
/// Declared-type marker for the runtime class of the receiver.
pub const SELF_TYPE: &str = "SELF_TYPE";
pub const SELF_NAME: &str = "self";

/// Stable id handed out by the parser to every node that opens a scope
/// (class, method, let binding, case arm).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

#[derive(Clone, Debug, PartialEq)]
pub struct Program {
    pub classes: Vec<Class>,
}

impl Program {
    /// True when any declared slot still carries the placeholder type.
    pub fn has_placeholders(&self) -> bool {
        self.classes.iter().any(|class| {
            class.features.iter().any(|feature| match feature {
                Feature::Attribute(attr) => {
                    attr.ty == AUTO_TYPE || attr.init.as_ref().is_some_and(expr_has_placeholders)
                }
                Feature::Method(method) => {
                    method.return_type == AUTO_TYPE
                        || method.params.iter().any(|param| param.ty == AUTO_TYPE)
                        || expr_has_placeholders(&method.body)
                }
            })
        })
    }
}

fn expr_has_placeholders(expr: &Expr) -> bool {
    let mut found = false;
    expr.walk(&mut |expr| match &expr.kind {
        ExprKind::Let { bindings, .. } => {
            found |= bindings.iter().any(|binding| binding.ty == AUTO_TYPE);
        }
        ExprKind::Case { arms, .. } => {
            found |= arms.iter().any(|arm| arm.ty == AUTO_TYPE);
        }
        _ => {}
    });
    found
}

#[derive(Clone, Debug, PartialEq)]
pub struct Class {
    pub id: NodeId,
    pub name: String,
    pub parent: Option<String>,
    pub features: Vec<Feature>,
    pub span: Span,
}

impl Class {
    pub fn attributes(&self) -> impl Iterator<Item = &AttrDecl> {
        self.features.iter().filter_map(|feature| match feature {
            Feature::Attribute(attr) => Some(attr),
            Feature::Method(_) => None,
        })
    }

    pub fn methods(&self) -> impl Iterator<Item = &MethodDecl> {
        self.features.iter().filter_map(|feature| match feature {
            Feature::Method(method) => Some(method),
            Feature::Attribute(_) => None,
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Feature {
    Attribute(AttrDecl),
    Method(MethodDecl),
}

#[derive(Clone, Debug, PartialEq)]
pub struct AttrDecl {
    pub name: String,
    pub ty: String,
    pub init: Option<Expr>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MethodDecl {
    pub id: NodeId,
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: String,
    pub body: Expr,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: String,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LetBinding {
    pub id: NodeId,
    pub name: String,
    pub ty: String,
    pub init: Option<Expr>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CaseArm {
    pub id: NodeId,
    pub name: String,
    pub ty: String,
    pub body: Expr,
    pub span: Span,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    LtEq,
    Eq,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Eq => "=",
        }
    }

    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Negate,
    IsVoid,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    Assign {
        name: String,
        value: Box<Expr>,
    },
    /// `receiver: None` is an implicit dispatch on `self`.
    Dispatch {
        receiver: Option<Box<Expr>>,
        method: String,
        args: Vec<Expr>,
    },
    StaticDispatch {
        receiver: Box<Expr>,
        ancestor: String,
        method: String,
        args: Vec<Expr>,
    },
    If {
        cond: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    While {
        cond: Box<Expr>,
        body: Box<Expr>,
    },
    Let {
        bindings: Vec<LetBinding>,
        body: Box<Expr>,
    },
    Case {
        scrutinee: Box<Expr>,
        arms: Vec<CaseArm>,
    },
    Block(Vec<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    New(String),
    Paren(Box<Expr>),
    Identifier(String),
    Integer(i64),
    String(String),
    Bool(bool),
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Name of the variable this expression denotes directly, if any.
    /// Assignments denote their target.
    pub fn variable(&self) -> Option<&str> {
        match &self.kind {
            ExprKind::Identifier(name) | ExprKind::Assign { name, .. } => Some(name),
            ExprKind::Paren(inner) => inner.variable(),
            _ => None,
        }
    }

    /// Pre-order walk over this expression and every nested one.
    pub fn walk(&self, visit: &mut dyn FnMut(&Expr)) {
        visit(self);
        for child in self.children() {
            child.walk(visit);
        }
    }

    /// Direct subexpressions in evaluation order. `let` initializers come
    /// before the body, `case` arm bodies after the scrutinee.
    pub fn children(&self) -> Vec<&Expr> {
        match &self.kind {
            ExprKind::Assign { value, .. } => vec![&**value],
            ExprKind::Dispatch { receiver, args, .. } => {
                receiver.iter().map(|r| &**r).chain(args).collect()
            }
            ExprKind::StaticDispatch { receiver, args, .. } => {
                std::iter::once(&**receiver).chain(args).collect()
            }
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => vec![&**cond, &**then_branch, &**else_branch],
            ExprKind::While { cond, body } => vec![&**cond, &**body],
            ExprKind::Let { bindings, body } => bindings
                .iter()
                .filter_map(|binding| binding.init.as_ref())
                .chain(std::iter::once(&**body))
                .collect(),
            ExprKind::Case { scrutinee, arms } => std::iter::once(&**scrutinee)
                .chain(arms.iter().map(|arm| &arm.body))
                .collect(),
            ExprKind::Block(exprs) => exprs.iter().collect(),
            ExprKind::Binary { left, right, .. } => vec![&**left, &**right],
            ExprKind::Unary { expr, .. } | ExprKind::Paren(expr) => vec![&**expr],
            ExprKind::New(_)
            | ExprKind::Identifier(_)
            | ExprKind::Integer(_)
            | ExprKind::String(_)
            | ExprKind::Bool(_) => Vec::new(),
        }
    }

    pub fn children_mut(&mut self) -> Vec<&mut Expr> {
        match &mut self.kind {
            ExprKind::Assign { value, .. } => vec![&mut **value],
            ExprKind::Dispatch { receiver, args, .. } => receiver
                .iter_mut()
                .map(|r| &mut **r)
                .chain(args.iter_mut())
                .collect(),
            ExprKind::StaticDispatch { receiver, args, .. } => std::iter::once(&mut **receiver)
                .chain(args.iter_mut())
                .collect(),
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => vec![&mut **cond, &mut **then_branch, &mut **else_branch],
            ExprKind::While { cond, body } => vec![&mut **cond, &mut **body],
            ExprKind::Let { bindings, body } => bindings
                .iter_mut()
                .filter_map(|binding| binding.init.as_mut())
                .chain(std::iter::once(&mut **body))
                .collect(),
            ExprKind::Case { scrutinee, arms } => std::iter::once(&mut **scrutinee)
                .chain(arms.iter_mut().map(|arm| &mut arm.body))
                .collect(),
            ExprKind::Block(exprs) => exprs.iter_mut().collect(),
            ExprKind::Binary { left, right, .. } => vec![&mut **left, &mut **right],
            ExprKind::Unary { expr, .. } | ExprKind::Paren(expr) => vec![&mut **expr],
            ExprKind::New(_)
            | ExprKind::Identifier(_)
            | ExprKind::Integer(_)
            | ExprKind::String(_)
            | ExprKind::Bool(_) => Vec::new(),
        }
    }
}
