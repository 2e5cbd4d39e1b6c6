use crate::language::{
    ast::{AUTO_TYPE, SELF_TYPE},
    errors::SemanticError,
};
use std::{collections::HashMap, fmt};

pub const OBJECT: &str = "Object";
pub const IO: &str = "IO";
pub const INT: &str = "Int";
pub const STRING: &str = "String";
pub const BOOL: &str = "Bool";
pub const ERROR: &str = "<error>";

/// Index of a [`Type`] inside its [`Context`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(usize);

impl TypeId {
    pub const OBJECT: TypeId = TypeId(0);
    pub const IO: TypeId = TypeId(1);
    pub const INT: TypeId = TypeId(2);
    pub const STRING: TypeId = TypeId(3);
    pub const BOOL: TypeId = TypeId(4);
    pub const AUTO: TypeId = TypeId(5);
    pub const SELF_TYPE: TypeId = TypeId(6);
    pub const ERROR: TypeId = TypeId(7);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeKind {
    Builtin,
    /// `Int`, `String` and `Bool`: cannot be inherited from.
    Primitive,
    Auto,
    SelfType,
    Error,
    Class,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub ty: TypeId,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Method {
    pub name: String,
    pub params: Vec<(String, TypeId)>,
    pub return_type: TypeId,
}

impl Method {
    pub fn arity(&self) -> usize {
        self.params.len()
    }

    /// Same parameter types and return type. Parameter names may differ.
    pub fn same_signature(&self, other: &Method) -> bool {
        self.return_type == other.return_type
            && self.params.len() == other.params.len()
            && self
                .params
                .iter()
                .zip(&other.params)
                .all(|((_, a), (_, b))| a == b)
    }
}

#[derive(Clone, Debug)]
pub struct Type {
    pub name: String,
    pub kind: TypeKind,
    pub parent: Option<TypeId>,
    pub attributes: Vec<Attribute>,
    pub methods: Vec<Method>,
}

impl Type {
    fn new(name: &str, kind: TypeKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            parent: None,
            attributes: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn own_attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|attr| attr.name == name)
    }

    pub fn own_method(&self, name: &str) -> Option<&Method> {
        self.methods.iter().find(|method| method.name == name)
    }
}

/// Registry of every type of one compilation, owning the inheritance links.
#[derive(Clone, Debug)]
pub struct Context {
    types: Vec<Type>,
    by_name: HashMap<String, TypeId>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    pub fn new() -> Self {
        let mut ctx = Context {
            types: Vec::new(),
            by_name: HashMap::new(),
        };
        for (name, kind) in [
            (OBJECT, TypeKind::Builtin),
            (IO, TypeKind::Builtin),
            (INT, TypeKind::Primitive),
            (STRING, TypeKind::Primitive),
            (BOOL, TypeKind::Primitive),
            (AUTO_TYPE, TypeKind::Auto),
            (SELF_TYPE, TypeKind::SelfType),
            (ERROR, TypeKind::Error),
        ] {
            ctx.insert(name, kind);
        }
        for id in ctx.ids().skip(1).collect::<Vec<_>>() {
            ctx.types[id.0].parent = Some(TypeId::OBJECT);
        }
        ctx.install_basic_methods();
        ctx
    }

    fn install_basic_methods(&mut self) {
        let basics: [(TypeId, &str, &[(&str, TypeId)], TypeId); 10] = [
            (TypeId::OBJECT, "abort", &[], TypeId::OBJECT),
            (TypeId::OBJECT, "type_name", &[], TypeId::STRING),
            (TypeId::OBJECT, "copy", &[], TypeId::SELF_TYPE),
            (TypeId::IO, "out_string", &[("x", TypeId::STRING)], TypeId::SELF_TYPE),
            (TypeId::IO, "out_int", &[("x", TypeId::INT)], TypeId::SELF_TYPE),
            (TypeId::IO, "in_string", &[], TypeId::STRING),
            (TypeId::IO, "in_int", &[], TypeId::INT),
            (TypeId::STRING, "length", &[], TypeId::INT),
            (TypeId::STRING, "concat", &[("s", TypeId::STRING)], TypeId::STRING),
            (
                TypeId::STRING,
                "substr",
                &[("i", TypeId::INT), ("l", TypeId::INT)],
                TypeId::STRING,
            ),
        ];
        for (owner, name, params, return_type) in basics {
            self.types[owner.0].methods.push(Method {
                name: name.to_string(),
                params: params
                    .iter()
                    .map(|(param, ty)| (param.to_string(), *ty))
                    .collect(),
                return_type,
            });
        }
    }

    fn insert(&mut self, name: &str, kind: TypeKind) -> TypeId {
        let id = TypeId(self.types.len());
        self.types.push(Type::new(name, kind));
        self.by_name.insert(name.to_string(), id);
        id
    }

    pub fn create_type(&mut self, name: &str) -> Result<TypeId, SemanticError> {
        if self.by_name.contains_key(name) {
            return Err(SemanticError::DuplicateClass(name.to_string()));
        }
        let id = self.insert(name, TypeKind::Class);
        self.types[id.0].parent = Some(TypeId::OBJECT);
        Ok(id)
    }

    pub fn get_type(&self, name: &str) -> Result<TypeId, SemanticError> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| SemanticError::UnknownType(name.to_string()))
    }

    /// Installs `parent` as the parent of `ty`. On error the link is left
    /// untouched.
    pub fn set_parent(&mut self, ty: TypeId, parent: TypeId) -> Result<(), SemanticError> {
        if matches!(
            self.types[parent.0].kind,
            TypeKind::Primitive | TypeKind::Auto | TypeKind::SelfType
        ) {
            return Err(SemanticError::IllegalParent {
                class: self.name(ty).to_string(),
                parent: self.name(parent).to_string(),
            });
        }
        if self.ancestors(parent).any(|ancestor| ancestor == ty) {
            return Err(SemanticError::CyclicInheritance(self.name(ty).to_string()));
        }
        self.types[ty.0].parent = Some(parent);
        Ok(())
    }

    pub fn type_(&self, id: TypeId) -> &Type {
        &self.types[id.0]
    }

    pub fn type_mut(&mut self, id: TypeId) -> &mut Type {
        &mut self.types[id.0]
    }

    pub fn name(&self, id: TypeId) -> &str {
        &self.types[id.0].name
    }

    pub fn parent(&self, id: TypeId) -> Option<TypeId> {
        self.types[id.0].parent
    }

    pub fn ids(&self) -> impl Iterator<Item = TypeId> {
        (0..self.types.len()).map(TypeId)
    }

    /// `id` followed by each ancestor up to the root.
    pub fn ancestors(&self, id: TypeId) -> Ancestors<'_> {
        Ancestors {
            ctx: self,
            next: Some(id),
            steps: 0,
        }
    }

    pub fn is_wildcard(&self, id: TypeId) -> bool {
        id == TypeId::ERROR || id == TypeId::AUTO
    }

    /// The concrete types inference may choose from, in registration order.
    pub fn universe(&self) -> Vec<TypeId> {
        self.ids()
            .filter(|id| {
                !matches!(
                    self.types[id.0].kind,
                    TypeKind::Auto | TypeKind::SelfType | TypeKind::Error
                )
            })
            .collect()
    }

    /// Replaces the dynamic-self marker by `current`.
    pub fn resolve_self(&self, ty: TypeId, current: TypeId) -> TypeId {
        if ty == TypeId::SELF_TYPE {
            current
        } else {
            ty
        }
    }

    pub fn conforms_to(&self, a: TypeId, b: TypeId) -> bool {
        if a == b || self.is_wildcard(a) || self.is_wildcard(b) {
            return true;
        }
        self.ancestors(a).any(|ancestor| ancestor == b)
    }

    pub fn least_upper_bound(&self, a: TypeId, b: TypeId) -> TypeId {
        match (self.is_wildcard(a), self.is_wildcard(b)) {
            (true, true) => {
                return if a == TypeId::ERROR || b == TypeId::ERROR {
                    TypeId::ERROR
                } else {
                    TypeId::AUTO
                };
            }
            (true, false) => return b,
            (false, true) => return a,
            (false, false) => {}
        }
        if a == TypeId::OBJECT || b == TypeId::OBJECT {
            return TypeId::OBJECT;
        }
        let climb = |from: TypeId, other: TypeId| {
            self.ancestors(from)
                .take_while(|ancestor| *ancestor != TypeId::OBJECT)
                .find(|ancestor| self.conforms_to(other, *ancestor))
        };
        climb(a, b)
            .or_else(|| climb(b, a))
            .unwrap_or(TypeId::OBJECT)
    }

    /// Finds `name` on `ty` or the closest ancestor declaring it.
    pub fn get_attribute(&self, ty: TypeId, name: &str) -> Option<(TypeId, &Attribute)> {
        self.ancestors(ty)
            .find_map(|owner| self.types[owner.0].own_attribute(name).map(|attr| (owner, attr)))
    }

    pub fn get_method(&self, ty: TypeId, name: &str) -> Option<(TypeId, &Method)> {
        self.ancestors(ty)
            .find_map(|owner| self.types[owner.0].own_method(name).map(|m| (owner, m)))
    }

    /// Inherited attributes first (root side), then the type's own.
    pub fn all_attributes(&self, ty: TypeId) -> Vec<&Attribute> {
        let mut chain: Vec<TypeId> = self.ancestors(ty).collect();
        chain.reverse();
        chain
            .into_iter()
            .flat_map(|owner| self.types[owner.0].attributes.iter())
            .collect()
    }

    pub fn define_attribute(&mut self, ty: TypeId, name: &str, attr_ty: TypeId) {
        self.types[ty.0].attributes.push(Attribute {
            name: name.to_string(),
            ty: attr_ty,
        });
    }

    pub fn define_method(&mut self, ty: TypeId, method: Method) {
        self.types[ty.0].methods.push(method);
    }

    pub fn display(&self, id: TypeId) -> DisplayType<'_> {
        DisplayType { ctx: self, id }
    }
}

pub struct Ancestors<'a> {
    ctx: &'a Context,
    next: Option<TypeId>,
    steps: usize,
}

impl Iterator for Ancestors<'_> {
    type Item = TypeId;

    fn next(&mut self) -> Option<TypeId> {
        let current = self.next?;
        self.steps += 1;
        self.next = if self.steps > self.ctx.types.len() {
            None
        } else {
            self.ctx.types[current.0].parent
        };
        Some(current)
    }
}

pub struct DisplayType<'a> {
    ctx: &'a Context,
    id: TypeId,
}

impl fmt::Display for DisplayType<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ctx.name(self.id))
    }
}
