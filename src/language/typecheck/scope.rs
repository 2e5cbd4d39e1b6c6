use crate::language::types::TypeId;
use std::collections::HashMap;

/// Lexical variable environment. Each frame is one class body, method,
/// `let` or `case` arm; lookups prefer the innermost definition.
#[derive(Clone, Debug, Default)]
pub struct Scope {
    frames: Vec<HashMap<String, TypeId>>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self) {
        self.frames.push(HashMap::new());
    }

    pub fn pop(&mut self) {
        self.frames.pop();
    }

    pub fn declare(&mut self, name: &str, ty: TypeId) {
        if self.frames.is_empty() {
            self.push();
        }
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name.to_string(), ty);
        }
    }

    pub fn lookup(&self, name: &str) -> Option<TypeId> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.get(name).copied())
    }
}
