use alloc::boxed::Box;
use core::fmt;

/// The `(module, field)` pair a Wasm import or a host registration is keyed
/// by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImportName {
    module: Box<str>,
    field: Box<str>,
}

impl ImportName {
    pub fn new(module: &str, field: &str) -> Self {
        Self {
            module: module.into(),
            field: field.into(),
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn field(&self) -> &str {
        &self.field
    }
}

impl fmt::Display for ImportName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.module, self.field)
    }
}
