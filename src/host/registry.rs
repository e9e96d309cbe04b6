use crate::host::{HostFunction, ImportName};
use alloc::sync::Arc;
use core::ops::{Deref, DerefMut};
use hashbrown::HashMap;

/// The embedder's import resolver: a table of host functions keyed by
/// `(module, field)`, consulted while binding a [`crate::module::Module`]'s
/// imports during compilation.
///
/// Entries are reference-counted so the same registry can back more than
/// one [`crate::vm::compile`] call, and so a resolved host function can be
/// shared read-only by a [`crate::vm::CompiledModule`] without cloning the
/// embedder's (non-`Clone`) callable.
#[derive(Debug, Default)]
pub struct HostRegistry<T> {
    by_name: HashMap<ImportName, Arc<HostFunction<T>>>,
}

impl<T> HostRegistry<T> {
    pub fn new() -> Self {
        Self {
            by_name: HashMap::new(),
        }
    }

    /// Registers `function` under `name`.
    ///
    /// # Panics
    ///
    /// If `name` is already registered. A host registry is built once at
    /// startup by the embedder; a collision there is a programming error,
    /// not a condition guest code can trigger.
    pub fn insert_function(&mut self, name: ImportName, function: HostFunction<T>) {
        let previous = self.by_name.insert(name, Arc::new(function));
        assert!(previous.is_none(), "host registry name collision");
    }

    pub fn resolve(&self, name: &ImportName) -> Option<Arc<HostFunction<T>>> {
        self.by_name.get(name).cloned()
    }
}

impl<T> Deref for HostRegistry<T> {
    type Target = HashMap<ImportName, Arc<HostFunction<T>>>;

    fn deref(&self) -> &Self::Target {
        &self.by_name
    }
}

impl<T> DerefMut for HostRegistry<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.by_name
    }
}
