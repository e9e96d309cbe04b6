use crate::compiler::CompiledFunction;
use crate::host::HostFunction;
use alloc::sync::Arc;

/// One entry of a [`crate::vm::CompiledModule`]'s function index space: a
/// function is either lowered code this crate's interpreter runs directly,
/// or an embedder-supplied callable reached through the host-call
/// trampoline (see [`crate::host`] docs).
pub enum FuncSlot<T> {
    Local(CompiledFunction),
    Host(Arc<HostFunction<T>>),
}

impl<T> FuncSlot<T> {
    pub fn as_local(&self) -> Option<&CompiledFunction> {
        match self {
            FuncSlot::Local(f) => Some(f),
            FuncSlot::Host(_) => None,
        }
    }

    pub fn as_host(&self) -> Option<&HostFunction<T>> {
        match self {
            FuncSlot::Host(h) => Some(h),
            FuncSlot::Local(_) => None,
        }
    }
}
