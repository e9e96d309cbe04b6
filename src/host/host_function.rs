use crate::host::ValueKind;
use crate::types::ValueType;
use crate::vm::Process;
use alloc::boxed::Box;
use alloc::vec::Vec;

/// An embedder-supplied callable plus the reflected signature the
/// trampoline uses to marshal arguments into it.
///
/// `params` records every declared parameter including position zero, which
/// by contract must be [`ValueKind::Ptr`]; the closure itself only ever
/// receives the remaining `i32` arguments; the Process proxy is constructed
/// fresh for each call and passed alongside, never stored in the closure's
/// captures.
pub struct HostFunction<T> {
    params: Vec<ValueKind>,
    result: Option<ValueType>,
    func: Box<dyn Fn(&mut Process<'_, T>, &[i32]) -> Option<i32>>,
}

impl<T> HostFunction<T> {
    pub fn new(
        params: Vec<ValueKind>,
        result: Option<ValueType>,
        func: impl Fn(&mut Process<'_, T>, &[i32]) -> Option<i32> + 'static,
    ) -> Self {
        Self {
            params,
            result,
            func: Box::new(func),
        }
    }

    pub fn params(&self) -> &[ValueKind] {
        &self.params
    }

    pub fn result(&self) -> Option<ValueType> {
        self.result
    }

    /// Number of `i32` arguments the trampoline must pop and supply, not
    /// counting the implicit Process proxy in position zero.
    pub fn arity(&self) -> usize {
        self.params.len().saturating_sub(1)
    }

    pub fn call(&self, process: &mut Process<'_, T>, args: &[i32]) -> Option<i32> {
        (self.func)(process, args)
    }
}

impl<T> core::fmt::Debug for HostFunction<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HostFunction")
            .field("params", &self.params)
            .field("result", &self.result)
            .finish_non_exhaustive()
    }
}
