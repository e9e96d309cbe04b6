use crate::types::ValueType;
use core::fmt;

/// The kind of a single host-function parameter slot, as recorded in a
/// [`super::HostFunction`]'s reflected signature.
///
/// This is distinct from [`ValueType`] because a host function's first
/// parameter is not a Wasm value at all — it is the [`crate::vm::Process`]
/// proxy — and the trampoline needs to tell the two apart when it reports a
/// mis-registered signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// The Process proxy, required in parameter position zero.
    Ptr,
    Value(ValueType),
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Ptr => write!(f, "ptr"),
            ValueKind::Value(v) => write!(f, "{v}"),
        }
    }
}
