/// A constant initializer expression, as used by global initializers and
/// (indirectly) by data/element offsets. Only the forms the original
/// runtime evaluates are representable here: `i32.const`, `i64.const`, and
/// `global.get` of an already-initialized immutable import. `f32.const` and
/// `f64.const` are deliberately absent — per this crate's integer-only
/// scope, float globals are ignored at module-bind time rather than
/// represented here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitExpr {
    I32Const(i32),
    I64Const(i64),
    GlobalGet(u32),
}
