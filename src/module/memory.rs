/// A module's (at most one) linear memory declaration.
///
/// `maximum_pages` is always `Some` by the time it reaches the compiler: an
/// absent or oversized declaration is clamped to the pre-validator's 160-page
/// ceiling (10 MiB) upstream of this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryDecl {
    pub initial_pages: u32,
    pub maximum_pages: u32,
}
