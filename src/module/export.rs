use alloc::boxed::Box;

/// A module's export declaration, keyed by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Export {
    pub name: Box<str>,
    pub kind: ExportKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Function(u32),
    Global(u32),
    Memory,
    Table,
}
