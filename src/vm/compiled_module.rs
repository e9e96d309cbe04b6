use crate::compiler::{compile_function, CompileError};
use crate::host::{HostRegistry, ImportName};
use crate::module::{FuncType, FunctionKind, GlobalDecl, InitExpr, Module};
use crate::types::{UntypedValue, PAGE_SIZE};
use crate::vm::func_slot::FuncSlot;
use crate::module::Export;
use alloc::sync::Arc;
use alloc::vec::Vec;
use log::{debug, trace};

struct Inner<T> {
    funcs: Vec<FuncSlot<T>>,
    func_types: Vec<FuncType>,
    func_type_idx: Vec<u32>,
    table: Vec<u32>,
    memory_image: Vec<u8>,
    globals_image: Vec<UntypedValue>,
    exports: Vec<Export>,
}

/// The result of binding a [`Module`] and its host registry: lowered
/// function bodies, an initial memory image with data segments already
/// applied, and initial global values. Immutable once built; cheap to
/// clone (an `Arc` bump) so one compilation can back many
/// [`crate::vm::Vm`] instances (see crate docs, lifecycle).
pub struct CompiledModule<T>(Arc<Inner<T>>);

impl<T> Clone for CompiledModule<T> {
    fn clone(&self) -> Self {
        CompiledModule(self.0.clone())
    }
}

impl<T> CompiledModule<T> {
    pub(crate) fn funcs(&self) -> &[FuncSlot<T>] {
        &self.0.funcs
    }

    pub(crate) fn func_types(&self) -> &[FuncType] {
        &self.0.func_types
    }

    pub(crate) fn func_type_idx(&self, func_idx: u32) -> Option<u32> {
        self.0.func_type_idx.get(func_idx as usize).copied()
    }

    pub(crate) fn table(&self) -> &[u32] {
        &self.0.table
    }

    pub(crate) fn memory_image(&self) -> &[u8] {
        &self.0.memory_image
    }

    pub(crate) fn globals_image(&self) -> &[UntypedValue] {
        &self.0.globals_image
    }

    pub fn exports(&self) -> &[Export] {
        &self.0.exports
    }
}

fn eval_init_expr(globals_so_far: &[UntypedValue], decl_mutable_so_far: &[bool], expr: InitExpr) -> Result<UntypedValue, CompileError> {
    match expr {
        InitExpr::I32Const(v) => Ok(UntypedValue::from(v)),
        InitExpr::I64Const(v) => Ok(UntypedValue::from(v)),
        InitExpr::GlobalGet(idx) => {
            let idx = idx as usize;
            if idx >= globals_so_far.len() || decl_mutable_so_far[idx] {
                return Err(CompileError::InvalidGlobalInitializer);
            }
            Ok(globals_so_far[idx])
        }
    }
}

fn build_memory_image(module: &Module) -> Result<Vec<u8>, CompileError> {
    let Some(mem) = module.memory else {
        return Ok(Vec::new());
    };
    let mut image = alloc::vec![0u8; mem.initial_pages as usize * PAGE_SIZE as usize];
    let max_bytes = mem.maximum_pages as usize * PAGE_SIZE as usize;
    for seg in &module.data {
        let offset = seg.offset as usize;
        let needed = offset.saturating_add(seg.bytes.len());
        if needed > image.len() {
            if needed > max_bytes {
                return Err(CompileError::DataSegmentOutOfBounds {
                    offset: seg.offset,
                    len: seg.bytes.len() as u32,
                });
            }
            let grown = needed.div_ceil(PAGE_SIZE as usize) * PAGE_SIZE as usize;
            image.resize(grown, 0);
        }
        image[offset..offset + seg.bytes.len()].copy_from_slice(&seg.bytes);
    }
    Ok(image)
}

/// Binds a parsed [`Module`] and its host import registry into a
/// [`CompiledModule`], per the module-compile steps described in the crate
/// docs: reject a start function, reject more than one linear memory
/// (structurally impossible given [`Module::memory`]'s shape, but checked
/// for interface parity), build the initial memory image from data
/// segments, lower or resolve every function slot, and evaluate global
/// initializers.
pub fn compile<T>(module: &Module, hosts: &HostRegistry<T>) -> Result<CompiledModule<T>, CompileError> {
    if module.start.is_some() {
        return Err(CompileError::StartFunctionNotSupported);
    }

    debug!("compiling module: {} functions, {} globals", module.functions.len(), module.globals.len());

    let memory_image = build_memory_image(module)?;

    let mut funcs = Vec::with_capacity(module.functions.len());
    let mut func_type_idx = Vec::with_capacity(module.functions.len());
    for f in &module.functions {
        func_type_idx.push(f.type_idx);
        let ft = module
            .func_types
            .get(f.type_idx as usize)
            .ok_or(CompileError::FunctionTypeIndexOutOfBounds { index: f.type_idx })?;
        match &f.kind {
            FunctionKind::Import { module: mod_name, field } => {
                let name = ImportName::new(mod_name, field);
                let host = hosts.resolve(&name).ok_or_else(|| CompileError::UnresolvedImportFunction {
                    module: mod_name.clone(),
                    field: field.clone(),
                })?;
                trace!("resolved import {name} against host registry");
                funcs.push(FuncSlot::Host(host));
            }
            FunctionKind::Local { locals, body } => {
                trace!("lowering local function (type idx {})", f.type_idx);
                let compiled = compile_function(module, &ft.params, ft.result, locals, body)?;
                funcs.push(FuncSlot::Local(compiled));
            }
        }
    }

    let mut globals_image: Vec<UntypedValue> = Vec::with_capacity(module.globals.len());
    let mut mutable_flags: Vec<bool> = Vec::with_capacity(module.globals.len());
    for GlobalDecl { mutable, init, .. } in &module.globals {
        let value = eval_init_expr(&globals_image, &mutable_flags, *init)?;
        globals_image.push(value);
        mutable_flags.push(*mutable);
    }

    let table = module.table.as_ref().map(|t| t.elements.clone()).unwrap_or_default();

    debug!("module compiled: memory {} bytes, table {} entries", memory_image.len(), table.len());

    Ok(CompiledModule(Arc::new(Inner {
        funcs,
        func_types: module.func_types.clone(),
        func_type_idx,
        table,
        memory_image,
        globals_image,
        exports: module.exports.clone(),
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{DataSegment, Function, MemoryDecl, TableDecl};
    use crate::types::{DisasmOp, ValueType};

    fn blank_module() -> Module {
        Module {
            func_types: Vec::new(),
            functions: Vec::new(),
            globals: Vec::new(),
            memory: None,
            table: None,
            imports: Vec::new(),
            exports: Vec::new(),
            data: Vec::new(),
            start: None,
        }
    }

    #[test]
    fn start_function_is_rejected() {
        let module = Module { start: Some(0), ..blank_module() };
        let hosts = HostRegistry::<()>::new();
        assert_eq!(compile(&module, &hosts), Err(CompileError::StartFunctionNotSupported));
    }

    #[test]
    fn data_segment_grows_the_memory_image_within_the_declared_maximum() {
        let module = Module {
            memory: Some(MemoryDecl { initial_pages: 1, maximum_pages: 2 }),
            data: vec![DataSegment { offset: 70_000, bytes: alloc::vec![1u8, 2, 3, 4].into_boxed_slice() }],
            ..blank_module()
        };
        let hosts = HostRegistry::<()>::new();
        let compiled = compile(&module, &hosts).unwrap();
        assert_eq!(compiled.memory_image().len(), 2 * PAGE_SIZE as usize);
        assert_eq!(&compiled.memory_image()[70_000..70_004], &[1, 2, 3, 4]);
    }

    #[test]
    fn data_segment_exceeding_the_maximum_is_rejected() {
        let module = Module {
            memory: Some(MemoryDecl { initial_pages: 1, maximum_pages: 1 }),
            data: vec![DataSegment { offset: 70_000, bytes: alloc::vec![1u8, 2, 3, 4].into_boxed_slice() }],
            ..blank_module()
        };
        let hosts = HostRegistry::<()>::new();
        assert_eq!(
            compile(&module, &hosts),
            Err(CompileError::DataSegmentOutOfBounds { offset: 70_000, len: 4 })
        );
    }

    #[test]
    fn global_initializers_support_const_and_immutable_import_get() {
        let module = Module {
            globals: vec![
                GlobalDecl { value_type: ValueType::I32, mutable: false, init: InitExpr::I32Const(42) },
                GlobalDecl { value_type: ValueType::I64, mutable: true, init: InitExpr::I64Const(-7) },
                GlobalDecl { value_type: ValueType::I32, mutable: false, init: InitExpr::GlobalGet(0) },
            ],
            ..blank_module()
        };
        let hosts = HostRegistry::<()>::new();
        let compiled = compile(&module, &hosts).unwrap();
        let globals = compiled.globals_image();
        assert_eq!(globals[0].as_i32(), 42);
        assert_eq!(globals[1].as_i64(), -7);
        assert_eq!(globals[2].as_i32(), 42);
    }

    #[test]
    fn global_get_of_a_mutable_global_is_rejected() {
        let module = Module {
            globals: vec![
                GlobalDecl { value_type: ValueType::I32, mutable: true, init: InitExpr::I32Const(1) },
                GlobalDecl { value_type: ValueType::I32, mutable: false, init: InitExpr::GlobalGet(0) },
            ],
            ..blank_module()
        };
        let hosts = HostRegistry::<()>::new();
        assert_eq!(compile(&module, &hosts), Err(CompileError::InvalidGlobalInitializer));
    }

    #[test]
    fn unresolved_import_function_is_reported_by_module_and_field() {
        let module = Module {
            func_types: vec![FuncType::new(Vec::new(), None)],
            functions: vec![Function {
                type_idx: 0,
                kind: FunctionKind::Import { module: "env".into(), field: "missing".into() },
            }],
            ..blank_module()
        };
        let hosts = HostRegistry::<()>::new();
        assert_eq!(
            compile(&module, &hosts),
            Err(CompileError::UnresolvedImportFunction { module: "env".into(), field: "missing".into() })
        );
    }

    #[test]
    fn table_elements_are_copied_from_the_module() {
        let body = || DisasmOp::End;
        let module = Module {
            func_types: vec![FuncType::new(Vec::new(), None)],
            table: Some(TableDecl { initial: 2, maximum: 4, elements: alloc::vec![0, 1] }),
            functions: vec![
                Function { type_idx: 0, kind: FunctionKind::Local { locals: Vec::new(), body: alloc::vec![body()] } },
                Function { type_idx: 0, kind: FunctionKind::Local { locals: Vec::new(), body: alloc::vec![body()] } },
            ],
            ..blank_module()
        };
        let hosts = HostRegistry::<()>::new();
        let compiled = compile(&module, &hosts).unwrap();
        assert_eq!(compiled.table(), &[0, 1]);
    }
}
