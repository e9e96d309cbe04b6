use crate::compiler::branch_table::{BranchTable, Target};
use crate::compiler::compiled_function::CompiledFunction;
use crate::compiler::control_frame::{ControlFrame, FrameKind, Fixup, LabelTarget};
use crate::compiler::error::CompileError;
use crate::module::Module;
use crate::types::{DisasmOp, Opcode, ValueType};
use alloc::vec;
use alloc::vec::Vec;

fn check_integer(ty: ValueType) -> Result<(), CompileError> {
    if ty.is_integer() {
        Ok(())
    } else {
        Err(CompileError::UnsupportedValueType(ty))
    }
}

/// Lowers one already-disassembled function body into a [`CompiledFunction`].
///
/// `params`/`locals` are the function's full flat local space in
/// declaration order (parameters first); `body` is the disassembled
/// instruction sequence with structural boundaries already paired by the
/// upstream disassembler (see crate docs, §1 OUT OF SCOPE).
pub fn compile_function(
    module: &Module,
    params: &[ValueType],
    result: Option<ValueType>,
    locals: &[ValueType],
    body: &[DisasmOp],
) -> Result<CompiledFunction, CompileError> {
    for &ty in params.iter().chain(locals.iter()) {
        check_integer(ty)?;
    }
    if let Some(ty) = result {
        check_integer(ty)?;
    }

    let mut local_types = Vec::with_capacity(params.len() + locals.len());
    local_types.extend_from_slice(params);
    local_types.extend_from_slice(locals);

    let mut lowerer = Lowerer {
        module,
        local_types,
        code: Vec::new(),
        branch_tables: Vec::new(),
        control: vec![ControlFrame::function(result)],
        stack: Vec::new(),
        max_depth: 0,
    };

    for op in body {
        lowerer.lower_one(op)?;
    }

    if !lowerer.control.is_empty() {
        return Err(CompileError::UnbalancedControlStack);
    }

    Ok(CompiledFunction {
        code: lowerer.code,
        branch_tables: lowerer.branch_tables,
        max_depth: lowerer.max_depth,
        total_local_vars: (params.len() + locals.len()) as u32,
        args: params.len() as u32,
        result,
    })
}

struct Lowerer<'a> {
    module: &'a Module,
    local_types: Vec<ValueType>,
    code: Vec<u8>,
    branch_tables: Vec<BranchTable>,
    control: Vec<ControlFrame>,
    stack: Vec<ValueType>,
    max_depth: u32,
}

impl<'a> Lowerer<'a> {
    fn height(&self) -> u32 {
        self.stack.len() as u32
    }

    fn note_depth(&mut self) {
        if self.height() > self.max_depth {
            self.max_depth = self.height();
        }
    }

    fn push_val(&mut self, ty: ValueType) {
        self.stack.push(ty);
        self.note_depth();
    }

    fn pop_val(&mut self) -> Result<ValueType, CompileError> {
        if let Some(ty) = self.stack.pop() {
            Ok(ty)
        } else if self.control.last().is_some_and(|f| f.unreachable) {
            // Polymorphic stack past an `unreachable`/`br`/`br_table`: any
            // type satisfies a pop; dead code is never actually executed.
            Ok(ValueType::I32)
        } else {
            Err(CompileError::StackUnderflow)
        }
    }

    fn push_u8(&mut self, b: u8) {
        self.code.push(b);
    }

    fn push_u32(&mut self, v: u32) {
        self.code.extend_from_slice(&v.to_le_bytes());
    }

    fn push_i32(&mut self, v: i32) {
        self.code.extend_from_slice(&v.to_le_bytes());
    }

    fn push_i64(&mut self, v: i64) {
        self.code.extend_from_slice(&v.to_le_bytes());
    }

    fn patch_i64(&mut self, pos: usize, v: i64) {
        self.code[pos..pos + 8].copy_from_slice(&v.to_le_bytes());
    }

    fn resolve_label(&self, label: u32) -> Result<usize, CompileError> {
        self.control
            .len()
            .checked_sub(1)
            .and_then(|top| top.checked_sub(label as usize))
            .ok_or(CompileError::UnresolvedLabel { depth: label })
    }

    fn reconcile(&self, frame_idx: usize) -> (u32, bool) {
        let frame = &self.control[frame_idx];
        let arity = frame.branch_arity as u32;
        let discard = self.height().saturating_sub(frame.height + arity);
        (discard, arity == 1)
    }

    fn emit_discard(&mut self, discard: u32, preserve_top: bool) {
        if discard == 0 {
            return;
        }
        if preserve_top {
            self.push_u8(Opcode::OpDiscardPreserveTop.as_byte());
        } else {
            self.push_u8(Opcode::OpDiscard.as_byte());
        }
        self.push_u32(discard);
    }

    fn push_target_addr(&mut self, frame_idx: usize, fixup_ctor: impl FnOnce(usize) -> Fixup) {
        match &self.control[frame_idx].label {
            LabelTarget::Known(addr) => {
                let addr = *addr;
                self.push_i64(addr);
            }
            LabelTarget::Pending(_) => {
                let pos = self.code.len();
                self.push_i64(0);
                let fixup = fixup_ctor(pos);
                if let LabelTarget::Pending(v) = &mut self.control[frame_idx].label {
                    v.push(fixup);
                }
            }
        }
    }

    fn emit_jump_to(&mut self, frame_idx: usize) {
        self.push_u8(Opcode::OpJmp.as_byte());
        self.push_target_addr(frame_idx, Fixup::Code);
    }

    fn patch_label(&mut self, label: &LabelTarget, addr: i64) {
        if let LabelTarget::Pending(fixups) = label {
            for fixup in fixups {
                match *fixup {
                    Fixup::Code(pos) => self.patch_i64(pos, addr),
                    Fixup::TableTarget { table_idx, label } => {
                        self.branch_tables[table_idx].targets[label].addr = addr;
                    }
                    Fixup::TableDefault { table_idx } => {
                        self.branch_tables[table_idx].default.addr = addr;
                    }
                }
            }
        }
    }

    fn build_branch_target(
        &mut self,
        label: u32,
        table_idx: usize,
        fixup: impl FnOnce() -> Fixup,
    ) -> Result<Target, CompileError> {
        let idx = self.resolve_label(label)?;
        let (discard, preserve_top) = self.reconcile(idx);
        if matches!(self.control[idx].kind, FrameKind::Function) {
            return Ok(Target::ret(discard, preserve_top));
        }
        let _ = table_idx;
        match &self.control[idx].label {
            LabelTarget::Known(addr) => Ok(Target::jump(*addr, discard, preserve_top)),
            LabelTarget::Pending(_) => {
                if let LabelTarget::Pending(v) = &mut self.control[idx].label {
                    v.push(fixup());
                }
                Ok(Target::jump(0, discard, preserve_top))
            }
        }
    }

    fn mark_unreachable(&mut self) {
        if let Some(top) = self.control.last_mut() {
            top.unreachable = true;
        }
    }

    fn require_memory(&self) -> Result<(), CompileError> {
        if self.module.memory.is_some() {
            Ok(())
        } else {
            Err(CompileError::MemoryRequired)
        }
    }

    fn lower_one(&mut self, op: &DisasmOp) -> Result<(), CompileError> {
        if self.control.is_empty() {
            return Err(CompileError::UnbalancedControlStack);
        }
        match op {
            DisasmOp::Block { result } => {
                if let Some(ty) = result {
                    check_integer(*ty)?;
                }
                self.control.push(ControlFrame {
                    kind: FrameKind::Block,
                    height: self.height(),
                    branch_arity: result.is_some() as u8,
                    result: *result,
                    label: LabelTarget::Pending(Vec::new()),
                    unreachable: false,
                });
            }
            DisasmOp::Loop { result } => {
                if let Some(ty) = result {
                    check_integer(*ty)?;
                }
                self.control.push(ControlFrame {
                    kind: FrameKind::Loop,
                    height: self.height(),
                    branch_arity: 0,
                    result: *result,
                    label: LabelTarget::Known(self.code.len() as i64),
                    unreachable: false,
                });
            }
            DisasmOp::If { result } => {
                if let Some(ty) = result {
                    check_integer(*ty)?;
                }
                self.pop_val()?;
                self.push_u8(Opcode::OpJmpZ.as_byte());
                let fixup_pos = self.code.len();
                self.push_i64(0);
                self.control.push(ControlFrame {
                    kind: FrameKind::If {
                        false_jump_fixup: fixup_pos,
                    },
                    height: self.height(),
                    branch_arity: result.is_some() as u8,
                    result: *result,
                    label: LabelTarget::Pending(Vec::new()),
                    unreachable: false,
                });
            }
            DisasmOp::Else => {
                let idx = self
                    .control
                    .len()
                    .checked_sub(1)
                    .ok_or(CompileError::ElseWithoutIf)?;
                let false_jump_fixup = match self.control[idx].kind {
                    FrameKind::If { false_jump_fixup } => false_jump_fixup,
                    _ => return Err(CompileError::ElseWithoutIf),
                };
                self.push_u8(Opcode::OpJmp.as_byte());
                let end_jump_pos = self.code.len();
                self.push_i64(0);
                let else_start = self.code.len() as i64;
                self.patch_i64(false_jump_fixup, else_start);
                if let LabelTarget::Pending(v) = &mut self.control[idx].label {
                    v.push(Fixup::Code(end_jump_pos));
                }
                self.control[idx].kind = FrameKind::Else;
                let height = self.control[idx].height;
                self.stack.truncate(height as usize);
                self.control[idx].unreachable = false;
            }
            DisasmOp::End => {
                let frame = self
                    .control
                    .pop()
                    .ok_or(CompileError::EndWithoutMatchingBlock)?;
                match frame.kind {
                    FrameKind::Function => {
                        let ret_pos = self.code.len() as i64;
                        self.patch_label(&frame.label, ret_pos);
                        self.push_u8(Opcode::Return.as_byte());
                    }
                    FrameKind::Block => {
                        let end_pos = self.code.len() as i64;
                        self.patch_label(&frame.label, end_pos);
                        self.stack.truncate(frame.height as usize);
                        if let Some(ty) = frame.result {
                            self.push_val(ty);
                        }
                    }
                    FrameKind::Loop => {
                        self.stack.truncate(frame.height as usize);
                        if let Some(ty) = frame.result {
                            self.push_val(ty);
                        }
                    }
                    FrameKind::If { false_jump_fixup } => {
                        let end_pos = self.code.len() as i64;
                        self.patch_i64(false_jump_fixup, end_pos);
                        self.patch_label(&frame.label, end_pos);
                        self.stack.truncate(frame.height as usize);
                        if let Some(ty) = frame.result {
                            self.push_val(ty);
                        }
                    }
                    FrameKind::Else => {
                        let end_pos = self.code.len() as i64;
                        self.patch_label(&frame.label, end_pos);
                        self.stack.truncate(frame.height as usize);
                        if let Some(ty) = frame.result {
                            self.push_val(ty);
                        }
                    }
                }
            }
            DisasmOp::Br { label } => {
                let idx = self.resolve_label(*label)?;
                let (discard, preserve_top) = self.reconcile(idx);
                let is_function = matches!(self.control[idx].kind, FrameKind::Function);
                self.emit_discard(discard, preserve_top);
                if is_function {
                    self.push_u8(Opcode::Return.as_byte());
                } else {
                    self.emit_jump_to(idx);
                }
                self.mark_unreachable();
            }
            DisasmOp::BrIf { label } => {
                let idx = self.resolve_label(*label)?;
                self.pop_val()?;
                let (discard, preserve_top) = self.reconcile(idx);
                self.push_u8(Opcode::OpJmpNz.as_byte());
                self.push_target_addr(idx, Fixup::Code);
                self.push_u8(preserve_top as u8);
                self.push_i64(discard as i64);
            }
            DisasmOp::BrTable { labels, default } => {
                self.pop_val()?;
                let table_idx = self.branch_tables.len();
                let mut targets = Vec::with_capacity(labels.len());
                for (i, &label) in labels.iter().enumerate() {
                    let target =
                        self.build_branch_target(label, table_idx, || Fixup::TableTarget {
                            table_idx,
                            label: i,
                        })?;
                    targets.push(target);
                }
                let default_target =
                    self.build_branch_target(*default, table_idx, || Fixup::TableDefault {
                        table_idx,
                    })?;
                self.branch_tables.push(BranchTable {
                    targets,
                    default: default_target,
                });
                self.push_u8(Opcode::BrTable.as_byte());
                self.push_u32(table_idx as u32);
                self.mark_unreachable();
            }
            DisasmOp::Return => {
                let (discard, preserve_top) = self.reconcile(0);
                self.emit_discard(discard, preserve_top);
                self.push_u8(Opcode::Return.as_byte());
                self.mark_unreachable();
            }
            DisasmOp::Call { func_idx } => {
                let ft = self
                    .module
                    .func_type_of(*func_idx)
                    .ok_or(CompileError::FunctionIndexOutOfBounds { index: *func_idx })?
                    .clone();
                for _ in 0..ft.params.len() {
                    self.pop_val()?;
                }
                self.push_u8(Opcode::Call.as_byte());
                self.push_u32(*func_idx);
                if let Some(ty) = ft.result {
                    self.push_val(ty);
                }
            }
            DisasmOp::CallIndirect { type_idx } => {
                self.require_table()?;
                let ft = self
                    .module
                    .func_types
                    .get(*type_idx as usize)
                    .ok_or(CompileError::FunctionTypeIndexOutOfBounds { index: *type_idx })?
                    .clone();
                self.pop_val()?; // table index
                for _ in 0..ft.params.len() {
                    self.pop_val()?;
                }
                self.push_u8(Opcode::CallIndirect.as_byte());
                self.push_u32(*type_idx);
                if let Some(ty) = ft.result {
                    self.push_val(ty);
                }
            }
            DisasmOp::Unreachable => {
                self.push_u8(Opcode::Unreachable.as_byte());
                self.mark_unreachable();
            }
            DisasmOp::Drop => {
                self.pop_val()?;
                self.push_u8(Opcode::Drop.as_byte());
            }
            DisasmOp::Select => {
                self.pop_val()?; // condition
                let b = self.pop_val()?;
                self.pop_val()?; // a, assumed to match b's type
                self.push_u8(Opcode::Select.as_byte());
                self.push_val(b);
            }
            DisasmOp::LocalGet { index } => {
                let ty = *self
                    .local_types
                    .get(*index as usize)
                    .ok_or(CompileError::LocalIndexOutOfBounds { index: *index })?;
                self.push_u8(Opcode::LocalGet.as_byte());
                self.push_u32(*index);
                self.push_val(ty);
            }
            DisasmOp::LocalSet { index } => {
                if *index as usize >= self.local_types.len() {
                    return Err(CompileError::LocalIndexOutOfBounds { index: *index });
                }
                self.pop_val()?;
                self.push_u8(Opcode::LocalSet.as_byte());
                self.push_u32(*index);
            }
            DisasmOp::LocalTee { index } => {
                if *index as usize >= self.local_types.len() {
                    return Err(CompileError::LocalIndexOutOfBounds { index: *index });
                }
                let ty = self.pop_val()?;
                self.push_u8(Opcode::LocalTee.as_byte());
                self.push_u32(*index);
                self.push_val(ty);
            }
            DisasmOp::GlobalGet { index } => {
                let global = self
                    .module
                    .globals
                    .get(*index as usize)
                    .ok_or(CompileError::GlobalIndexOutOfBounds { index: *index })?;
                check_integer(global.value_type)?;
                self.push_u8(Opcode::GlobalGet.as_byte());
                self.push_u32(*index);
                self.push_val(global.value_type);
            }
            DisasmOp::GlobalSet { index } => {
                if self.module.globals.get(*index as usize).is_none() {
                    return Err(CompileError::GlobalIndexOutOfBounds { index: *index });
                }
                self.pop_val()?;
                self.push_u8(Opcode::GlobalSet.as_byte());
                self.push_u32(*index);
            }
            DisasmOp::I32Const(v) => {
                self.push_u8(Opcode::I32Const.as_byte());
                self.push_i32(*v);
                self.push_val(ValueType::I32);
            }
            DisasmOp::I64Const(v) => {
                self.push_u8(Opcode::I64Const.as_byte());
                self.push_i64(*v);
                self.push_val(ValueType::I64);
            }
            DisasmOp::MemorySize => {
                self.require_memory()?;
                self.push_u8(Opcode::MemorySize.as_byte());
                self.push_val(ValueType::I32);
            }
            DisasmOp::MemoryGrow => {
                self.require_memory()?;
                self.pop_val()?;
                self.push_u8(Opcode::MemoryGrow.as_byte());
                self.push_val(ValueType::I32);
            }
            DisasmOp::Load { op, offset } => {
                self.require_memory()?;
                self.pop_val()?;
                self.push_u8(op.as_byte());
                self.push_u32(*offset);
                self.push_val(load_result_type(*op));
            }
            DisasmOp::Store { op, offset } => {
                self.require_memory()?;
                self.pop_val()?;
                self.pop_val()?;
                self.push_u8(op.as_byte());
                self.push_u32(*offset);
            }
            DisasmOp::Plain(op) => self.lower_plain(*op)?,
        }
        Ok(())
    }

    fn require_table(&self) -> Result<(), CompileError> {
        if self.module.table.is_some() {
            Ok(())
        } else {
            Err(CompileError::TableRequired)
        }
    }

    fn lower_plain(&mut self, op: Opcode) -> Result<(), CompileError> {
        use Opcode::*;
        let (pop_count, pop_ty, push): (usize, ValueType, Option<ValueType>) = match op {
            I32Eqz => (1, ValueType::I32, Some(ValueType::I32)),
            I32Eq | I32Ne | I32LtS | I32LtU | I32GtS | I32GtU | I32LeS | I32LeU | I32GeS
            | I32GeU => (2, ValueType::I32, Some(ValueType::I32)),
            I32Clz | I32Ctz | I32Popcnt => (1, ValueType::I32, Some(ValueType::I32)),
            I32Add | I32Sub | I32Mul | I32DivS | I32DivU | I32RemS | I32RemU | I32And | I32Or
            | I32Xor | I32Shl | I32ShrS | I32ShrU | I32Rotl | I32Rotr => {
                (2, ValueType::I32, Some(ValueType::I32))
            }
            I64Eqz => (1, ValueType::I64, Some(ValueType::I32)),
            I64Eq | I64Ne | I64LtS | I64LtU | I64GtS | I64GtU | I64LeS | I64LeU | I64GeS
            | I64GeU => (2, ValueType::I64, Some(ValueType::I32)),
            I64Clz | I64Ctz | I64Popcnt => (1, ValueType::I64, Some(ValueType::I64)),
            I64Add | I64Sub | I64Mul | I64DivS | I64DivU | I64RemS | I64RemU | I64And | I64Or
            | I64Xor | I64Shl | I64ShrS | I64ShrU | I64Rotl | I64Rotr => {
                (2, ValueType::I64, Some(ValueType::I64))
            }
            I32WrapI64 => (1, ValueType::I64, Some(ValueType::I32)),
            I64ExtendI32S | I64ExtendI32U => (1, ValueType::I32, Some(ValueType::I64)),
            _ => unreachable!("DisasmOp::Plain only ever wraps the opcodes matched above"),
        };
        let _ = pop_ty;
        for _ in 0..pop_count {
            self.pop_val()?;
        }
        self.push_u8(op.as_byte());
        if let Some(ty) = push {
            self.push_val(ty);
        }
        Ok(())
    }
}

fn load_result_type(op: Opcode) -> ValueType {
    use Opcode::*;
    match op {
        I32Load | I32Load8S | I32Load8U | I32Load16S | I32Load16U => ValueType::I32,
        I64Load | I64Load8S | I64Load8U | I64Load16S | I64Load16U | I64Load32S | I64Load32U => {
            ValueType::I64
        }
        _ => unreachable!("DisasmOp::Load only ever wraps a load opcode"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    fn i64_at(code: &[u8], pos: usize) -> i64 {
        i64::from_le_bytes(code[pos..pos + 8].try_into().unwrap())
    }

    #[test]
    fn sequential_arithmetic_lowers_to_unchanged_bytes() {
        let module = blank_module();
        let body = vec![
            DisasmOp::I32Const(1),
            DisasmOp::I32Const(2),
            DisasmOp::Plain(Opcode::I32Add),
            DisasmOp::End,
        ];
        let cf = compile_function(&module, &[], Some(ValueType::I32), &[], &body).unwrap();
        assert_eq!(cf.max_depth, 2);
        assert_eq!(cf.args, 0);
        assert_eq!(cf.total_local_vars, 0);
        assert_eq!(cf.result, Some(ValueType::I32));
        assert_eq!(cf.code[0], Opcode::I32Const.as_byte());
        assert_eq!(*cf.code.last().unwrap(), Opcode::Return.as_byte());
    }

    #[test]
    fn br_out_of_a_block_reconciles_discard_and_preserve_top() {
        let module = blank_module();
        let body = vec![
            DisasmOp::Block { result: Some(ValueType::I32) },
            DisasmOp::I32Const(1),
            DisasmOp::I32Const(2),
            DisasmOp::Br { label: 0 },
            DisasmOp::I32Const(99), // dead code past the branch
            DisasmOp::End,
            DisasmOp::End,
        ];
        let cf = compile_function(&module, &[], None, &[], &body).unwrap();

        // [I32Const,4][I32Const,4][OpDiscardPreserveTop,4][OpJmp,8]
        assert_eq!(cf.code[0], Opcode::I32Const.as_byte());
        assert_eq!(cf.code[5], Opcode::I32Const.as_byte());
        let discard_pos = 10;
        assert_eq!(cf.code[discard_pos], Opcode::OpDiscardPreserveTop.as_byte());
        let discard_count = u32::from_le_bytes(cf.code[discard_pos + 1..discard_pos + 5].try_into().unwrap());
        assert_eq!(discard_count, 1, "the two pushed i32s collapse to the block's single result");

        let jmp_pos = discard_pos + 5;
        assert_eq!(cf.code[jmp_pos], Opcode::OpJmp.as_byte());
        let target = i64_at(&cf.code, jmp_pos + 1);
        // the block's end patches every pending fixup to its own end
        // position, which is the last byte before the function's Return
        assert_eq!(target, cf.code.len() as i64 - 1);
        assert_eq!(*cf.code.last().unwrap(), Opcode::Return.as_byte());

        // dead code after an unreachable branch still widens max_depth,
        // since the symbolic tracker doesn't special-case it
        assert_eq!(cf.max_depth, 3);
    }

    #[test]
    fn br_table_shares_one_target_across_labels() {
        let module = blank_module();
        let body = vec![
            DisasmOp::Block { result: None },
            DisasmOp::LocalGet { index: 0 },
            DisasmOp::BrTable { labels: vec![0, 0], default: 0 },
            DisasmOp::End,
            DisasmOp::End,
        ];
        let cf = compile_function(&module, &[ValueType::I32], None, &[], &body).unwrap();
        assert_eq!(cf.branch_tables.len(), 1);
        let table = &cf.branch_tables[0];
        assert_eq!(table.targets.len(), 2);
        assert_eq!(table.targets[0].addr, table.targets[1].addr);
        assert_eq!(table.targets[0].addr, table.default.addr);
        assert!(!table.default.returns);
    }

    #[test]
    fn br_table_default_can_target_the_function_return() {
        let module = blank_module();
        let body = vec![
            DisasmOp::LocalGet { index: 0 },
            DisasmOp::BrTable { labels: vec![], default: 0 },
            DisasmOp::End,
        ];
        let cf = compile_function(&module, &[ValueType::I32], None, &[], &body).unwrap();
        assert!(cf.branch_tables[0].targets.is_empty());
        assert!(cf.branch_tables[0].default.returns);
    }

    #[test]
    fn loop_label_targets_its_own_header() {
        let module = blank_module();
        let body = vec![
            DisasmOp::Loop { result: None },
            DisasmOp::Br { label: 0 },
            DisasmOp::End,
            DisasmOp::End,
        ];
        let cf = compile_function(&module, &[], None, &[], &body).unwrap();
        // the loop body starts empty, so its header is offset 0: Br jumps
        // straight back to the start of `code`, forming an infinite loop
        assert_eq!(cf.code[0], Opcode::OpJmp.as_byte());
        assert_eq!(i64_at(&cf.code, 1), 0);
    }

    #[test]
    fn else_without_if_is_a_compile_error() {
        let module = blank_module();
        let body = vec![DisasmOp::Else, DisasmOp::End];
        let err = compile_function(&module, &[], None, &[], &body).unwrap_err();
        assert_eq!(err, CompileError::ElseWithoutIf);
    }

    #[test]
    fn end_without_matching_block_is_a_compile_error() {
        let module = blank_module();
        let body = vec![DisasmOp::End, DisasmOp::End];
        let err = compile_function(&module, &[], None, &[], &body).unwrap_err();
        assert_eq!(err, CompileError::EndWithoutMatchingBlock);
    }

    #[test]
    fn popping_an_empty_stack_is_a_compile_error() {
        let module = blank_module();
        let body = vec![DisasmOp::Drop, DisasmOp::End];
        let err = compile_function(&module, &[], None, &[], &body).unwrap_err();
        assert_eq!(err, CompileError::StackUnderflow);
    }

    #[test]
    fn branch_past_the_control_stack_is_a_compile_error() {
        let module = blank_module();
        let body = vec![DisasmOp::Br { label: 5 }, DisasmOp::End];
        let err = compile_function(&module, &[], None, &[], &body).unwrap_err();
        assert_eq!(err, CompileError::UnresolvedLabel { depth: 5 });
    }

    #[test]
    fn memory_op_without_a_declared_memory_is_a_compile_error() {
        let module = blank_module();
        let body = vec![DisasmOp::MemorySize, DisasmOp::End];
        let err = compile_function(&module, &[], Some(ValueType::I32), &[], &body).unwrap_err();
        assert_eq!(err, CompileError::MemoryRequired);
    }

    #[test]
    fn call_indirect_without_a_declared_table_is_a_compile_error() {
        let module = blank_module();
        let body = vec![DisasmOp::CallIndirect { type_idx: 0 }, DisasmOp::End];
        let err = compile_function(&module, &[], None, &[], &body).unwrap_err();
        assert_eq!(err, CompileError::TableRequired);
    }

    #[test]
    fn float_params_are_rejected_before_the_body_is_walked() {
        let module = blank_module();
        let body = vec![DisasmOp::End];
        let err = compile_function(&module, &[ValueType::F32], None, &[], &body).unwrap_err();
        assert_eq!(err, CompileError::UnsupportedValueType(ValueType::F32));
    }

    #[test]
    fn out_of_bounds_local_index_is_a_compile_error() {
        let module = blank_module();
        let body = vec![DisasmOp::LocalGet { index: 5 }, DisasmOp::End];
        let err = compile_function(&module, &[], None, &[], &body).unwrap_err();
        assert_eq!(err, CompileError::LocalIndexOutOfBounds { index: 5 });
    }

    #[test]
    fn out_of_bounds_global_index_is_a_compile_error() {
        let module = blank_module();
        let body = vec![DisasmOp::GlobalGet { index: 0 }, DisasmOp::End];
        let err = compile_function(&module, &[], None, &[], &body).unwrap_err();
        assert_eq!(err, CompileError::GlobalIndexOutOfBounds { index: 0 });
    }

    #[test]
    fn call_to_an_undeclared_function_is_a_compile_error() {
        let module = blank_module();
        let body = vec![DisasmOp::Call { func_idx: 9 }, DisasmOp::End];
        let err = compile_function(&module, &[], None, &[], &body).unwrap_err();
        assert_eq!(err, CompileError::FunctionIndexOutOfBounds { index: 9 });
    }
}
