//! The fetch-decode-dispatch loop, the host-call trampoline, and the
//! handful of free helper functions (immediate decoding, memory-bounds
//! checks) they share. See crate docs §4.2–§4.3 for the contract this
//! module implements.
//!
//! Guest-to-guest calls (`Call`/`CallIndirect` into a lowered function) do
//! not recurse on the native Rust stack. Each call pushes a [`Frame`] onto
//! an explicit, heap-allocated call stack that [`Vm::run`] drives with a
//! single loop; a `Return` (or a lowered function's code running out) pops
//! it. This is what lets [`crate::vm::VmConfig`]'s `call_stack_depth` guard
//! (§4.8) actually bound how deep a pathological self-recursive guest
//! function can go without overflowing the host's own stack: the native
//! call stack stays a handful of frames deep no matter how deep the guest
//! recursion is.

use crate::compiler::CompiledFunction;
use crate::host::{HostFunction, ValueKind};
use crate::types::{DropKeep, Opcode, TrapCode, UntypedValue, ValueType, PAGE_SIZE};
use crate::vm::error::{ExecError, SetupError};
use crate::vm::func_slot::FuncSlot;
use crate::vm::process::Process;
use crate::vm::vm::Vm;
use crate::vm::CompiledModule;
use alloc::vec::Vec;
use log::{debug, trace, warn};

pub(crate) fn build_locals(compiled: &CompiledFunction, args: &[UntypedValue]) -> Vec<UntypedValue> {
    let mut locals = alloc::vec![UntypedValue::default(); compiled.total_local_vars as usize];
    locals[..args.len()].copy_from_slice(args);
    locals
}

/// One activation of a lowered function on the explicit call stack
/// [`Vm::run`] drives: its own program counter, locals, and operand stack.
/// Pushed by [`Vm::run`] at entry or by [`Vm::dispatch_call`] for a `Call`/
/// `CallIndirect` into a local function; popped by `Return`, a `br` that
/// unwinds out of the function, or the lowered code running out.
struct Frame {
    func_idx: u32,
    pc: usize,
    locals: Vec<UntypedValue>,
    stack: Vec<UntypedValue>,
}

/// What happened when the top [`Frame`] finished, from [`Vm::pop_frame`]'s
/// point of view.
enum FrameExit {
    /// The popped frame wasn't the entry frame: its return value (if any)
    /// has already been pushed onto the caller frame now on top, and the
    /// main loop should keep going there.
    Continue,
    /// The popped frame was the entry frame pushed by [`Vm::run`];
    /// `exec_code` is finished. Carries the entry frame's operand-stack
    /// buffer back so it can be salvaged into [`Vm::stack_buf`].
    Done { result: Option<UntypedValue>, root_stack: Vec<UntypedValue> },
}

fn read_u8(code: &[u8], pc: &mut usize) -> u8 {
    let b = code[*pc];
    *pc += 1;
    b
}

fn read_u32(code: &[u8], pc: &mut usize) -> u32 {
    let bytes: [u8; 4] = code[*pc..*pc + 4].try_into().expect("lowered stream truncated");
    *pc += 4;
    u32::from_le_bytes(bytes)
}

fn read_i32(code: &[u8], pc: &mut usize) -> i32 {
    read_u32(code, pc) as i32
}

fn read_i64(code: &[u8], pc: &mut usize) -> i64 {
    let bytes: [u8; 8] = code[*pc..*pc + 8].try_into().expect("lowered stream truncated");
    *pc += 8;
    i64::from_le_bytes(bytes)
}

fn pop(stack: &mut Vec<UntypedValue>) -> UntypedValue {
    stack.pop().expect("operand stack underflow: compiler's max_depth analysis is relied on without further checks")
}

fn pop_args(stack: &mut Vec<UntypedValue>, n: usize) -> Vec<UntypedValue> {
    let mut args = alloc::vec![UntypedValue::default(); n];
    for slot in args.iter_mut().rev() {
        *slot = pop(stack);
    }
    args
}

/// Checked effective-address range for a `width`-byte memory access at
/// `addr + offset`. Traps `MemoryOutOfBounds` rather than returning a
/// `Result`: out-of-bounds memory access is one of the panic-carried traps
/// enumerated in the crate docs (§6), recoverable only when
/// [`crate::vm::VmConfig::recover_panic`] is enabled.
fn checked_range(mem_len: usize, addr: u32, offset: u32, width: usize) -> core::ops::Range<usize> {
    let start = (addr as u64) + (offset as u64);
    let end = start + width as u64;
    if end > mem_len as u64 {
        raise_trap(TrapCode::MemoryOutOfBounds);
    }
    start as usize..end as usize
}

// `panic_any(trap)` would carry the structured `TrapCode` through the
// unwind, but the default panic hook only ever prints the `&str`/`String`
// special cases of a payload's `downcast_ref` — anything else prints as
// the unhelpful `Box<dyn Any>`. The crate docs (§4.3) require the panic's
// *message* to read exactly as `TrapCode`'s `Display` impl renders it, so
// the payload has to be a plain `String` instead. `recover_panic` still
// needs the structured code back, so it is stashed here and reclaimed by
// `run_with_recovery` on the other side of the unwind — sound because a
// VM (and this thread-local) is never shared across threads (§5).
#[cfg(feature = "std")]
std::thread_local! {
    static PENDING_TRAP: core::cell::RefCell<Option<TrapCode>> = const { core::cell::RefCell::new(None) };
}

#[cfg(feature = "std")]
fn raise_trap(trap: TrapCode) -> ! {
    warn!("runtime trap: {trap}");
    PENDING_TRAP.with(|cell| *cell.borrow_mut() = Some(trap.clone()));
    panic!("{trap}")
}

#[cfg(not(feature = "std"))]
fn raise_trap(trap: TrapCode) -> ! {
    warn!("runtime trap: {trap}");
    panic!("{trap}")
}

#[cfg(feature = "std")]
fn run_with_recovery<F>(f: F) -> Result<Option<UntypedValue>, ExecError>
where
    F: FnOnce() -> Result<Option<UntypedValue>, ExecError>,
{
    PENDING_TRAP.with(|cell| *cell.borrow_mut() = None);
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(_) => {
            let trap = PENDING_TRAP.with(|cell| cell.borrow_mut().take()).unwrap_or(TrapCode::Unreachable);
            Err(ExecError::Trap(trap))
        }
    }
}

#[cfg(not(feature = "std"))]
fn run_with_recovery<F>(f: F) -> Result<Option<UntypedValue>, ExecError>
where
    F: FnOnce() -> Result<Option<UntypedValue>, ExecError>,
{
    // `recover_panic` has no effect without `std`: there is no
    // `catch_unwind` to recover with, so a trap propagates as a bare panic
    // regardless of the configured flag.
    f()
}

impl<'g, T> Vm<'g, T> {
    fn charge_gas(&mut self) -> bool {
        match &mut self.gas {
            Some(gas) => gas.charge_step(),
            None => true,
        }
    }

    /// The outermost entry point, called once per [`Vm::exec_code`]. If
    /// `recover_panic` is set, wraps the whole call in a `catch_unwind`
    /// boundary: a trap raised anywhere in the explicit call stack unwinds
    /// straight through to here, since no guest call recurses natively.
    pub(crate) fn enter_and_run(&mut self, fn_index: u32, args: &[UntypedValue]) -> Result<Option<UntypedValue>, ExecError> {
        if self.config.recover_panic() {
            run_with_recovery(move || self.run(fn_index, args))
        } else {
            self.run(fn_index, args)
        }
    }

    /// Pushes a local function's activation onto the explicit call stack,
    /// enforcing the call-stack depth guard (crate docs §4.8): a plain
    /// counter decremented here and restored by [`Vm::pop_frame`], not
    /// native recursion depth.
    fn push_frame(&mut self, frames: &mut Vec<Frame>, func_idx: u32, locals: Vec<UntypedValue>, stack: Vec<UntypedValue>) {
        if self.call_stack_depth == 0 {
            raise_trap(TrapCode::CallStackDepthExceeded);
        }
        self.call_stack_depth -= 1;
        frames.push(Frame { func_idx, pc: 0, locals, stack });
    }

    /// Pops the top frame once it has reached `Return` or run out of
    /// lowered code, converting its declared return value per the exit
    /// contract in crate docs §4.2. If a caller frame remains underneath,
    /// the value is pushed there and the main loop continues; otherwise
    /// this was the entry frame and `exec_code` is finished.
    fn pop_frame(&mut self, frames: &mut Vec<Frame>, compiled: &CompiledFunction) -> Result<FrameExit, ExecError> {
        let mut frame = frames.pop().expect("frame stack is non-empty whenever a frame is being popped");
        let result = match compiled.result {
            None => None,
            Some(ValueType::I32) => Some(UntypedValue::from(pop(&mut frame.stack).as_u32())),
            Some(ValueType::I64) => Some(UntypedValue::from(pop(&mut frame.stack).as_u64())),
            Some(other) => return Err(SetupError::InvalidReturnType { declared: Some(other) }.into()),
        };
        self.call_stack_depth += 1;
        match frames.last_mut() {
            Some(caller) => {
                if let Some(v) = result {
                    caller.stack.push(v);
                }
                Ok(FrameExit::Continue)
            }
            None => Ok(FrameExit::Done { result, root_stack: frame.stack }),
        }
    }

    /// Salvages the entry frame's operand-stack buffer into
    /// [`Vm::stack_buf`] for reuse by the next `exec_code` call, whatever
    /// reason execution is ending for. A no-op once the entry frame has
    /// already been popped through the normal [`Vm::pop_frame`] path.
    fn reclaim_root_stack(&mut self, frames: &mut Vec<Frame>) {
        if let Some(root) = frames.first_mut() {
            self.stack_buf = core::mem::take(&mut root.stack);
        }
    }

    /// Dispatches a `Call`/`CallIndirect` reached mid-frame: pops `target`'s
    /// arguments off the calling frame's operand stack, then either runs a
    /// host function in place (crate docs §4.3 — host functions cannot call
    /// back into guest code, so this never touches the call stack) or
    /// pushes a new [`Frame`] for a local callee.
    fn dispatch_call(&mut self, module: &CompiledModule<T>, frames: &mut Vec<Frame>, target: u32) -> Result<(), ExecError> {
        let type_idx = module
            .func_type_idx(target)
            .expect("call target's function index validated at compile time");
        let param_count = module.func_types()[type_idx as usize].params.len();

        let args = {
            let caller = frames.last_mut().expect("frame stack is never empty while executing");
            pop_args(&mut caller.stack, param_count)
        };

        let slot = module
            .funcs()
            .get(target as usize)
            .expect("call target validated against the module's function index space at compile time");

        match slot {
            FuncSlot::Host(host) => {
                let result = self.call_host(host, &args)?;
                if !self.abort {
                    if let Some(v) = result {
                        frames.last_mut().expect("frame stack is never empty while executing").stack.push(v);
                    }
                }
            }
            FuncSlot::Local(compiled) => {
                let locals = build_locals(compiled, &args);
                let needed = compiled.max_depth as usize + 1;
                self.push_frame(frames, target, locals, Vec::with_capacity(needed));
            }
        }
        Ok(())
    }

    /// The host-call trampoline (crate docs §4.3): validates the host's
    /// reflected signature, marshals `args` into `i32`s, constructs a
    /// fresh [`Process`] proxy, and invokes the callable.
    fn call_host(&mut self, host: &HostFunction<T>, args: &[UntypedValue]) -> Result<Option<UntypedValue>, ExecError> {
        let first = host
            .params()
            .first()
            .expect("host function registered with no parameters: the Process proxy is required in position zero");
        if *first != ValueKind::Ptr {
            let found = match first {
                ValueKind::Value(ty) => *ty,
                ValueKind::Ptr => unreachable!(),
            };
            raise_trap(TrapCode::HostSignatureMismatch { found });
        }

        trace!("dispatching host call, {} i32 arg(s)", args.len());
        let i32_args: Vec<i32> = args.iter().map(|v| v.as_i32()).collect();
        let mut process = Process::new(&mut self.memory, &mut self.abort, &mut self.host_data);
        let result = host.call(&mut process, &i32_args);
        Ok(result.map(UntypedValue::from))
    }

    /// The outer fetch-decode-execute loop (crate docs §4.2): drives the
    /// explicit call stack described at the top of this module until the
    /// entry frame finishes, gas is exhausted, abort is observed, or a trap
    /// unwinds out through [`raise_trap`].
    fn run(&mut self, fn_index: u32, args: &[UntypedValue]) -> Result<Option<UntypedValue>, ExecError> {
        debug!("exec_code: fn {fn_index}, {} arg(s)", args.len());

        let module = self.module.clone();
        let mut frames: Vec<Frame> = Vec::new();

        let entry = module
            .funcs()
            .get(fn_index as usize)
            .and_then(FuncSlot::as_local)
            .expect("exec_code already validated the entry point is a local function");
        let locals = build_locals(entry, args);
        let needed = entry.max_depth as usize + 1;
        let mut stack = core::mem::take(&mut self.stack_buf);
        if stack.capacity() < needed {
            stack = Vec::with_capacity(needed);
        } else {
            stack.clear();
        }
        self.push_frame(&mut frames, fn_index, locals, stack);

        loop {
            if self.abort {
                debug!("execution aborted; return value suppressed");
                self.reclaim_root_stack(&mut frames);
                return Ok(None);
            }

            let frame_idx = frames.len() - 1;
            let func_idx = frames[frame_idx].func_idx;
            let compiled = module
                .funcs()
                .get(func_idx as usize)
                .and_then(FuncSlot::as_local)
                .expect("frame always refers to a local function");
            let code = &compiled.code;

            if frames[frame_idx].pc >= code.len() {
                match self.pop_frame(&mut frames, compiled)? {
                    FrameExit::Continue => continue,
                    FrameExit::Done { result, root_stack } => {
                        self.stack_buf = root_stack;
                        return Ok(result);
                    }
                }
            }

            if !self.charge_gas() {
                self.reclaim_root_stack(&mut frames);
                return Err(ExecError::GasExhausted);
            }

            let byte = read_u8(code, &mut frames[frame_idx].pc);
            let opcode = Opcode::from_byte(byte).unwrap_or_else(|| raise_trap(TrapCode::Unreachable));

            match opcode {
                Opcode::Return => match self.pop_frame(&mut frames, compiled)? {
                    FrameExit::Continue => {}
                    FrameExit::Done { result, root_stack } => {
                        self.stack_buf = root_stack;
                        return Ok(result);
                    }
                },
                Opcode::OpJmp => {
                    let target = read_i64(code, &mut frames[frame_idx].pc);
                    frames[frame_idx].pc = target as usize;
                }
                Opcode::OpJmpZ => {
                    let target = read_i64(code, &mut frames[frame_idx].pc);
                    if !pop(&mut frames[frame_idx].stack).as_bool() {
                        frames[frame_idx].pc = target as usize;
                    }
                }
                Opcode::OpJmpNz => {
                    let target = read_i64(code, &mut frames[frame_idx].pc);
                    let preserve_top = read_u8(code, &mut frames[frame_idx].pc) != 0;
                    let discard = read_i64(code, &mut frames[frame_idx].pc) as u32;
                    if pop(&mut frames[frame_idx].stack).as_bool() {
                        DropKeep::new(discard, preserve_top).apply(&mut frames[frame_idx].stack);
                        frames[frame_idx].pc = target as usize;
                    }
                }
                Opcode::BrTable => {
                    let table_idx = read_u32(code, &mut frames[frame_idx].pc) as usize;
                    let label = pop(&mut frames[frame_idx].stack).as_i32();
                    let target = compiled.branch_tables[table_idx].resolve(label);
                    DropKeep::new(target.discard, target.preserve_top).apply(&mut frames[frame_idx].stack);
                    if target.returns {
                        match self.pop_frame(&mut frames, compiled)? {
                            FrameExit::Continue => {}
                            FrameExit::Done { result, root_stack } => {
                                self.stack_buf = root_stack;
                                return Ok(result);
                            }
                        }
                    } else {
                        frames[frame_idx].pc = target.addr as usize;
                    }
                }
                Opcode::OpDiscard => {
                    let n = read_u32(code, &mut frames[frame_idx].pc);
                    DropKeep::new(n, false).apply(&mut frames[frame_idx].stack);
                }
                Opcode::OpDiscardPreserveTop => {
                    let n = read_u32(code, &mut frames[frame_idx].pc);
                    DropKeep::new(n, true).apply(&mut frames[frame_idx].stack);
                }
                Opcode::Call => {
                    let target = read_u32(code, &mut frames[frame_idx].pc);
                    self.dispatch_call(&module, &mut frames, target)?;
                }
                Opcode::CallIndirect => {
                    let type_idx = read_u32(code, &mut frames[frame_idx].pc);
                    let table_index = pop(&mut frames[frame_idx].stack).as_u32();
                    let table = module.table();
                    let target = *table
                        .get(table_index as usize)
                        .unwrap_or_else(|| raise_trap(TrapCode::TableIndexOutOfBounds));
                    let actual_type_idx = module
                        .func_type_idx(target)
                        .unwrap_or_else(|| raise_trap(TrapCode::TableIndexOutOfBounds));
                    if actual_type_idx != type_idx {
                        raise_trap(TrapCode::TableIndexOutOfBounds);
                    }
                    self.dispatch_call(&module, &mut frames, target)?;
                }
                other => {
                    let frame = &mut frames[frame_idx];
                    self.dispatch(other, code, &mut frame.pc, &mut frame.locals, &mut frame.stack)?;
                }
            }
        }
    }

    /// Every non-control-primitive, non-call opcode: arithmetic,
    /// comparisons, conversions, memory, and locals/globals. Reads its own
    /// immediates from `code` via `pc`.
    fn dispatch(
        &mut self,
        opcode: Opcode,
        code: &[u8],
        pc: &mut usize,
        locals: &mut [UntypedValue],
        stack: &mut Vec<UntypedValue>,
    ) -> Result<(), ExecError> {
        use Opcode::*;
        match opcode {
            Unreachable => raise_trap(TrapCode::Unreachable),
            Drop => {
                pop(stack);
            }
            Select => {
                let cond = pop(stack);
                let b = pop(stack);
                let a = pop(stack);
                stack.push(if cond.as_bool() { a } else { b });
            }
            LocalGet => {
                let idx = read_u32(code, pc) as usize;
                stack.push(locals[idx]);
            }
            LocalSet => {
                let idx = read_u32(code, pc) as usize;
                locals[idx] = pop(stack);
            }
            LocalTee => {
                let idx = read_u32(code, pc) as usize;
                locals[idx] = *stack.last().expect("operand stack underflow on local.tee");
            }
            GlobalGet => {
                let idx = read_u32(code, pc) as usize;
                stack.push(self.globals[idx]);
            }
            GlobalSet => {
                let idx = read_u32(code, pc) as usize;
                self.globals[idx] = pop(stack);
            }
            I32Load => {
                let offset = read_u32(code, pc);
                let addr = pop(stack).as_u32();
                let range = checked_range(self.memory.len(), addr, offset, 4);
                let bytes: [u8; 4] = self.memory[range].try_into().unwrap();
                stack.push(UntypedValue::from(u32::from_le_bytes(bytes)));
            }
            I64Load => {
                let offset = read_u32(code, pc);
                let addr = pop(stack).as_u32();
                let range = checked_range(self.memory.len(), addr, offset, 8);
                let bytes: [u8; 8] = self.memory[range].try_into().unwrap();
                stack.push(UntypedValue::from(u64::from_le_bytes(bytes)));
            }
            I32Load8S => {
                let v = load_int(&self.memory, pop(stack).as_u32(), read_u32(code, pc), 1) as i8;
                stack.push(UntypedValue::from(v as i32));
            }
            I32Load8U => {
                let v = load_int(&self.memory, pop(stack).as_u32(), read_u32(code, pc), 1) as u8;
                stack.push(UntypedValue::from(v as u32));
            }
            I32Load16S => {
                let v = load_int(&self.memory, pop(stack).as_u32(), read_u32(code, pc), 2) as i16;
                stack.push(UntypedValue::from(v as i32));
            }
            I32Load16U => {
                let v = load_int(&self.memory, pop(stack).as_u32(), read_u32(code, pc), 2) as u16;
                stack.push(UntypedValue::from(v as u32));
            }
            I64Load8S => {
                let v = load_int(&self.memory, pop(stack).as_u32(), read_u32(code, pc), 1) as i8;
                stack.push(UntypedValue::from(v as i64));
            }
            I64Load8U => {
                let v = load_int(&self.memory, pop(stack).as_u32(), read_u32(code, pc), 1) as u8;
                stack.push(UntypedValue::from(v as u64));
            }
            I64Load16S => {
                let v = load_int(&self.memory, pop(stack).as_u32(), read_u32(code, pc), 2) as i16;
                stack.push(UntypedValue::from(v as i64));
            }
            I64Load16U => {
                let v = load_int(&self.memory, pop(stack).as_u32(), read_u32(code, pc), 2) as u16;
                stack.push(UntypedValue::from(v as u64));
            }
            I64Load32S => {
                let v = load_int(&self.memory, pop(stack).as_u32(), read_u32(code, pc), 4) as i32;
                stack.push(UntypedValue::from(v as i64));
            }
            I64Load32U => {
                let v = load_int(&self.memory, pop(stack).as_u32(), read_u32(code, pc), 4) as u32;
                stack.push(UntypedValue::from(v as u64));
            }
            I32Store => {
                let offset = read_u32(code, pc);
                let value = pop(stack).as_u32();
                let addr = pop(stack).as_u32();
                let range = checked_range(self.memory.len(), addr, offset, 4);
                self.memory[range].copy_from_slice(&value.to_le_bytes());
            }
            I64Store => {
                let offset = read_u32(code, pc);
                let value = pop(stack).as_u64();
                let addr = pop(stack).as_u32();
                let range = checked_range(self.memory.len(), addr, offset, 8);
                self.memory[range].copy_from_slice(&value.to_le_bytes());
            }
            I32Store8 => {
                let offset = read_u32(code, pc);
                let value = pop(stack).as_u32() as u8;
                let addr = pop(stack).as_u32();
                let range = checked_range(self.memory.len(), addr, offset, 1);
                self.memory[range].copy_from_slice(&value.to_le_bytes());
            }
            I32Store16 => {
                let offset = read_u32(code, pc);
                let value = pop(stack).as_u32() as u16;
                let addr = pop(stack).as_u32();
                let range = checked_range(self.memory.len(), addr, offset, 2);
                self.memory[range].copy_from_slice(&value.to_le_bytes());
            }
            I64Store8 => {
                let offset = read_u32(code, pc);
                let value = pop(stack).as_u64() as u8;
                let addr = pop(stack).as_u32();
                let range = checked_range(self.memory.len(), addr, offset, 1);
                self.memory[range].copy_from_slice(&value.to_le_bytes());
            }
            I64Store16 => {
                let offset = read_u32(code, pc);
                let value = pop(stack).as_u64() as u16;
                let addr = pop(stack).as_u32();
                let range = checked_range(self.memory.len(), addr, offset, 2);
                self.memory[range].copy_from_slice(&value.to_le_bytes());
            }
            I64Store32 => {
                let offset = read_u32(code, pc);
                let value = pop(stack).as_u64() as u32;
                let addr = pop(stack).as_u32();
                let range = checked_range(self.memory.len(), addr, offset, 4);
                self.memory[range].copy_from_slice(&value.to_le_bytes());
            }
            MemorySize => {
                stack.push(UntypedValue::from((self.memory.len() / PAGE_SIZE as usize) as u32));
            }
            MemoryGrow => {
                let delta_pages = pop(stack).as_u32();
                let old_pages = (self.memory.len() / PAGE_SIZE as usize) as u32;
                let new_len = self.memory.len() as u64 + delta_pages as u64 * PAGE_SIZE as u64;
                if new_len > self.config.memory_limit_bytes() as u64 {
                    stack.push(UntypedValue::from(-1i32));
                } else {
                    self.memory.resize(new_len as usize, 0);
                    stack.push(UntypedValue::from(old_pages));
                }
            }
            I32Const => stack.push(UntypedValue::from(read_i32(code, pc))),
            I64Const => stack.push(UntypedValue::from(read_i64(code, pc))),
            I32Eqz => {
                let v = pop(stack).as_i32();
                stack.push(UntypedValue::from((v == 0) as u32));
            }
            I32Eq => binop_i32(stack, |a, b| (a == b) as u32),
            I32Ne => binop_i32(stack, |a, b| (a != b) as u32),
            I32LtS => binop_i32s(stack, |a, b| (a < b) as u32),
            I32LtU => binop_i32(stack, |a, b| (a < b) as u32),
            I32GtS => binop_i32s(stack, |a, b| (a > b) as u32),
            I32GtU => binop_i32(stack, |a, b| (a > b) as u32),
            I32LeS => binop_i32s(stack, |a, b| (a <= b) as u32),
            I32LeU => binop_i32(stack, |a, b| (a <= b) as u32),
            I32GeS => binop_i32s(stack, |a, b| (a >= b) as u32),
            I32GeU => binop_i32(stack, |a, b| (a >= b) as u32),
            I64Eqz => {
                let v = pop(stack).as_i64();
                stack.push(UntypedValue::from((v == 0) as u32));
            }
            I64Eq => binop_i64(stack, |a, b| (a == b) as u32),
            I64Ne => binop_i64(stack, |a, b| (a != b) as u32),
            I64LtS => binop_i64s(stack, |a, b| (a < b) as u32),
            I64LtU => binop_i64(stack, |a, b| (a < b) as u32),
            I64GtS => binop_i64s(stack, |a, b| (a > b) as u32),
            I64GtU => binop_i64(stack, |a, b| (a > b) as u32),
            I64LeS => binop_i64s(stack, |a, b| (a <= b) as u32),
            I64LeU => binop_i64(stack, |a, b| (a <= b) as u32),
            I64GeS => binop_i64s(stack, |a, b| (a >= b) as u32),
            I64GeU => binop_i64(stack, |a, b| (a >= b) as u32),
            I32Clz => {
                let v = pop(stack).as_u32();
                stack.push(UntypedValue::from(v.leading_zeros()));
            }
            I32Ctz => {
                let v = pop(stack).as_u32();
                stack.push(UntypedValue::from(v.trailing_zeros()));
            }
            I32Popcnt => {
                let v = pop(stack).as_u32();
                stack.push(UntypedValue::from(v.count_ones()));
            }
            I32Add => binop_i32(stack, |a, b| a.wrapping_add(b)),
            I32Sub => binop_i32(stack, |a, b| a.wrapping_sub(b)),
            I32Mul => binop_i32(stack, |a, b| a.wrapping_mul(b)),
            I32DivS => {
                let b = pop(stack).as_i32();
                let a = pop(stack).as_i32();
                if b == 0 {
                    raise_trap(TrapCode::IntegerDivideByZero);
                }
                stack.push(UntypedValue::from(a.wrapping_div(b)));
            }
            I32DivU => {
                let b = pop(stack).as_u32();
                let a = pop(stack).as_u32();
                if b == 0 {
                    raise_trap(TrapCode::IntegerDivideByZero);
                }
                stack.push(UntypedValue::from(a / b));
            }
            I32RemS => {
                let b = pop(stack).as_i32();
                let a = pop(stack).as_i32();
                if b == 0 {
                    raise_trap(TrapCode::IntegerDivideByZero);
                }
                stack.push(UntypedValue::from(a.wrapping_rem(b)));
            }
            I32RemU => {
                let b = pop(stack).as_u32();
                let a = pop(stack).as_u32();
                if b == 0 {
                    raise_trap(TrapCode::IntegerDivideByZero);
                }
                stack.push(UntypedValue::from(a % b));
            }
            I32And => binop_i32(stack, |a, b| a & b),
            I32Or => binop_i32(stack, |a, b| a | b),
            I32Xor => binop_i32(stack, |a, b| a ^ b),
            I32Shl => binop_i32(stack, |a, b| a.wrapping_shl(b)),
            I32ShrS => {
                let b = pop(stack).as_u32();
                let a = pop(stack).as_i32();
                stack.push(UntypedValue::from(a.wrapping_shr(b)));
            }
            I32ShrU => binop_i32(stack, |a, b| a.wrapping_shr(b)),
            I32Rotl => binop_i32(stack, |a, b| a.rotate_left(b)),
            I32Rotr => binop_i32(stack, |a, b| a.rotate_right(b)),
            I64Clz => {
                let v = pop(stack).as_u64();
                stack.push(UntypedValue::from(v.leading_zeros() as u64));
            }
            I64Ctz => {
                let v = pop(stack).as_u64();
                stack.push(UntypedValue::from(v.trailing_zeros() as u64));
            }
            I64Popcnt => {
                let v = pop(stack).as_u64();
                stack.push(UntypedValue::from(v.count_ones() as u64));
            }
            I64Add => binop_i64_wrap(stack, |a, b| a.wrapping_add(b)),
            I64Sub => binop_i64_wrap(stack, |a, b| a.wrapping_sub(b)),
            I64Mul => binop_i64_wrap(stack, |a, b| a.wrapping_mul(b)),
            I64DivS => {
                let b = pop(stack).as_i64();
                let a = pop(stack).as_i64();
                if b == 0 {
                    raise_trap(TrapCode::IntegerDivideByZero);
                }
                stack.push(UntypedValue::from(a.wrapping_div(b)));
            }
            I64DivU => {
                let b = pop(stack).as_u64();
                let a = pop(stack).as_u64();
                if b == 0 {
                    raise_trap(TrapCode::IntegerDivideByZero);
                }
                stack.push(UntypedValue::from(a / b));
            }
            I64RemS => {
                let b = pop(stack).as_i64();
                let a = pop(stack).as_i64();
                if b == 0 {
                    raise_trap(TrapCode::IntegerDivideByZero);
                }
                stack.push(UntypedValue::from(a.wrapping_rem(b)));
            }
            I64RemU => {
                let b = pop(stack).as_u64();
                let a = pop(stack).as_u64();
                if b == 0 {
                    raise_trap(TrapCode::IntegerDivideByZero);
                }
                stack.push(UntypedValue::from(a % b));
            }
            I64And => binop_i64_wrap(stack, |a, b| a & b),
            I64Or => binop_i64_wrap(stack, |a, b| a | b),
            I64Xor => binop_i64_wrap(stack, |a, b| a ^ b),
            I64Shl => {
                let b = pop(stack).as_u64() as u32;
                let a = pop(stack).as_u64();
                stack.push(UntypedValue::from(a.wrapping_shl(b)));
            }
            I64ShrS => {
                let b = pop(stack).as_u64() as u32;
                let a = pop(stack).as_i64();
                stack.push(UntypedValue::from(a.wrapping_shr(b)));
            }
            I64ShrU => {
                let b = pop(stack).as_u64() as u32;
                let a = pop(stack).as_u64();
                stack.push(UntypedValue::from(a.wrapping_shr(b)));
            }
            I64Rotl => {
                let b = pop(stack).as_u64() as u32;
                let a = pop(stack).as_u64();
                stack.push(UntypedValue::from(a.rotate_left(b)));
            }
            I64Rotr => {
                let b = pop(stack).as_u64() as u32;
                let a = pop(stack).as_u64();
                stack.push(UntypedValue::from(a.rotate_right(b)));
            }
            I32WrapI64 => {
                let v = pop(stack).as_u64();
                stack.push(UntypedValue::from(v as u32));
            }
            I64ExtendI32S => {
                let v = pop(stack).as_i32();
                stack.push(UntypedValue::from(v as i64));
            }
            I64ExtendI32U => {
                let v = pop(stack).as_u32();
                stack.push(UntypedValue::from(v as u64));
            }
            Return | OpJmp | OpJmpZ | OpJmpNz | BrTable | OpDiscard | OpDiscardPreserveTop | Call | CallIndirect => {
                unreachable!("control primitives and calls are handled inline by the main loop, not by dispatch")
            }
        }
        Ok(())
    }
}

fn load_int(memory: &[u8], addr: u32, offset: u32, width: usize) -> u64 {
    let range = checked_range(memory.len(), addr, offset, width);
    let mut buf = [0u8; 8];
    buf[..width].copy_from_slice(&memory[range]);
    u64::from_le_bytes(buf)
}

fn binop_i32(stack: &mut Vec<UntypedValue>, f: impl Fn(u32, u32) -> u32) {
    let b = pop(stack).as_u32();
    let a = pop(stack).as_u32();
    stack.push(UntypedValue::from(f(a, b)));
}

fn binop_i32s(stack: &mut Vec<UntypedValue>, f: impl Fn(i32, i32) -> u32) {
    let b = pop(stack).as_i32();
    let a = pop(stack).as_i32();
    stack.push(UntypedValue::from(f(a, b)));
}

fn binop_i64(stack: &mut Vec<UntypedValue>, f: impl Fn(u64, u64) -> u32) {
    let b = pop(stack).as_u64();
    let a = pop(stack).as_u64();
    stack.push(UntypedValue::from(f(a, b)));
}

fn binop_i64_wrap(stack: &mut Vec<UntypedValue>, f: impl Fn(u64, u64) -> u64) {
    let b = pop(stack).as_u64();
    let a = pop(stack).as_u64();
    stack.push(UntypedValue::from(f(a, b)));
}

fn binop_i64s(stack: &mut Vec<UntypedValue>, f: impl Fn(i64, i64) -> u32) {
    let b = pop(stack).as_i64();
    let a = pop(stack).as_i64();
    stack.push(UntypedValue::from(f(a, b)));
}
