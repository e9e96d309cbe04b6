use crate::types::UntypedValue;
use crate::vm::compiled_module::CompiledModule;
use crate::vm::config::VmConfig;
use crate::vm::error::{ExecError, SetupError};
use crate::vm::gas::GasAccountant;
use alloc::vec::Vec;
use log::debug;

/// One execution context bound to a [`CompiledModule`]: the mutable state
/// described in the crate docs (operand stack, locals, linear memory,
/// globals, PC, call-stack depth, abort flag, gas, host data) plus the
/// read-only handle to the shared compiled functions and memory/globals
/// images it was seeded from.
///
/// `T` is the embedder's opaque host-data type, threaded through to every
/// [`crate::vm::Process`] a host function receives. `'g` is the borrow of
/// the embedder-owned [`GasAccountant`] a VM may be wired to via
/// [`Vm::set_gas`] (see crate docs §4.7 and §9, "shared mutable gas
/// state").
///
/// Fields are `pub(crate)` rather than private: the interpreter loop,
/// dispatch, and host-call trampoline (in the sibling `interpreter`
/// module) need simultaneous disjoint borrows of several of them (e.g.
/// memory, abort, and host_data at once for a [`crate::vm::Process`]),
/// which only works through direct field access in the same crate, not
/// through `&mut self` accessor methods.
pub struct Vm<'g, T> {
    pub(crate) module: CompiledModule<T>,
    pub(crate) memory: Vec<u8>,
    pub(crate) globals: Vec<UntypedValue>,
    pub(crate) config: VmConfig,
    pub(crate) abort: bool,
    pub(crate) call_stack_depth: u32,
    pub(crate) gas: Option<&'g mut GasAccountant>,
    pub(crate) host_data: T,
    /// The entry-point frame's operand-stack buffer, reused across
    /// successive [`Vm::exec_code`] calls when its capacity already
    /// suffices (see crate docs §4.2, Entry step 4). Nested calls made
    /// from within one `exec_code` invocation allocate their own frame
    /// buffers instead, since every frame on the explicit call stack is
    /// concurrently alive for the duration of the call and cannot share
    /// this one.
    pub(crate) stack_buf: Vec<UntypedValue>,
}

impl<'g, T> Vm<'g, T> {
    /// Constructs a VM bound to `module`, per the VM-construction steps in
    /// the crate docs: enforce the memory limit, duplicate the memory and
    /// globals images, and start with a clean abort/stack/locals state.
    pub fn new(module: CompiledModule<T>, config: VmConfig, host_data: T) -> Result<Self, SetupError> {
        let memory = module.memory_image().to_vec();
        let limit = config.memory_limit_bytes();
        if memory.len() as u32 > limit {
            return Err(SetupError::MemoryLimitExceeded {
                len: memory.len() as u32,
                limit,
            });
        }
        let globals = module.globals_image().to_vec();
        debug!(
            "vm constructed: memory {} bytes (limit {}), {} globals, call stack depth {}",
            memory.len(),
            limit,
            globals.len(),
            config.call_stack_depth()
        );
        Ok(Self {
            module,
            memory,
            globals,
            config,
            abort: false,
            call_stack_depth: config.call_stack_depth(),
            gas: None,
            host_data,
            stack_buf: Vec::new(),
        })
    }

    /// The raw linear memory backing this VM, for embedders that need to
    /// seed or inspect it outside of a host call (see crate docs §9B).
    pub fn memory(&self) -> &[u8] {
        &self.memory
    }

    pub fn set_host_data(&mut self, host_data: T) {
        self.host_data = host_data;
    }

    pub fn host_data(&self) -> &T {
        &self.host_data
    }

    pub fn host_data_mut(&mut self) -> &mut T {
        &mut self.host_data
    }

    /// Wires an embedder-owned gas budget into this VM. The accountant is
    /// shared by mutable reference (see crate docs §4.7, §9): deductions
    /// applied during `exec_code` are visible to the caller once control
    /// returns, and the same accountant can be threaded through several
    /// VMs or several `exec_code` calls to enforce one budget across all
    /// of them.
    pub fn set_gas(&mut self, gas: &'g mut GasAccountant) {
        self.gas = Some(gas);
    }

    pub fn set_call_stack_depth(&mut self, depth: u32) {
        self.config = self.config.with_call_stack_depth(depth);
    }

    pub fn set_recover_panic(&mut self, recover: bool) {
        self.config = self.config.with_recover_panic(recover);
    }

    pub fn abort_requested(&self) -> bool {
        self.abort
    }

    /// Executes the module-local function at `fn_index` with `args`, per
    /// the entry/main-loop/exit contract in the crate docs §4.2.
    pub fn exec_code(&mut self, fn_index: u32, args: &[UntypedValue]) -> Result<Option<UntypedValue>, ExecError> {
        self.abort = false;
        self.call_stack_depth = self.config.call_stack_depth();

        let slot = self
            .module
            .funcs()
            .get(fn_index as usize)
            .ok_or(SetupError::InvalidFunctionIndex { index: fn_index })?;
        let compiled = slot
            .as_local()
            .ok_or(SetupError::EntryPointIsHostFunction { index: fn_index })?;
        if args.len() as u32 != compiled.args {
            return Err(SetupError::InvalidArgumentCount {
                expected: compiled.args,
                found: args.len() as u32,
            }
            .into());
        }

        self.enter_and_run(fn_index, args)
    }
}
