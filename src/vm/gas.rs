/// Per-execution gas metering, shared by mutable reference across however
/// many [`crate::vm::Vm::exec_code`] calls the embedder wants to thread a
/// single budget through.
///
/// Charging is integer-normalized: a handler doesn't cost a "gas unit"
/// directly, it costs one local step, and steps are batched into gas units
/// by `gas_factor` so that a budget can be denominated more coarsely than
/// one unit per opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GasAccountant {
    pub gas_price: u64,
    pub gas_limit: u64,
    pub gas_factor: u64,
    pub local_counter: u64,
}

impl GasAccountant {
    pub fn new(gas_price: u64, gas_limit: u64, gas_factor: u64) -> Self {
        Self {
            gas_price,
            gas_limit,
            gas_factor,
            local_counter: 0,
        }
    }

    /// Charges one local step. Returns `false` if the normalized charge this
    /// step crosses into would exceed `gas_limit`, in which case `gas_limit`
    /// is left untouched — only `local_counter` advances either way.
    pub fn charge_step(&mut self) -> bool {
        self.local_counter += 1;
        let normalized = self.local_counter / self.gas_factor;
        self.local_counter %= self.gas_factor;
        if normalized == 0 {
            true
        } else if self.gas_limit >= normalized {
            self.gas_limit -= normalized;
            true
        } else {
            false
        }
    }
}
