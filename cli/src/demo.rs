//! A single self-contained module (recursive `fib(n)`) used to exercise the
//! engine end to end without a Wasm binary parser, which this crate
//! deliberately doesn't have (see `gaswasm`'s crate docs, OUT OF SCOPE).
//!
//! The body below is what an external disassembler would hand the compiler
//! for:
//!
//! ```wat
//! (func (param $n i32) (result i32)
//!   (if (result i32) (i32.lt_s (local.get $n) (i32.const 2))
//!     (then (local.get $n))
//!     (else
//!       (i32.add
//!         (call 0 (i32.sub (local.get $n) (i32.const 1)))
//!         (call 0 (i32.sub (local.get $n) (i32.const 2)))))))
//! ```

use gaswasm::module::{Export, ExportKind, FuncType, Function, FunctionKind};
use gaswasm::types::{DisasmOp, Opcode};
use gaswasm::{Module, ValueType};

pub fn fib_module() -> Module {
    let body = vec![
        DisasmOp::LocalGet { index: 0 },
        DisasmOp::I32Const(2),
        DisasmOp::Plain(Opcode::I32LtS),
        DisasmOp::If { result: Some(ValueType::I32) },
        DisasmOp::LocalGet { index: 0 },
        DisasmOp::Else,
        DisasmOp::LocalGet { index: 0 },
        DisasmOp::I32Const(1),
        DisasmOp::Plain(Opcode::I32Sub),
        DisasmOp::Call { func_idx: 0 },
        DisasmOp::LocalGet { index: 0 },
        DisasmOp::I32Const(2),
        DisasmOp::Plain(Opcode::I32Sub),
        DisasmOp::Call { func_idx: 0 },
        DisasmOp::Plain(Opcode::I32Add),
        DisasmOp::End,
        DisasmOp::End,
    ];

    Module {
        func_types: vec![FuncType::new(vec![ValueType::I32], Some(ValueType::I32))],
        functions: vec![Function {
            type_idx: 0,
            kind: FunctionKind::Local { locals: vec![], body },
        }],
        globals: vec![],
        memory: None,
        table: None,
        imports: vec![],
        exports: vec![Export {
            name: "fib".into(),
            kind: ExportKind::Function(0),
        }],
        data: vec![],
        start: None,
    }
}
