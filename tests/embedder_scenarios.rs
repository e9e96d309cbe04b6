//! End-to-end embedder-API scenarios: build a [`Module`] by hand (the same
//! way `gaswasm-cli`'s bundled demo does, since this crate has no Wasm
//! binary parser), bind it against a host registry, construct a [`Vm`], and
//! drive `exec_code` the way an embedder actually would.

use gaswasm::module::{Export, ExportKind, FuncType, Function, FunctionKind};
use gaswasm::types::{DisasmOp, Opcode};
use gaswasm::{
    compile, ExecError, GasAccountant, HostFunction, HostRegistry, ImportName, Module, TrapCode, UntypedValue,
    ValueKind, ValueType, Vm, VmConfig,
};
use std::cell::Cell;
use std::rc::Rc;

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

/// Scenario: a host call with a zero-arg void signature.
#[test]
fn host_call_with_zero_arg_void_signature() {
    let called = Rc::new(Cell::new(false));
    let called_in_host = called.clone();

    let mut hosts = HostRegistry::<()>::new();
    hosts.insert_function(
        ImportName::new("env", "ping"),
        HostFunction::new(vec![ValueKind::Ptr], None, move |_proc, _args| {
            called_in_host.set(true);
            None
        }),
    );

    let module = Module {
        func_types: vec![FuncType::new(Vec::new(), None), FuncType::new(Vec::new(), None)],
        functions: vec![
            Function {
                type_idx: 0,
                kind: FunctionKind::Import { module: "env".into(), field: "ping".into() },
            },
            Function {
                type_idx: 1,
                kind: FunctionKind::Local { locals: Vec::new(), body: vec![DisasmOp::Call { func_idx: 0 }, DisasmOp::End] },
            },
        ],
        exports: vec![Export { name: "run".into(), kind: ExportKind::Function(1) }],
        ..blank_module()
    };

    let compiled = compile(&module, &hosts).unwrap();
    let mut vm = Vm::new(compiled, VmConfig::default(), ()).unwrap();
    let result = vm.exec_code(1, &[]).unwrap();
    assert_eq!(result, None);
    assert!(called.get(), "host function was never invoked");
}

/// Scenario: a host call with an `i32 -> i32` signature.
#[test]
fn host_call_with_i32_to_i32_signature() {
    let mut hosts = HostRegistry::<()>::new();
    hosts.insert_function(
        ImportName::new("env", "double"),
        HostFunction::new(vec![ValueKind::Ptr, ValueKind::Value(ValueType::I32)], Some(ValueType::I32), |_proc, args| {
            Some(args[0] * 2)
        }),
    );

    let module = Module {
        func_types: vec![
            FuncType::new(vec![ValueType::I32], Some(ValueType::I32)),
            FuncType::new(vec![ValueType::I32], Some(ValueType::I32)),
        ],
        functions: vec![
            Function {
                type_idx: 0,
                kind: FunctionKind::Import { module: "env".into(), field: "double".into() },
            },
            Function {
                type_idx: 1,
                kind: FunctionKind::Local {
                    locals: Vec::new(),
                    body: vec![DisasmOp::LocalGet { index: 0 }, DisasmOp::Call { func_idx: 0 }, DisasmOp::End],
                },
            },
        ],
        exports: vec![Export { name: "run".into(), kind: ExportKind::Function(1) }],
        ..blank_module()
    };

    let compiled = compile(&module, &hosts).unwrap();
    let mut vm = Vm::new(compiled, VmConfig::default(), ()).unwrap();
    let result = vm.exec_code(1, &[UntypedValue::from(21i32)]).unwrap();
    assert_eq!(result.unwrap().as_i32(), 42);
}

/// Scenario: a host function registered without the mandatory `Ptr`
/// parameter in position zero traps with the exact documented wording.
#[test]
fn host_mis_signature_traps_with_the_documented_message() {
    let mut hosts = HostRegistry::<()>::new();
    hosts.insert_function(
        ImportName::new("env", "broken"),
        HostFunction::new(vec![ValueKind::Value(ValueType::I32)], None, |_proc, _args| None),
    );

    let module = Module {
        func_types: vec![FuncType::new(Vec::new(), None), FuncType::new(Vec::new(), None)],
        functions: vec![
            Function {
                type_idx: 0,
                kind: FunctionKind::Import { module: "env".into(), field: "broken".into() },
            },
            Function {
                type_idx: 1,
                kind: FunctionKind::Local { locals: Vec::new(), body: vec![DisasmOp::Call { func_idx: 0 }, DisasmOp::End] },
            },
        ],
        exports: vec![Export { name: "run".into(), kind: ExportKind::Function(1) }],
        ..blank_module()
    };

    let compiled = compile(&module, &hosts).unwrap();
    let mut vm = Vm::new(compiled, VmConfig::default().with_recover_panic(true), ()).unwrap();
    let err = vm.exec_code(1, &[]).unwrap_err();
    assert_eq!(err, ExecError::Trap(TrapCode::HostSignatureMismatch { found: ValueType::I32 }));
    assert_eq!(err.to_string(), "trap: the first argument of a host function was int32, expected ptr");
}

/// Scenario: a host function calls `Process::terminate`, which suppresses
/// the declared return value even though the function otherwise runs to
/// completion.
#[test]
fn host_initiated_termination_suppresses_the_return_value() {
    let mut hosts = HostRegistry::<()>::new();
    hosts.insert_function(
        ImportName::new("env", "halt"),
        HostFunction::new(vec![ValueKind::Ptr], None, |proc, _args| {
            proc.terminate();
            None
        }),
    );

    let module = Module {
        func_types: vec![FuncType::new(Vec::new(), None), FuncType::new(Vec::new(), Some(ValueType::I32))],
        functions: vec![
            Function {
                type_idx: 0,
                kind: FunctionKind::Import { module: "env".into(), field: "halt".into() },
            },
            Function {
                type_idx: 1,
                kind: FunctionKind::Local {
                    locals: Vec::new(),
                    body: vec![DisasmOp::Call { func_idx: 0 }, DisasmOp::I32Const(99), DisasmOp::End],
                },
            },
        ],
        exports: vec![Export { name: "run".into(), kind: ExportKind::Function(1) }],
        ..blank_module()
    };

    let compiled = compile(&module, &hosts).unwrap();
    let mut vm = Vm::new(compiled, VmConfig::default(), ()).unwrap();
    let result = vm.exec_code(1, &[]).unwrap();
    assert_eq!(result, None, "abort must suppress the i32.const 99 the body would otherwise push");
    assert!(vm.abort_requested());
}

/// Scenario: unbounded recursion trips the call-stack depth guard at the
/// depth an embedder would actually configure. Guest calls run on an
/// explicit heap call stack, not native recursion, so a depth this large
/// traps cleanly instead of overflowing the test runner's own thread stack.
#[test]
fn unbounded_recursion_trips_the_call_stack_depth_guard() {
    let hosts = HostRegistry::<()>::new();

    let module = Module {
        func_types: vec![FuncType::new(Vec::new(), None)],
        functions: vec![Function {
            type_idx: 0,
            kind: FunctionKind::Local { locals: Vec::new(), body: vec![DisasmOp::Call { func_idx: 0 }, DisasmOp::End] },
        }],
        exports: vec![Export { name: "run".into(), kind: ExportKind::Function(0) }],
        ..blank_module()
    };

    let compiled = compile(&module, &hosts).unwrap();
    let config = VmConfig::default().with_call_stack_depth(100_000).with_recover_panic(true);
    let mut vm = Vm::new(compiled, config, ()).unwrap();
    let err = vm.exec_code(0, &[]).unwrap_err();
    assert_eq!(err, ExecError::Trap(TrapCode::CallStackDepthExceeded));
}

/// Scenario: a tight loop exhausts a small gas budget before it can run to
/// completion.
#[test]
fn gas_exhaustion_in_a_tight_loop() {
    let hosts = HostRegistry::<()>::new();

    // (loop $l (br $l))  -- an unconditional infinite loop, never reached by
    // a br_if, just a bare branch back to the loop header.
    let module = Module {
        func_types: vec![FuncType::new(Vec::new(), None)],
        functions: vec![Function {
            type_idx: 0,
            kind: FunctionKind::Local {
                locals: Vec::new(),
                body: vec![
                    DisasmOp::Loop { result: None },
                    DisasmOp::Br { label: 0 },
                    DisasmOp::End,
                    DisasmOp::End,
                ],
            },
        }],
        exports: vec![Export { name: "run".into(), kind: ExportKind::Function(0) }],
        ..blank_module()
    };

    let compiled = compile(&module, &hosts).unwrap();
    let mut vm = Vm::new(compiled, VmConfig::default(), ()).unwrap();
    let mut gas = GasAccountant::new(1, 10, 5);
    vm.set_gas(&mut gas);

    let err = vm.exec_code(0, &[]).unwrap_err();
    drop(vm);
    assert_eq!(err, ExecError::GasExhausted);
    assert_eq!(gas.gas_limit, 0);
}

/// Integer division by zero traps, independent of gas or call depth.
#[test]
fn integer_divide_by_zero_traps() {
    let hosts = HostRegistry::<()>::new();

    let module = Module {
        func_types: vec![FuncType::new(Vec::new(), Some(ValueType::I32))],
        functions: vec![Function {
            type_idx: 0,
            kind: FunctionKind::Local {
                locals: Vec::new(),
                body: vec![
                    DisasmOp::I32Const(1),
                    DisasmOp::I32Const(0),
                    DisasmOp::Plain(Opcode::I32DivS),
                    DisasmOp::End,
                ],
            },
        }],
        exports: vec![Export { name: "run".into(), kind: ExportKind::Function(0) }],
        ..blank_module()
    };

    let compiled = compile(&module, &hosts).unwrap();
    let mut vm = Vm::new(compiled, VmConfig::default().with_recover_panic(true), ()).unwrap();
    let err = vm.exec_code(0, &[]).unwrap_err();
    assert_eq!(err, ExecError::Trap(TrapCode::IntegerDivideByZero));
}

/// A value stored to linear memory and loaded back round-trips, exercising
/// the memory declaration, data-segment-free image, and the store/load
/// opcodes together.
#[test]
fn memory_store_then_load_round_trips() {
    use gaswasm::module::MemoryDecl;

    let hosts = HostRegistry::<()>::new();

    let module = Module {
        func_types: vec![FuncType::new(Vec::new(), Some(ValueType::I32))],
        functions: vec![Function {
            type_idx: 0,
            kind: FunctionKind::Local {
                locals: Vec::new(),
                body: vec![
                    DisasmOp::I32Const(0),
                    DisasmOp::I32Const(1234),
                    DisasmOp::Store { op: Opcode::I32Store, offset: 0 },
                    DisasmOp::I32Const(0),
                    DisasmOp::Load { op: Opcode::I32Load, offset: 0 },
                    DisasmOp::End,
                ],
            },
        }],
        memory: Some(MemoryDecl { initial_pages: 1, maximum_pages: 1 }),
        exports: vec![Export { name: "run".into(), kind: ExportKind::Function(0) }],
        ..blank_module()
    };

    let compiled = compile(&module, &hosts).unwrap();
    let mut vm = Vm::new(compiled, VmConfig::default(), ()).unwrap();
    let result = vm.exec_code(0, &[]).unwrap();
    assert_eq!(result.unwrap().as_i32(), 1234);
}
