use clap::Parser;
use gaswasm::module::ExportKind;
use gaswasm::{compile, EngineError, GasAccountant, HostRegistry, UntypedValue, Vm, VmConfig};
use log::debug;

mod demo;

/// Runs the bundled `fib(n)` demo module under a gas budget and prints the
/// result, or the trap/error that stopped execution.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Argument passed to `fib`.
    #[arg(long, default_value_t = 10)]
    n: i32,

    #[arg(long, default_value_t = 1)]
    gas_price: u64,

    #[arg(long, default_value_t = 1_000_000)]
    gas_limit: u64,

    #[arg(long, default_value_t = 1)]
    gas_factor: u64,

    #[arg(long, default_value_t = 1024)]
    call_stack_depth: u32,

    #[arg(long, default_value_t = false)]
    recover_panic: bool,
}

fn run(args: Args) -> Result<Option<i64>, EngineError> {
    let module = demo::fib_module();
    let hosts = HostRegistry::<()>::new();
    let compiled = compile(&module, &hosts)?;

    let fn_idx = compiled
        .exports()
        .iter()
        .find_map(|e| match e.kind {
            ExportKind::Function(idx) if &*e.name == "fib" => Some(idx),
            _ => None,
        })
        .expect("demo module always exports \"fib\"");

    let config = VmConfig::default()
        .with_call_stack_depth(args.call_stack_depth)
        .with_recover_panic(args.recover_panic);
    let mut vm = Vm::new(compiled, config, ())?;

    let mut gas = GasAccountant::new(args.gas_price, args.gas_limit, args.gas_factor);
    vm.set_gas(&mut gas);

    debug!("running fib({}) with gas_limit={}", args.n, args.gas_limit);
    let result = vm.exec_code(fn_idx, &[UntypedValue::from(args.n)])?;
    Ok(result.map(|v| v.as_i64()))
}

fn main() {
    let args = Args::parse();
    match run(args) {
        Ok(Some(v)) => println!("{v}"),
        Ok(None) => println!("(no return value)"),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}

#[ctor::ctor]
fn log_init() {
    let init_res =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).try_init();
    if let Err(e) = init_res {
        panic!("failed to init logger: {}", e);
    }
}
