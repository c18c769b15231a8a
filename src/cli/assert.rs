use std::path::PathBuf;
use std::process;

use clap::Args;
use valgraph::config::{EngineConfig, TestMode};
use valgraph::equiv::{assert_execution, render, ActualVariables};
use valgraph::eval::{bind_actuals, check, Heap};

use super::load_and_convert;

#[derive(Args)]
pub struct AssertArgs {
    /// JSON file with execution records
    pub input: PathBuf,
    /// Generate bodies shared by all executions of a method
    #[arg(long)]
    pub parameterized: bool,
    /// Run each generated block against the execution's own values
    #[arg(long)]
    pub check: bool,
}

pub fn cmd_assert(args: AssertArgs, config: &EngineConfig) {
    let mut equivalence = config.equivalence.clone();
    if args.parameterized {
        equivalence.mode = TestMode::Parameterized;
    }

    let outcome = load_and_convert(&args.input, config);
    let samples = if equivalence.is_parameterized() {
        outcome.samples_by_method(equivalence.max_depth)
    } else {
        Default::default()
    };

    let mut failed = 0usize;
    for (i, execution) in outcome.executions.iter().enumerate() {
        let actual = ActualVariables::conventional(execution);
        let statements = match assert_execution(
            execution,
            &actual,
            &config.types,
            &equivalence,
            samples.get(&execution.method),
        ) {
            Ok(statements) => statements,
            Err(e) => {
                eprintln!("error: [{}] {}: {}", i, execution.method, e);
                process::exit(1);
            }
        };

        println!("// [{}] {}", i, execution.summary());
        print!("{}", render(&statements));

        if args.check {
            let mut heap = Heap::new();
            let report = bind_actuals(&mut heap, execution, &actual).and_then(|bindings| {
                check(&statements, &bindings, &mut heap, &execution.arena, &config.types)
            });
            match report {
                Ok(report) => {
                    if !report.is_equivalent() {
                        failed += 1;
                    }
                    eprintln!("[{}] {}\n{}", i, execution.method, report.format_report());
                }
                Err(e) => {
                    failed += 1;
                    eprintln!("[{}] {}: cannot check: {}", i, execution.method, e);
                }
            }
        }
        println!();
    }

    if failed > 0 {
        eprintln!("{} execution(s) not equivalent to their own values", failed);
        process::exit(1);
    }
}
