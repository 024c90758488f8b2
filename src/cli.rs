//! CLI argument parsing and process entry points.
//!
//! Exposed separately from `main.rs` so the same entry point can also be
//! called from the PyO3 extension module in `lib.rs`.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::scheduler::DistMode;
use crate::{driver, output, worker};

#[derive(Parser, Debug)]
#[command(name = "parrun", version, about = "Parallel, group-aware test runner")]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path(s) to test files or directories
    #[arg(default_value = ".")]
    pub paths: Vec<PathBuf>,

    /// Selects the in-repo runner. Only `native` is supported.
    #[arg(long, default_value = "native")]
    pub runner: String,

    /// Number of worker processes (default: available parallelism)
    #[arg(short = 'n', long = "numprocesses")]
    pub numprocesses: Option<usize>,

    /// Distribution strategy: `load` or `loadgroup`
    #[arg(long, default_value = "load")]
    pub dist: String,

    /// Discover tests and print their node ids without running them
    #[arg(long)]
    pub collect_only: bool,

    /// Verbose output, including tracebacks
    #[arg(short, long)]
    pub verbose: bool,

    /// Generate markdown documentation for the CLI
    #[arg(long, hide = true)]
    pub markdown_help: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Internal worker entry point, invoked by the driver as a subprocess.
    #[command(hide = true)]
    Worker {
        #[arg(long)]
        root: PathBuf,
        #[arg(long)]
        out: PathBuf,
        files: Vec<PathBuf>,
    },
}

/// Run the CLI with arguments from the environment. Returns the exit code.
pub fn run() -> i32 {
    let args = Args::parse();
    run_with_parsed_args(args)
}

/// Run the CLI with the given arguments (used by integration tests and the
/// extension module). Returns the exit code.
pub fn run_with_args(args: Vec<String>) -> i32 {
    match Args::try_parse_from(args) {
        Ok(args) => run_with_parsed_args(args),
        Err(e) => {
            eprintln!("{e}");
            2
        }
    }
}

pub fn generate_markdown_help() -> String {
    clap_markdown::help_markdown::<Args>()
}

fn run_with_parsed_args(args: Args) -> i32 {
    if args.markdown_help {
        print!("{}", clap_markdown::help_markdown::<Args>());
        return 0;
    }

    let result = match args.command {
        Some(Commands::Worker { root, out, files }) => run_worker(&root, &out, &files),
        None => run_tests(args),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            2
        }
    }
}

fn run_worker(root: &PathBuf, out: &PathBuf, files: &[PathBuf]) -> Result<i32> {
    let all_ok = worker::run(root, out, files)?;
    Ok(if all_ok { 0 } else { 1 })
}

fn run_tests(args: Args) -> Result<i32> {
    if args.runner != "native" {
        eprintln!("error: unsupported runner `{}`; only `native` is available", args.runner);
        return Ok(2);
    }

    let Some(mode) = DistMode::parse(&args.dist) else {
        eprintln!("error: unknown distribution mode `{}` (expected `load` or `loadgroup`)", args.dist);
        return Ok(2);
    };

    if args.collect_only {
        let nodeids = driver::collect(&args.paths)?;
        if nodeids.is_empty() {
            output::print_no_tests_found();
        } else {
            output::print_collected(&nodeids);
        }
        return Ok(0);
    }

    let num_workers = args.numprocesses.unwrap_or_else(|| {
        std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
    });

    let root = std::env::current_dir()?;
    let printer = output::ProgressPrinter::new(args.verbose);

    let summary = driver::run(&root, &args.paths, num_workers, mode, |outcome| {
        printer.print_result(outcome);
    })?;

    output::print_summary(&summary);
    Ok(summary.exit_code())
}
