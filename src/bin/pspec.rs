use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use pspec::runner::{run_spec_tests, ConsoleReporter};

/// Run every `.pspec` file under a directory tree.
#[derive(Parser)]
#[command(name = "pspec", version, about)]
struct Args {
    /// Directory to scan for `.pspec` files.
    root: PathBuf,

    /// Disable colored output.
    #[arg(long)]
    no_color: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let mut reporter = if args.no_color {
        ConsoleReporter::with_colors(false)
    } else {
        ConsoleReporter::new()
    };
    match run_spec_tests(&mut reporter, &args.root, None) {
        Ok(summary) => {
            reporter.print_summary();
            if summary.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            eprintln!("{:?}", miette::Report::new(e));
            ExitCode::FAILURE
        }
    }
}
