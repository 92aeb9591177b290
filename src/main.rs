use clap::Parser;
use reshelf::cli::{Cli, run_cli};
use reshelf::logging::init_tracing;
use reshelf::output::OutputFormatter;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run_cli(&cli) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            OutputFormatter::error(&e);
            ExitCode::FAILURE
        }
    }
}
