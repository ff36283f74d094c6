use clap::Parser;
use tscribe_core::logging::init_logging;
use tscribe_core::{run, Cli};

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_json, cli.verbose, cli.quiet);
    let code = run(&cli);
    std::process::exit(code.as_i32());
}
