use beadwork::cli::{self, Cli};
use beadwork::logging::init_logging;
use clap::Parser;

fn main() {
    let args = Cli::parse();

    if let Err(e) = init_logging(args.verbose, args.quiet) {
        eprintln!("Failed to initialize logging: {e}");
    }

    if let Err(e) = cli::run(args) {
        eprintln!("Error: {e}");
        if let Some(hint) = e.suggestion() {
            eprintln!("Hint: {hint}");
        }
        std::process::exit(e.exit_code());
    }
}
