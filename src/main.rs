//! Tarko CLI binary entry point.

use clap::Parser;
use tarko::cli::Cli;

fn main() {
    let cli = Cli::parse();
    match tarko::cli::run(cli.command) {
        Ok(output) => println!("{output}"),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
