use clap::Parser;
use datamall_cli::cli_args::Cli;

fn main() {
    let cli = Cli::parse();
    if let Err(err) = datamall_cli::run(cli) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
