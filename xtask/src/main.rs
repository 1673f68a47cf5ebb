mod cli;
mod scripts;

use clap::{CommandFactory, Parser};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let app = cli::App::parse();

    match &app.command {
        Some(cli::Commands::Build(args)) => scripts::build(args),
        Some(cli::Commands::Install(args)) => scripts::install(args),
        Some(cli::Commands::Test(args)) => scripts::test(args),
        None => {
            cli::App::command().print_help()?;
            Ok(())
        }
    }
}
