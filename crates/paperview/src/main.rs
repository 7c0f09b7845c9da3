mod cli;
mod run;
mod window;

use anyhow::Result;
use cli::Command;

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();

    match cli.command {
        Some(Command::Check(args)) => run::check(args),
        Some(Command::Color(args)) => run::color(args),
        None => run::run(cli.run),
    }
}
