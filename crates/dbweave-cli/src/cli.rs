use clap::{Parser, Subcommand};

use crate::check::{CheckArgs, run_check};
use crate::error::Result;
use crate::run::{RunArgs, run_page};

#[derive(Debug, Parser)]
#[command(
    name = "dbweave",
    about = "Validate and run pages of database-backed components",
    version
)]
pub struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Validate properties and dependencies without contacting the service.
    Check(CheckArgs),

    /// Mount the page against the query service and print component states.
    Run(RunArgs),
}

pub fn run_from_env() -> Result<()> {
    let cli = Cli::parse();
    run(cli)
}

pub fn run(cli: Cli) -> Result<()> {
    crate::logging::init(cli.log_json);
    match cli.command {
        Commands::Check(args) => run_check(args),
        Commands::Run(args) => run_page(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_accepts_service_override() {
        let cli = Cli::try_parse_from([
            "dbweave",
            "run",
            "--manifest",
            "page.json",
            "--service",
            "http://localhost:3000",
            "--json",
        ])
        .expect("parse");
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.service.as_deref(), Some("http://localhost:3000"));
        assert!(args.json);
    }
}
