mod cli;
mod paths;
mod run;

use anyhow::{bail, Result};
use backdrop::BackgroundStatus;
use cli::{Command, RunArgs};

fn main() -> Result<()> {
    let cli = cli::parse();
    run::initialise_tracing();
    let settings = run::load_config(cli.config.as_deref())?;

    match cli.command.unwrap_or_else(|| Command::Run(RunArgs::default())) {
        Command::Run(args) => run::run(args, &settings),
        Command::Simulate(args) => {
            let expect_unsupported = args.unsupported;
            let report = run::simulate(args, &settings)?;
            println!("{report}");
            if !expect_unsupported && report.status != BackgroundStatus::Running {
                bail!("background did not reach the running state");
            }
            Ok(())
        }
        Command::Still(args) => {
            let path = run::still(args, &settings)?;
            println!("Wrote {}", path.display());
            Ok(())
        }
    }
}
