use anyhow::Result;
use clap::Parser;

use vmsim::{setup_logging, Cli, SimConfig, Simulation};

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging();

    let config = SimConfig::from_cli(cli)?;
    let simulation = Simulation::new(config)?;
    let report = simulation.run();
    print!("{report}");

    Ok(())
}
