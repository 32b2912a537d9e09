use clap::Parser;
use sitekit::cli::{run_cli, Cli};
use sitekit::logging::{init_logging, LogConfig};

fn main() -> anyhow::Result<()> {
    init_logging(&LogConfig::from_env())?;
    run_cli(Cli::parse())
}
