use anyhow::Result;
use clap::Parser;
use ridgeline_route::cli::{init_logging, Cli};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_json);
    cli.run()
}
