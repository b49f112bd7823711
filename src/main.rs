use anyhow::Result;
use clap::Parser;

use tiercache::{cli::Cli, logging, run, settings::Settings};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(&cli)?;
    logging::init_logger(settings.log)?;
    let output = run(&cli.command, &settings).await?;
    print!("{output}");
    Ok(())
}
