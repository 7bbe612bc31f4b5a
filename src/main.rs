mod cli;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use log::info;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    gitlab_context::output::print_banner();

    let cli = Cli::parse();
    info!("Starting gitlab-context");
    cli.execute().await?;

    Ok(())
}
