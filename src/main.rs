use anyhow::Result;
use clap::Parser;
use oscq_finder::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    oscq_finder::run(Cli::parse()).await
}
