mod cli;
mod config;
mod filter;
mod log;
mod paths;
mod remover;

use anyhow::Result;

fn main() -> Result<()> {
    cli::run()
}
