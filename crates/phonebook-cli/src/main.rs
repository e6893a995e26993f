use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    phonebook_cli::init_tracing();
    let cli = phonebook_cli::Cli::parse();
    phonebook_cli::run_cli(&cli)
}
