pub mod cache;
pub mod generate;

use clap::Subcommand;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Analyze a repository and generate the knowledge base
    Generate(generate::GenerateArgs),
    /// Generate from static analysis only (no LLM calls)
    Static(generate::StaticArgs),
    /// Inspect or flush the round cache
    Cache(cache::CacheArgs),
}

pub async fn run(cmd: Command, quiet: bool) -> anyhow::Result<()> {
    match cmd {
        Command::Generate(args) => generate::run(args, quiet).await,
        Command::Static(args) => generate::run_static(args, quiet).await,
        Command::Cache(args) => cache::run(args).await,
    }
}
