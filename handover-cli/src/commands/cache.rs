use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Subcommand};

use handover_core::cache::RoundCache;
use handover_core::config::HandoverConfig;

#[derive(Args, Debug)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub action: CacheAction,
}

#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Show cache entry count and location
    Stats {
        /// Repository whose cache to inspect
        #[arg(default_value = ".")]
        path: PathBuf,
    },
    /// Remove every cached round result
    Flush {
        /// Repository whose cache to flush
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

#[allow(clippy::unused_async)]
pub async fn run(args: CacheArgs) -> anyhow::Result<()> {
    match args.action {
        CacheAction::Stats { path } => {
            let (repo_root, config, cache) = open(&path)?;
            println!(
                "{} cached round entries under {}",
                cache.entry_count(),
                repo_root.join(&config.cache.dir).display()
            );
        }
        CacheAction::Flush { path } => {
            let (_, _, cache) = open(&path)?;
            cache.flush().context("Cannot flush cache")?;
            println!("Cache flushed");
        }
    }
    Ok(())
}

fn open(path: &Path) -> anyhow::Result<(PathBuf, HandoverConfig, RoundCache)> {
    let repo_root = path
        .canonicalize()
        .with_context(|| format!("Cannot resolve path: {}", path.display()))?;
    let config = HandoverConfig::load(&repo_root)?;
    let cache = RoundCache::open(&repo_root, &config);
    Ok((repo_root, config, cache))
}
