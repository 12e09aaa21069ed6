use std::path::PathBuf;

use anyhow::Context;
use clap::Args;

use handover_core::config::{Audience, HandoverConfig, ProviderKind};
use handover_core::pipeline::run_pipeline;
use handover_core::progress::ProgressSender;
use handover_core::schedule::CancelFlag;

use crate::progress::ProgressRenderer;

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Repository to analyze
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Output directory for the generated documents
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// LLM provider (anthropic, openai, azure, ollama, groq, together, deepseek, custom)
    #[arg(long)]
    pub provider: Option<String>,

    /// Provider-specific model id
    #[arg(long)]
    pub model: Option<String>,

    /// Target audience for the documents
    #[arg(long, value_parser = ["human", "ai"])]
    pub audience: Option<String>,

    /// Skip cache reads (writes still happen)
    #[arg(long)]
    pub no_cache: bool,

    /// Skip LLM rounds entirely
    #[arg(long)]
    pub static_only: bool,
}

#[derive(Args, Debug)]
pub struct StaticArgs {
    /// Repository to analyze
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Output directory for the generated documents
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub async fn run(args: GenerateArgs, quiet: bool) -> anyhow::Result<()> {
    let repo_root = args
        .path
        .canonicalize()
        .with_context(|| format!("Cannot resolve path: {}", args.path.display()))?;

    let mut config = HandoverConfig::load(&repo_root)?;
    apply_overrides(&mut config, &args)?;

    let (events, rx) = ProgressSender::channel(256);
    let renderer = ProgressRenderer::spawn(rx, quiet);

    let summary = run_pipeline(&repo_root, config, None, events, CancelFlag::new()).await?;
    renderer.finish().await;

    if !quiet {
        println!(
            "\nGenerated {} documents in {}ms ({} files analyzed, {} cache hits, ${:.4})",
            summary.documents.len(),
            summary.duration_ms,
            summary.file_count,
            summary.cache_hits,
            summary.total_cost_usd
        );
        for doc in &summary.documents {
            println!("  {} [{}]", doc.filename, doc.status);
        }
    }
    Ok(())
}

pub async fn run_static(args: StaticArgs, quiet: bool) -> anyhow::Result<()> {
    run(
        GenerateArgs {
            path: args.path,
            output: args.output,
            provider: None,
            model: None,
            audience: None,
            no_cache: false,
            static_only: true,
        },
        quiet,
    )
    .await
}

fn apply_overrides(config: &mut HandoverConfig, args: &GenerateArgs) -> anyhow::Result<()> {
    if let Some(output) = &args.output {
        config.output.dir = output.clone();
    }
    if let Some(provider) = &args.provider {
        config.provider = provider.parse::<ProviderKind>()?;
    }
    if let Some(model) = &args.model {
        config.model = Some(model.clone());
    }
    if let Some(audience) = &args.audience {
        config.audience = if audience == "ai" {
            Audience::Ai
        } else {
            Audience::Human
        };
    }
    if args.no_cache {
        config.cache.no_cache = true;
    }
    if args.static_only {
        config.analysis.static_only = true;
    }
    config.validate()?;
    Ok(())
}
