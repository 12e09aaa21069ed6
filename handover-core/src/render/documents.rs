//! The fourteen document bodies.
//!
//! Renderers read typed round outputs when their rounds ran and fall back to
//! static analyzer data otherwise, so every document exists in every run.

use std::fmt::Write as _;

use crate::config::Audience;
use crate::rounds::architecture::ArchitectureOutput;
use crate::rounds::conventions::ConventionsOutput;
use crate::rounds::deployment::DeploymentOutput;
use crate::rounds::features::FeaturesOutput;
use crate::rounds::modules::ModulesOutput;
use crate::rounds::overview::OverviewOutput;
use crate::types::{DocumentReport, Round};

use super::RenderContext;

pub const INDEX_FILENAME: &str = "00-INDEX.md";

/// The thirteen content documents; the INDEX is rendered separately, last.
pub static DOCUMENTS: &[DocumentDef] = &[
    DocumentDef {
        filename: "01-OVERVIEW.md",
        title: "Overview",
        required_rounds: &[Round::Overview],
        render: render_overview,
    },
    DocumentDef {
        filename: "02-ARCHITECTURE.md",
        title: "Architecture",
        required_rounds: &[Round::Architecture],
        render: render_architecture,
    },
    DocumentDef {
        filename: "03-MODULES.md",
        title: "Modules",
        required_rounds: &[Round::Modules],
        render: render_modules,
    },
    DocumentDef {
        filename: "04-FEATURES.md",
        title: "Features",
        required_rounds: &[Round::Features],
        render: render_features,
    },
    DocumentDef {
        filename: "05-DATA-FLOW.md",
        title: "Data Flow",
        required_rounds: &[Round::Modules, Round::Architecture],
        render: render_data_flow,
    },
    DocumentDef {
        filename: "06-CONVENTIONS.md",
        title: "Conventions",
        required_rounds: &[Round::Conventions],
        render: render_conventions,
    },
    DocumentDef {
        filename: "07-TESTING.md",
        title: "Testing",
        required_rounds: &[],
        render: render_testing,
    },
    DocumentDef {
        filename: "08-DEPENDENCIES.md",
        title: "Dependencies",
        required_rounds: &[],
        render: render_dependencies,
    },
    DocumentDef {
        filename: "09-GIT-HISTORY.md",
        title: "Git History",
        required_rounds: &[],
        render: render_git_history,
    },
    DocumentDef {
        filename: "10-TODO-DEBT.md",
        title: "TODOs & Technical Debt",
        required_rounds: &[],
        render: render_todo_debt,
    },
    DocumentDef {
        filename: "11-ENVIRONMENT.md",
        title: "Environment",
        required_rounds: &[],
        render: render_environment,
    },
    DocumentDef {
        filename: "12-EDGE-CASES.md",
        title: "Edge Cases",
        required_rounds: &[Round::Conventions],
        render: render_edge_cases,
    },
    DocumentDef {
        filename: "13-DEPLOYMENT.md",
        title: "Deployment",
        required_rounds: &[Round::Deployment],
        render: render_deployment,
    },
];

pub use super::DocumentDef;

fn parse_round<T: serde::de::DeserializeOwned + Default>(
    ctx: &RenderContext<'_>,
    round: Round,
) -> Option<T> {
    ctx.round(round)
        .map(|r| serde_json::from_value(r.data.clone()).unwrap_or_default())
}

/// Prepend orientation prose for human readers. The `ai` audience gets the
/// dense lists and tables only. Applied after the body is built so the
/// renderers' empty-body fallback checks see content alone.
fn with_preamble(ctx: &RenderContext<'_>, intro: &str, body: String) -> String {
    match ctx.config.audience {
        Audience::Human => format!("{intro}\n\n{body}"),
        Audience::Ai => body,
    }
}

fn bullet_list(out: &mut String, items: &[String]) {
    for item in items {
        let _ = writeln!(out, "- {item}");
    }
}

// ── 01 Overview ────────────────────────────────────────────────────

fn render_overview(ctx: &RenderContext<'_>) -> Result<String, String> {
    let mut out = String::new();
    let overview: Option<OverviewOutput> = parse_round(ctx, Round::Overview);

    let name = ctx
        .config
        .project
        .name
        .clone()
        .or_else(|| overview.as_ref().map(|o| o.project_name.clone()))
        .unwrap_or_else(|| "unknown".to_string());
    let _ = writeln!(out, "**Project:** {name}\n");

    if let Some(overview) = &overview {
        let _ = writeln!(out, "{}\n", overview.purpose);
        if !overview.summary.is_empty() {
            let _ = writeln!(out, "{}\n", overview.summary);
        }
        if !overview.tech_stack.is_empty() {
            let _ = writeln!(out, "## Tech stack\n");
            let _ = writeln!(out, "| Technology | Role |");
            let _ = writeln!(out, "|---|---|");
            for entry in &overview.tech_stack {
                let _ = writeln!(out, "| {} | {} |", entry.name, entry.role);
            }
            out.push('\n');
        }
        if !overview.entry_points.is_empty() {
            let _ = writeln!(out, "## Entry points\n");
            bullet_list(&mut out, &overview.entry_points);
            out.push('\n');
        }
    } else if let Some(summary) = &ctx.statics.docs.readme_summary {
        let _ = writeln!(out, "{summary}\n");
    }

    if ctx.statics.file_tree.total_files == 0 {
        let _ = writeln!(out, "_This repository contains no source files._\n");
    } else {
        let _ = writeln!(
            out,
            "## Repository shape\n\n{} files, {} directories, {} lines of text.\n",
            ctx.statics.file_tree.total_files,
            ctx.statics.file_tree.total_dirs,
            ctx.statics.file_tree.total_lines
        );
    }
    Ok(with_preamble(
        ctx,
        "What this project is, what it is built with, and where execution starts.",
        out,
    ))
}

// ── 02 Architecture ────────────────────────────────────────────────

fn render_architecture(ctx: &RenderContext<'_>) -> Result<String, String> {
    let mut out = String::new();
    let architecture: Option<ArchitectureOutput> = parse_round(ctx, Round::Architecture);

    if let Some(architecture) = &architecture {
        if !architecture.patterns.is_empty() {
            let _ = writeln!(out, "## Patterns\n");
            for pattern in &architecture.patterns {
                let _ = writeln!(out, "### {}\n", pattern.name);
                if !pattern.rationale.is_empty() {
                    let _ = writeln!(out, "{}\n", pattern.rationale);
                }
                if !pattern.evidence.is_empty() {
                    bullet_list(&mut out, &pattern.evidence);
                    out.push('\n');
                }
            }
        }
        if !architecture.layers.is_empty() {
            let _ = writeln!(out, "## Layers\n");
            for layer in &architecture.layers {
                let _ = writeln!(out, "- **{}**: {}", layer.name, layer.contains.join(", "));
            }
            out.push('\n');
        }
    }

    if out.is_empty() {
        let _ = writeln!(out, "## Directory structure\n");
        let _ = writeln!(out, "```\n{}```\n", ctx.statics.file_tree.tree);
    }
    Ok(with_preamble(
        ctx,
        "The structural patterns this codebase follows and how its layers relate.",
        out,
    ))
}

// ── 03 Modules ─────────────────────────────────────────────────────

fn render_modules(ctx: &RenderContext<'_>) -> Result<String, String> {
    let mut out = String::new();
    let modules: Option<ModulesOutput> = parse_round(ctx, Round::Modules);

    if let Some(modules) = &modules {
        for module in &modules.modules {
            let _ = writeln!(out, "## {}\n", module.name);
            if !module.purpose.is_empty() {
                let _ = writeln!(out, "{}\n", module.purpose);
            }
            if !module.root.is_empty() {
                let _ = writeln!(out, "Root: `{}`\n", module.root);
            }
            if !module.files.is_empty() {
                bullet_list(&mut out, &module.files);
                out.push('\n');
            }
        }
        if !modules.relationships.is_empty() {
            let _ = writeln!(out, "## Relationships\n");
            for rel in &modules.relationships {
                match &rel.kind {
                    Some(kind) => {
                        let _ = writeln!(out, "- {} -> {} ({kind})", rel.from, rel.to);
                    }
                    None => {
                        let _ = writeln!(out, "- {} -> {}", rel.from, rel.to);
                    }
                }
            }
            out.push('\n');
        }
    } else {
        let _ = writeln!(out, "## Directory structure\n");
        let _ = writeln!(out, "```\n{}```\n", ctx.statics.file_tree.tree);
    }
    Ok(with_preamble(
        ctx,
        "The major units of this codebase, what each is responsible for, and \
         how they depend on each other.",
        out,
    ))
}

// ── 04 Features ────────────────────────────────────────────────────

fn render_features(ctx: &RenderContext<'_>) -> Result<String, String> {
    let mut out = String::new();
    let features: Option<FeaturesOutput> = parse_round(ctx, Round::Features);

    if let Some(features) = &features {
        for feature in &features.features {
            let _ = writeln!(out, "## {}\n", feature.name);
            if !feature.description.is_empty() {
                let _ = writeln!(out, "{}\n", feature.description);
            }
            if !feature.files.is_empty() {
                bullet_list(&mut out, &feature.files);
                out.push('\n');
            }
        }
        if !features.cross_cutting.is_empty() {
            let _ = writeln!(out, "## Cross-cutting concerns\n");
            bullet_list(&mut out, &features.cross_cutting);
            out.push('\n');
        }
    }
    if out.is_empty() {
        let _ = writeln!(out, "_No feature analysis available._\n");
    }
    Ok(with_preamble(
        ctx,
        "The capabilities this system provides and the concerns that cut \
         across them.",
        out,
    ))
}

// ── 05 Data flow ───────────────────────────────────────────────────

fn render_data_flow(ctx: &RenderContext<'_>) -> Result<String, String> {
    let mut out = String::new();
    let modules: Option<ModulesOutput> = parse_round(ctx, Round::Modules);
    let architecture: Option<ArchitectureOutput> = parse_round(ctx, Round::Architecture);

    let mut wrote_edges = false;
    if let Some(architecture) = &architecture {
        if !architecture.relationships.is_empty() {
            let _ = writeln!(out, "## Flow between layers\n");
            for rel in &architecture.relationships {
                let _ = writeln!(out, "- {} -> {}", rel.from, rel.to);
            }
            out.push('\n');
            wrote_edges = true;
        }
    }
    if let Some(modules) = &modules {
        if !modules.relationships.is_empty() {
            let _ = writeln!(out, "## Module dependencies\n");
            for rel in &modules.relationships {
                let _ = writeln!(out, "- {} -> {}", rel.from, rel.to);
            }
            out.push('\n');
            wrote_edges = true;
        }
    }

    if !wrote_edges {
        let edges = &ctx.statics.symbols.import_edges;
        if edges.is_empty() {
            let _ = writeln!(out, "_No import relationships detected._\n");
        } else {
            let _ = writeln!(out, "## Import edges\n");
            for edge in edges.iter().take(50) {
                let _ = writeln!(out, "- {} -> {}", edge.from, edge.to);
            }
            out.push('\n');
        }
    }
    Ok(with_preamble(
        ctx,
        "How data moves through the system, read from the relationships \
         between its modules and layers.",
        out,
    ))
}

// ── 06 Conventions ─────────────────────────────────────────────────

fn render_conventions(ctx: &RenderContext<'_>) -> Result<String, String> {
    let mut out = String::new();
    let conventions: Option<ConventionsOutput> = parse_round(ctx, Round::Conventions);

    if let Some(conventions) = &conventions {
        for convention in &conventions.conventions {
            let _ = writeln!(out, "## {}\n", convention.topic);
            if !convention.rule.is_empty() {
                let _ = writeln!(out, "{}\n", convention.rule);
            }
            if !convention.examples.is_empty() {
                bullet_list(&mut out, &convention.examples);
                out.push('\n');
            }
        }
    }
    if out.is_empty() {
        let coverage = ctx.statics.docs.inline_doc_coverage * 100.0;
        let _ = writeln!(
            out,
            "_No convention analysis available._\n\nDocumentation coverage: {coverage:.0}% of sampled files.\n"
        );
    }
    Ok(with_preamble(
        ctx,
        "The working rules a contributor is expected to follow in this \
         repository.",
        out,
    ))
}

// ── 07 Testing ─────────────────────────────────────────────────────

fn render_testing(ctx: &RenderContext<'_>) -> Result<String, String> {
    let mut out = String::new();
    let tests = &ctx.statics.tests;

    if tests.frameworks.is_empty() {
        let _ = writeln!(out, "_No test frameworks detected._\n");
    } else {
        let _ = writeln!(out, "| Framework | Evidence | Approx. tests |");
        let _ = writeln!(out, "|---|---|---|");
        for framework in &tests.frameworks {
            let _ = writeln!(
                out,
                "| {} | {:?} | {} |",
                framework.name, framework.evidence, framework.approximate_tests
            );
        }
        out.push('\n');
    }
    if !tests.test_files.is_empty() {
        let _ = writeln!(out, "## Test files\n");
        bullet_list(&mut out, &tests.test_files);
        out.push('\n');
    }
    Ok(with_preamble(
        ctx,
        "How this repository is tested and where the tests live.",
        out,
    ))
}

// ── 08 Dependencies ────────────────────────────────────────────────

fn render_dependencies(ctx: &RenderContext<'_>) -> Result<String, String> {
    let mut out = String::new();
    let deps = &ctx.statics.dependencies;

    if deps.manifests.is_empty() {
        let _ = writeln!(out, "_No dependency manifests found._\n");
    }
    for manifest in &deps.manifests {
        let _ = writeln!(out, "## {}\n", manifest.path);
        if !manifest.production.is_empty() {
            let _ = writeln!(out, "### Production\n");
            for dep in &manifest.production {
                let _ = writeln!(out, "- {} `{}`", dep.name, dep.version);
            }
            out.push('\n');
        }
        if !manifest.development.is_empty() {
            let _ = writeln!(out, "### Development\n");
            for dep in &manifest.development {
                let _ = writeln!(out, "- {} `{}`", dep.name, dep.version);
            }
            out.push('\n');
        }
    }
    if !deps.warnings.is_empty() {
        let _ = writeln!(out, "## Warnings\n");
        bullet_list(&mut out, &deps.warnings);
        out.push('\n');
    }
    Ok(with_preamble(
        ctx,
        "The third-party packages this repository declares, split into \
         production and development sets.",
        out,
    ))
}

// ── 09 Git history ─────────────────────────────────────────────────

const GIT_HISTORY_INTRO: &str =
    "What the repository's history says about how it is developed: branching, \
     contributors, and the files that change most.";

fn render_git_history(ctx: &RenderContext<'_>) -> Result<String, String> {
    let mut out = String::new();
    let git = &ctx.statics.git;

    if !git.is_git_repo {
        let _ = writeln!(out, "_Not a git repository; no history available._\n");
        return Ok(with_preamble(ctx, GIT_HISTORY_INTRO, out));
    }

    let _ = writeln!(
        out,
        "Branch strategy: **{}** ({} branches)\n",
        git.strategy.as_str(),
        git.branches.len()
    );
    let _ = writeln!(out, "{} commits in the analyzed window.\n", git.commit_count);

    if !git.contributors.is_empty() {
        let _ = writeln!(out, "## Contributors\n");
        for contributor in git.contributors.iter().take(10) {
            let _ = writeln!(
                out,
                "- {} ({} commits)",
                contributor.name, contributor.commits
            );
        }
        out.push('\n');
    }

    if !git.churn.is_empty() {
        let mut churn: Vec<(&String, &u32)> = git.churn.iter().collect();
        churn.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
        let _ = writeln!(out, "## Most-changed files\n");
        for (path, count) in churn.into_iter().take(15) {
            let _ = writeln!(out, "- `{path}` ({count} changes)");
        }
        out.push('\n');
    }
    Ok(with_preamble(ctx, GIT_HISTORY_INTRO, out))
}

// ── 10 TODO / debt ─────────────────────────────────────────────────

const TODO_DEBT_INTRO: &str =
    "Work markers left in the source, with their locations and any issue \
     references they carry.";

fn render_todo_debt(ctx: &RenderContext<'_>) -> Result<String, String> {
    let mut out = String::new();
    let todos = &ctx.statics.todos;

    if todos.items.is_empty() {
        let _ = writeln!(out, "_No work markers found._\n");
        return Ok(with_preamble(ctx, TODO_DEBT_INTRO, out));
    }

    let _ = writeln!(out, "{} markers found.\n", todos.items.len());
    let _ = writeln!(out, "| Location | Marker | Text | Refs |");
    let _ = writeln!(out, "|---|---|---|---|");
    for item in todos.items.iter().take(100) {
        let _ = writeln!(
            out,
            "| {}:{} | {} | {} | {} |",
            item.path,
            item.line,
            item.marker,
            item.text.replace('|', "\\|"),
            item.issue_refs.join(" ")
        );
    }
    out.push('\n');
    Ok(with_preamble(ctx, TODO_DEBT_INTRO, out))
}

// ── 11 Environment ─────────────────────────────────────────────────

fn render_environment(ctx: &RenderContext<'_>) -> Result<String, String> {
    let mut out = String::new();
    let env = &ctx.statics.env;

    if !env.env_files.is_empty() {
        let _ = writeln!(out, "## Environment files\n");
        bullet_list(&mut out, &env.env_files);
        out.push('\n');
    }
    if env.references.is_empty() {
        let _ = writeln!(out, "_No environment variable references found._\n");
    } else {
        let _ = writeln!(out, "## Referenced variables\n");
        let _ = writeln!(out, "| Variable | Used in |");
        let _ = writeln!(out, "|---|---|");
        for (var, paths) in &env.references {
            let _ = writeln!(out, "| `{var}` | {} |", paths.join(", "));
        }
        out.push('\n');
    }
    Ok(with_preamble(
        ctx,
        "The environment files and variables this system reads at runtime.",
        out,
    ))
}

// ── 12 Edge cases ──────────────────────────────────────────────────

fn render_edge_cases(ctx: &RenderContext<'_>) -> Result<String, String> {
    let mut out = String::new();
    let conventions: Option<ConventionsOutput> = parse_round(ctx, Round::Conventions);

    if let Some(conventions) = &conventions {
        if !conventions.edge_cases.is_empty() {
            bullet_list(&mut out, &conventions.edge_cases);
            out.push('\n');
        }
        if !conventions.open_questions.is_empty() {
            let _ = writeln!(out, "## Open questions\n");
            bullet_list(&mut out, &conventions.open_questions);
            out.push('\n');
        }
    }
    if out.is_empty() {
        let _ = writeln!(out, "_No edge-case analysis available._\n");
    }
    Ok(with_preamble(
        ctx,
        "Boundary conditions the code already guards against, and the \
         questions still open.",
        out,
    ))
}

// ── 13 Deployment ──────────────────────────────────────────────────

fn render_deployment(ctx: &RenderContext<'_>) -> Result<String, String> {
    let mut out = String::new();
    let deployment: Option<DeploymentOutput> = parse_round(ctx, Round::Deployment);

    if let Some(deployment) = &deployment {
        if !deployment.targets.is_empty() {
            let _ = writeln!(out, "## Targets\n");
            bullet_list(&mut out, &deployment.targets);
            out.push('\n');
        }
        if !deployment.build_steps.is_empty() {
            let _ = writeln!(out, "## Build\n");
            bullet_list(&mut out, &deployment.build_steps);
            out.push('\n');
        }
        if !deployment.infrastructure.is_empty() {
            let _ = writeln!(out, "## Infrastructure\n");
            bullet_list(&mut out, &deployment.infrastructure);
            out.push('\n');
        }
        if let Some(ci) = &deployment.ci {
            let _ = writeln!(out, "CI: **{ci}**\n");
        }
        if !deployment.environment_variables.is_empty() {
            let _ = writeln!(out, "## Required environment variables\n");
            bullet_list(&mut out, &deployment.environment_variables);
            out.push('\n');
        }
    }
    if out.is_empty() {
        let env_vars = ctx.statics.env.variable_names();
        if env_vars.is_empty() {
            let _ = writeln!(out, "_No deployment analysis available._\n");
        } else {
            let _ = writeln!(out, "## Environment variables observed\n");
            for var in env_vars {
                let _ = writeln!(out, "- `{var}`");
            }
            out.push('\n');
        }
    }
    Ok(with_preamble(
        ctx,
        "How this system is built, shipped, and operated.",
        out,
    ))
}

// ── 00 Index ───────────────────────────────────────────────────────

/// The INDEX aggregates every sibling document's status and reason.
pub fn render_index(ctx: &RenderContext<'_>, reports: &[DocumentReport]) -> String {
    let mut out = String::new();

    if ctx.config.audience == Audience::Human {
        let _ = writeln!(
            out,
            "This knowledge base was generated by analyzing the repository's \
             files, history, and structure.\n"
        );
    }
    if ctx.statics.file_tree.total_files == 0 {
        let _ = writeln!(out, "_The analyzed repository is empty._\n");
    }

    let _ = writeln!(out, "| Document | Status | Reason |");
    let _ = writeln!(out, "|---|---|---|");
    for report in reports {
        let _ = writeln!(
            out,
            "| [{}]({}) | {} | {} |",
            report.title, report.filename, report.status, report.reason
        );
    }
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::StaticAnalysisResult;
    use crate::config::HandoverConfig;
    use crate::rounds::RoundExecutionResult;
    use crate::types::{QualityMetrics, RoundSource, RoundStatus, ValidationResult};
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn ctx_with<'a>(
        statics: &'a StaticAnalysisResult,
        rounds: &'a BTreeMap<Round, RoundExecutionResult>,
        config: &'a HandoverConfig,
    ) -> RenderContext<'a> {
        RenderContext {
            statics,
            rounds,
            config,
            generated_at: Utc::now(),
        }
    }

    fn ok_round(round: Round, data: serde_json::Value) -> RoundExecutionResult {
        RoundExecutionResult {
            round,
            data,
            status: RoundStatus::Ok,
            source: RoundSource::Llm,
            validation: ValidationResult::default(),
            quality: QualityMetrics::acceptable(),
            usage: crate::llm::TokenUsage::default(),
            cost_usd: 0.0,
            context: crate::types::RoundContext::default(),
            degraded_reasons: Vec::new(),
        }
    }

    #[test]
    fn overview_uses_round_data() {
        let statics = StaticAnalysisResult::default();
        let config = HandoverConfig::default();
        let mut rounds = BTreeMap::new();
        rounds.insert(
            Round::Overview,
            ok_round(
                Round::Overview,
                serde_json::json!({
                    "project_name": "demo",
                    "purpose": "it demos",
                    "tech_stack": [{"name": "rust", "role": "language"}],
                    "entry_points": ["src/main.rs"],
                }),
            ),
        );
        let ctx = ctx_with(&statics, &rounds, &config);
        let body = render_overview(&ctx).unwrap();
        assert!(body.contains("it demos"));
        assert!(body.contains("| rust | language |"));
        assert!(body.contains("src/main.rs"));
    }

    #[test]
    fn overview_static_fallback_mentions_empty_repo() {
        let statics = StaticAnalysisResult::default();
        let config = HandoverConfig::default();
        let rounds = BTreeMap::new();
        let ctx = ctx_with(&statics, &rounds, &config);
        let body = render_overview(&ctx).unwrap();
        assert!(body.contains("no source files"));
    }

    #[test]
    fn git_history_without_repo() {
        let statics = StaticAnalysisResult::default();
        let config = HandoverConfig::default();
        let rounds = BTreeMap::new();
        let ctx = ctx_with(&statics, &rounds, &config);
        let body = render_git_history(&ctx).unwrap();
        assert!(body.contains("Not a git repository"));
    }

    #[test]
    fn todo_table_escapes_pipes() {
        let mut statics = StaticAnalysisResult::default();
        statics.todos.items.push(crate::analyze::todos::TodoItem {
            marker: "TODO".into(),
            category: crate::analyze::todos::TodoCategory::Tasks,
            text: "fix a | b".into(),
            path: "src/x.rs".into(),
            line: 3,
            issue_refs: vec!["#12".into()],
        });
        let config = HandoverConfig::default();
        let rounds = BTreeMap::new();
        let ctx = ctx_with(&statics, &rounds, &config);
        let body = render_todo_debt(&ctx).unwrap();
        assert!(body.contains("fix a \\| b"));
        assert!(body.contains("#12"));
    }

    #[test]
    fn index_lists_every_report() {
        let statics = StaticAnalysisResult::default();
        let config = HandoverConfig::default();
        let rounds = BTreeMap::new();
        let ctx = ctx_with(&statics, &rounds, &config);
        let reports = vec![DocumentReport {
            filename: "01-OVERVIEW.md".into(),
            title: "Overview".into(),
            status: crate::types::DocumentStatus::StaticOnly,
            reason: "round 1 did not run".into(),
        }];
        let index = render_index(&ctx, &reports);
        assert!(index.contains("[Overview](01-OVERVIEW.md)"));
        assert!(index.contains("static-only"));
        assert!(index.contains("empty"));
    }

    #[test]
    fn audience_tunes_prose_in_every_document() {
        let statics = StaticAnalysisResult::default();
        let rounds = BTreeMap::new();
        let human_config = HandoverConfig::default();
        let ai_config = HandoverConfig {
            audience: Audience::Ai,
            ..Default::default()
        };

        for def in DOCUMENTS {
            let human = (def.render)(&ctx_with(&statics, &rounds, &human_config)).unwrap();
            let ai = (def.render)(&ctx_with(&statics, &rounds, &ai_config)).unwrap();
            assert_ne!(human, ai, "{} ignores the audience", def.filename);
            // The ai rendition is the human one minus the orientation prose.
            assert!(
                human.ends_with(&ai),
                "{} should only differ by its preamble",
                def.filename
            );
        }
    }

    #[test]
    fn thirteen_defs_plus_index() {
        assert_eq!(DOCUMENTS.len(), 13);
        let mut filenames: Vec<&str> = DOCUMENTS.iter().map(|d| d.filename).collect();
        filenames.push(INDEX_FILENAME);
        filenames.sort_unstable();
        // 00 through 13, no gaps.
        for (i, filename) in filenames.iter().enumerate() {
            assert!(filename.starts_with(&format!("{i:02}-")));
        }
    }
}
