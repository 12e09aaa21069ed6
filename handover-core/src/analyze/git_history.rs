use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::config::GitDepth;
use crate::error::{AnalyzeError, HandoverError};

use super::AnalyzerOutput;
use super::traits::{AnalysisContext, Analyzer};

const RECENT_COMMIT_CAP: usize = 50;
const OWNERSHIP_FILE_CAP: usize = 30;
const RECENT_WINDOW_DAYS: i64 = 183;

/// Git history facts: branches, strategy, commit log, churn, contributors,
/// and ownership for the most-changed files. Empty (with `is_git_repo =
/// false`) on non-git repositories.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GitHistoryData {
    pub is_git_repo: bool,
    pub branches: Vec<String>,
    pub strategy: BranchStrategy,
    pub commit_count: usize,
    pub recent_commits: Vec<CommitInfo>,
    /// Commit-touch count per repo-relative path.
    pub churn: BTreeMap<String, u32>,
    pub contributors: Vec<Contributor>,
    /// Author → touch count, for the top most-changed files only.
    pub ownership: BTreeMap<String, Vec<OwnershipShare>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BranchStrategy {
    GitFlow,
    FeatureBranch,
    TrunkBased,
    #[default]
    Unknown,
}

impl BranchStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GitFlow => "git-flow",
            Self::FeatureBranch => "feature-branch",
            Self::TrunkBased => "trunk-based",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitInfo {
    pub sha: String,
    pub author: String,
    pub time: DateTime<Utc>,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contributor {
    pub name: String,
    pub email: String,
    pub commits: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnershipShare {
    pub author: String,
    pub touches: u32,
}

#[derive(Debug, Default)]
pub struct GitHistoryAnalyzer;

#[async_trait::async_trait]
impl Analyzer for GitHistoryAnalyzer {
    fn name(&self) -> &'static str {
        "git-history"
    }

    #[instrument(skip_all, name = "git_history_analyze")]
    async fn run(&self, ctx: &AnalysisContext) -> crate::error::Result<AnalyzerOutput> {
        // All gix work is synchronous and completes before any await point,
        // since gix repository types cannot be held across awaits in a Send
        // future.
        let data = match scan_repository(&ctx.repo_root, ctx.config.analysis.git_depth) {
            Ok(data) => data,
            Err(e) => {
                debug!(error = %e, "Not a git repository or unreadable history");
                GitHistoryData::default()
            }
        };
        Ok(AnalyzerOutput::Git(data))
    }
}

fn git_err(e: impl std::fmt::Display) -> HandoverError {
    HandoverError::Analyze(AnalyzeError::Git(e.to_string()))
}

fn scan_repository(repo_root: &Path, depth: GitDepth) -> crate::error::Result<GitHistoryData> {
    let repo = gix::open(repo_root).map_err(git_err)?;

    let mut data = GitHistoryData {
        is_git_repo: true,
        ..Default::default()
    };

    data.branches = list_branches(&repo);
    data.strategy = detect_strategy(&data.branches);

    let head = match repo.head_commit() {
        Ok(head) => head,
        Err(e) => {
            // Repository with no commits yet.
            warn!(error = %e, "Repository has no HEAD commit");
            return Ok(data);
        }
    };

    let cutoff = match depth {
        GitDepth::Recent => Some(Utc::now() - chrono::Duration::days(RECENT_WINDOW_DAYS)),
        GitDepth::Full => None,
    };

    let mut contributor_counts: HashMap<(String, String), u32> = HashMap::new();
    let mut file_authors: HashMap<String, HashMap<String, u32>> = HashMap::new();

    let walk = head.ancestors().all().map_err(git_err)?;
    for info in walk {
        let Ok(info) = info else { continue };
        let Ok(commit) = repo.find_commit(info.id) else {
            continue;
        };

        let Ok(author_sig) = commit.author() else {
            continue;
        };
        let author_name = author_sig.name.to_string();
        let author_email = author_sig.email.to_string();
        let time = author_sig
            .time()
            .map_or_else(|_| Utc::now(), |t| gix_time_to_chrono(&t));

        if cutoff.is_some_and(|c| time < c) {
            break;
        }

        data.commit_count += 1;
        *contributor_counts
            .entry((author_name.clone(), author_email))
            .or_insert(0) += 1;

        if data.recent_commits.len() < RECENT_COMMIT_CAP {
            let message = commit.message_raw_sloppy().to_string();
            data.recent_commits.push(CommitInfo {
                sha: info.id.to_string(),
                author: author_name.clone(),
                time,
                summary: message.lines().next().unwrap_or_default().to_string(),
            });
        }

        match changed_paths(&repo, &commit) {
            Ok(paths) => {
                for path in paths {
                    *data.churn.entry(path.clone()).or_insert(0) += 1;
                    *file_authors
                        .entry(path)
                        .or_default()
                        .entry(author_name.clone())
                        .or_insert(0) += 1;
                }
            }
            Err(e) => warn!(sha = %info.id, error = %e, "Diff failed for commit"),
        }
    }

    data.contributors = {
        let mut contributors: Vec<Contributor> = contributor_counts
            .into_iter()
            .map(|((name, email), commits)| Contributor {
                name,
                email,
                commits,
            })
            .collect();
        contributors.sort_by(|a, b| b.commits.cmp(&a.commits).then(a.email.cmp(&b.email)));
        contributors
    };

    // Ownership only for the most-changed files.
    let mut by_churn: Vec<(&String, &u32)> = data.churn.iter().collect();
    by_churn.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
    for (path, _) in by_churn.into_iter().take(OWNERSHIP_FILE_CAP) {
        if let Some(authors) = file_authors.get(path) {
            let mut shares: Vec<OwnershipShare> = authors
                .iter()
                .map(|(author, touches)| OwnershipShare {
                    author: author.clone(),
                    touches: *touches,
                })
                .collect();
            shares.sort_by(|a, b| b.touches.cmp(&a.touches).then(a.author.cmp(&b.author)));
            data.ownership.insert(path.clone(), shares);
        }
    }

    Ok(data)
}

fn list_branches(repo: &gix::Repository) -> Vec<String> {
    let Ok(refs) = repo.references() else {
        return Vec::new();
    };
    let Ok(local) = refs.local_branches() else {
        return Vec::new();
    };
    let mut branches: Vec<String> = local
        .flatten()
        .map(|r| {
            let name = r.name().as_bstr().to_string();
            name.strip_prefix("refs/heads/").unwrap_or(&name).to_string()
        })
        .collect();
    branches.sort();
    branches
}

/// Classify the branching strategy from naming evidence alone.
pub fn detect_strategy(branches: &[String]) -> BranchStrategy {
    if branches.is_empty() {
        return BranchStrategy::Unknown;
    }
    let has = |prefix: &str| branches.iter().any(|b| b.starts_with(prefix));
    let has_exact = |name: &str| branches.iter().any(|b| b == name);

    if has_exact("develop") && (has("feature/") || has("release/") || has("hotfix/")) {
        BranchStrategy::GitFlow
    } else if has("feature/") || has("fix/") || has("feat/") {
        BranchStrategy::FeatureBranch
    } else if branches.len() <= 2 && (has_exact("main") || has_exact("master")) {
        BranchStrategy::TrunkBased
    } else {
        BranchStrategy::Unknown
    }
}

/// Paths touched by a commit relative to its first parent.
fn changed_paths(
    repo: &gix::Repository,
    commit: &gix::Commit<'_>,
) -> crate::error::Result<Vec<String>> {
    let tree = commit.tree().map_err(git_err)?;

    let parent_tree = commit
        .parent_ids()
        .next()
        .and_then(|parent_id| parent_id.object().ok()?.try_into_commit().ok()?.tree().ok());

    let base = match parent_tree {
        Some(ref parent) => parent,
        None => &repo.empty_tree(),
    };

    let mut paths = Vec::new();
    let mut platform = base.changes().map_err(git_err)?;
    platform
        .for_each_to_obtain_tree(&tree, |change| {
            use gix::object::tree::diff::Change;
            let location = match change {
                Change::Addition { location, .. }
                | Change::Deletion { location, .. }
                | Change::Modification { location, .. }
                | Change::Rewrite { location, .. } => location,
            };
            paths.push(gix::path::from_bstr(location).to_string_lossy().to_string());
            Ok::<_, std::convert::Infallible>(std::ops::ControlFlow::Continue(()))
        })
        .map_err(|e| git_err(format!("diff error: {e}")))?;

    Ok(paths)
}

fn gix_time_to_chrono(time: &gix::date::Time) -> DateTime<Utc> {
    Utc.timestamp_opt(time.seconds, 0)
        .single()
        .unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn branches(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn strategy_git_flow() {
        let strategy = detect_strategy(&branches(&["develop", "feature/login", "main"]));
        assert_eq!(strategy, BranchStrategy::GitFlow);
    }

    #[test]
    fn strategy_feature_branch() {
        let strategy = detect_strategy(&branches(&["main", "feature/search", "fix/crash"]));
        assert_eq!(strategy, BranchStrategy::FeatureBranch);
    }

    #[test]
    fn strategy_trunk_based() {
        assert_eq!(
            detect_strategy(&branches(&["main"])),
            BranchStrategy::TrunkBased
        );
        assert_eq!(
            detect_strategy(&branches(&["master", "gh-pages"])),
            BranchStrategy::TrunkBased
        );
    }

    #[test]
    fn strategy_unknown_when_no_evidence() {
        assert_eq!(detect_strategy(&[]), BranchStrategy::Unknown);
        assert_eq!(
            detect_strategy(&branches(&["alpha", "beta", "gamma"])),
            BranchStrategy::Unknown
        );
    }

    #[tokio::test]
    async fn non_git_repo_yields_empty_slot() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = AnalysisContext {
            repo_root: dir.path().to_path_buf(),
            files: Vec::new(),
            config: crate::config::HandoverConfig::default(),
        };
        let AnalyzerOutput::Git(data) = GitHistoryAnalyzer.run(&ctx).await.unwrap() else {
            panic!("wrong variant");
        };
        assert!(!data.is_git_repo);
        assert_eq!(data.commit_count, 0);
        assert!(data.churn.is_empty());
    }
}
