// Integration test utilities and fixture management for Handover.

use std::path::Path;
use std::process::Command;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use handover_core::config::{AuthMethod, HandoverConfig};
use handover_core::llm::{CompletionRequest, LlmProvider, ProviderFacade, TokenUsage};
use handover_core::pipeline::{RunSummary, run_pipeline};
use handover_core::progress::ProgressSender;
use handover_core::schedule::CancelFlag;

/// A test fixture with a temporary repository, optionally git-backed.
#[derive(Debug)]
pub struct TestRepo {
    pub dir: tempfile::TempDir,
}

impl TestRepo {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// A directory containing only a README — the empty-repository case.
    pub fn readme_only() -> Self {
        let dir = tempfile::tempdir().expect("create tempdir");
        std::fs::write(
            dir.path().join("README.md"),
            "# Empty Project\n\nNothing here yet.\n",
        )
        .unwrap();
        Self { dir }
    }

    /// Create a minimal Rust project with git history.
    pub fn minimal_rust() -> Self {
        let dir = tempfile::tempdir().expect("create tempdir");
        let root = dir.path();

        git(root, &["init"]);
        git(root, &["config", "user.email", "test@handover.dev"]);
        git(root, &["config", "user.name", "Test"]);

        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::write(
            root.join("Cargo.toml"),
            "[package]\nname = \"test-project\"\nversion = \"0.1.0\"\n\n[dependencies]\nserde = \"1.0\"\ntokio = { version = \"1\", features = [\"full\"] }\n",
        ).unwrap();
        std::fs::write(
            root.join("src/main.rs"),
            "mod helpers;\n\nfn main() {\n    // TODO: real argument parsing #42\n    helpers::greet();\n}\n",
        )
        .unwrap();
        std::fs::write(
            root.join("src/helpers.rs"),
            "/// Prints a greeting.\npub fn greet() {\n    println!(\"hello\");\n}\n",
        )
        .unwrap();
        std::fs::write(
            root.join("README.md"),
            "# Test Project\n\nA small Rust binary used as a pipeline fixture.\n",
        )
        .unwrap();
        git(root, &["add", "."]);
        git(root, &["commit", "-m", "Initial commit"]);

        std::fs::write(
            root.join("src/lib.rs"),
            "pub fn add(a: i32, b: i32) -> i32 {\n    a + b\n}\n\n#[cfg(test)]\nmod tests {\n    #[test]\n    fn adds() {\n        assert_eq!(super::add(2, 2), 4);\n    }\n}\n",
        )
        .unwrap();
        git(root, &["add", "."]);
        git(root, &["commit", "-m", "Add library"]);

        Self { dir }
    }

    /// A repository without git metadata.
    pub fn non_git_rust() -> Self {
        let repo = Self::minimal_rust();
        std::fs::remove_dir_all(repo.path().join(".git")).unwrap();
        Self { dir: repo.dir }
    }
}

fn git(root: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args(args)
        .current_dir(root)
        .output()
        .expect("run git");
    assert!(
        status.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&status.stderr)
    );
}

/// Scriptable provider for pipeline tests: pops one canned response per
/// call, recording the call count.
#[derive(Debug)]
pub struct StubProvider {
    responses: Mutex<Vec<Result<String, String>>>,
    calls: Mutex<u32>,
}

impl StubProvider {
    pub fn new(mut responses: Vec<Result<String, String>>) -> Arc<Self> {
        responses.reverse();
        Arc::new(Self {
            responses: Mutex::new(responses),
            calls: Mutex::new(0),
        })
    }

    /// A provider that answers every round with a schema-minimal valid
    /// response grounded in the given entry path.
    pub fn always_valid(entry_path: &str) -> Arc<Self> {
        Self::new(
            (0..12)
                .map(|_| Ok(valid_round_responses(entry_path)))
                .collect(),
        )
    }

    pub fn call_count(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

/// A single JSON body that satisfies every round schema at once: each round
/// validates only the fields it declares, extra fields are tolerated.
pub fn valid_round_responses(entry_path: &str) -> String {
    serde_json::json!({
        "project_name": "fixture",
        "purpose": "exercise the pipeline",
        "tech_stack": [{"name": "rust", "role": "language"}],
        "entry_points": [entry_path],
        "modules": [{"name": "src", "purpose": "everything", "root": "src", "files": [entry_path]}],
        "features": [{"name": "greeting", "files": [entry_path]}],
        "patterns": [{"name": "single binary", "rationale": "small tool", "evidence": [entry_path]}],
        "conventions": [{"topic": "testing", "rule": "unit tests inline", "examples": [entry_path]}],
        "targets": ["local binary"],
        "findings": ["compact fixture"],
    })
    .to_string()
}

#[async_trait::async_trait]
impl LlmProvider for StubProvider {
    fn name(&self) -> &str {
        "stub"
    }

    fn model_id(&self) -> &str {
        "stub-model"
    }

    fn max_context_tokens(&self) -> u32 {
        100_000
    }

    async fn call(
        &self,
        _request: &CompletionRequest,
    ) -> handover_core::error::Result<(String, TokenUsage)> {
        *self.calls.lock().unwrap() += 1;
        let next = self
            .responses
            .lock()
            .unwrap()
            .pop()
            .unwrap_or(Err("stub exhausted".to_string()));
        match next {
            Ok(text) => Ok((
                text,
                TokenUsage {
                    input_tokens: 1000,
                    output_tokens: 200,
                    cache_read_tokens: 0,
                },
            )),
            Err(message) => Err(handover_core::error::HandoverError::Llm(
                handover_core::error::LlmError::Parse(message),
            )),
        }
    }
}

/// Run the pipeline over a fixture with a stub provider.
pub async fn run_with_stub(
    repo_root: &Path,
    config: HandoverConfig,
    provider: Arc<StubProvider>,
) -> handover_core::error::Result<RunSummary> {
    let facade = ProviderFacade::new(provider, Duration::from_secs(5), AuthMethod::ApiKey);
    run_pipeline(
        repo_root,
        config,
        Some(facade),
        ProgressSender::noop(),
        CancelFlag::new(),
    )
    .await
}

/// Run the pipeline in static-only mode.
pub async fn run_static(
    repo_root: &Path,
    mut config: HandoverConfig,
) -> handover_core::error::Result<RunSummary> {
    config.analysis.static_only = true;
    run_pipeline(
        repo_root,
        config,
        None,
        ProgressSender::noop(),
        CancelFlag::new(),
    )
    .await
}
