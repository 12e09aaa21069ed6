use handover_core::config::HandoverConfig;
use handover_core::types::DocumentStatus;
use handover_test::{
    StubProvider, TestRepo, run_static, run_with_stub, valid_round_responses,
};

// ── Empty repository ─────────────────────────────────────────────

#[tokio::test]
async fn empty_repo_produces_minimal_knowledge_base() {
    let repo = TestRepo::readme_only();
    // A stub is wired up, but the pipeline must not call it: a repo with no
    // source files skips the rounds.
    let provider = StubProvider::always_valid("README.md");
    let summary = run_with_stub(repo.path(), HandoverConfig::default(), provider.clone())
        .await
        .unwrap();

    assert_eq!(summary.documents.len(), 14);
    assert_eq!(summary.rounds_run, 0);
    assert_eq!(provider.call_count(), 0);

    // Every document exists on disk with a degraded-or-static status.
    let out = repo.path().join("handover");
    assert!(out.join("00-INDEX.md").exists());
    assert!(out.join("13-DEPLOYMENT.md").exists());
    for doc in &summary.documents {
        assert!(
            matches!(
                doc.status,
                DocumentStatus::StaticOnly | DocumentStatus::NotGenerated
            ),
            "{} unexpectedly {}",
            doc.filename,
            doc.status
        );
    }

    let overview = std::fs::read_to_string(out.join("01-OVERVIEW.md")).unwrap();
    assert!(overview.contains("status: static-only"));
}

// ── Full run and cache reuse ─────────────────────────────────────

#[tokio::test]
async fn warm_cache_run_makes_zero_llm_calls() {
    let repo = TestRepo::minimal_rust();

    let provider = StubProvider::always_valid("src/main.rs");
    let first = run_with_stub(repo.path(), HandoverConfig::default(), provider.clone())
        .await
        .unwrap();
    assert_eq!(first.rounds_run, 6);
    assert_eq!(first.cache_hits, 0);
    assert_eq!(provider.call_count(), 6, "one call per round");
    assert!(first.total_cost_usd >= 0.0);

    // Second run: same bytes, same model → every round served from cache.
    let provider2 = StubProvider::always_valid("src/main.rs");
    let second = run_with_stub(repo.path(), HandoverConfig::default(), provider2.clone())
        .await
        .unwrap();
    assert_eq!(second.cache_hits, 6);
    assert_eq!(provider2.call_count(), 0);
    assert_eq!(second.documents.len(), 14);
}

#[tokio::test]
async fn full_run_marks_round_documents_full() {
    let repo = TestRepo::minimal_rust();
    let provider = StubProvider::always_valid("src/main.rs");
    let summary = run_with_stub(repo.path(), HandoverConfig::default(), provider)
        .await
        .unwrap();

    let overview = summary
        .documents
        .iter()
        .find(|d| d.filename == "01-OVERVIEW.md")
        .unwrap();
    assert_eq!(overview.status, DocumentStatus::Full);

    let body = std::fs::read_to_string(repo.path().join("handover/01-OVERVIEW.md")).unwrap();
    assert!(body.contains("exercise the pipeline"));
    assert!(body.contains("status: full"));
}

// ── Single-byte edit cascade ─────────────────────────────────────

#[tokio::test]
async fn single_byte_edit_invalidates_every_round() {
    let repo = TestRepo::minimal_rust();

    let provider = StubProvider::always_valid("src/main.rs");
    run_with_stub(repo.path(), HandoverConfig::default(), provider)
        .await
        .unwrap();

    // Same-length edit: a size-keyed cache would wrongly hit.
    let helper_path = repo.path().join("src/helpers.rs");
    let content = std::fs::read_to_string(&helper_path).unwrap();
    assert!(content.contains("hello"));
    std::fs::write(&helper_path, content.replace("hello", "hullo")).unwrap();

    let provider2 = StubProvider::always_valid("src/main.rs");
    let second = run_with_stub(repo.path(), HandoverConfig::default(), provider2.clone())
        .await
        .unwrap();
    assert_eq!(second.cache_hits, 0, "cascade must invalidate all rounds");
    assert_eq!(provider2.call_count(), 6);
}

// ── Analyzer failure isolation ───────────────────────────────────

#[tokio::test]
async fn non_git_repo_completes_with_empty_git_slot() {
    let repo = TestRepo::non_git_rust();
    let provider = StubProvider::always_valid("src/main.rs");
    let summary = run_with_stub(repo.path(), HandoverConfig::default(), provider)
        .await
        .unwrap();

    assert_eq!(summary.documents.len(), 14);
    let git_doc =
        std::fs::read_to_string(repo.path().join("handover/09-GIT-HISTORY.md")).unwrap();
    assert!(git_doc.contains("Not a git repository"));

    let git_report = summary
        .documents
        .iter()
        .find(|d| d.filename == "09-GIT-HISTORY.md")
        .unwrap();
    assert_eq!(git_report.status, DocumentStatus::StaticOnly);
}

// ── Retry path ───────────────────────────────────────────────────

#[tokio::test]
async fn invalid_claims_retry_once_then_accept() {
    let repo = TestRepo::minimal_rust();

    // Round 1 first answers with three invented paths (drop rate 1.0), then
    // a grounded answer; rounds 2..6 answer correctly first try.
    let bad = serde_json::json!({
        "project_name": "fixture",
        "purpose": "exercise the pipeline",
        "tech_stack": [{"name": "rust"}],
        "entry_points": ["fake/a.rs", "fake/b.rs", "fake/c.rs"],
    })
    .to_string();
    let mut responses = vec![Ok(bad), Ok(valid_round_responses("src/main.rs"))];
    responses.extend((0..5).map(|_| Ok(valid_round_responses("src/main.rs"))));
    let provider = StubProvider::new(responses);

    let summary = run_with_stub(repo.path(), HandoverConfig::default(), provider.clone())
        .await
        .unwrap();

    // Exactly two calls for round 1, one for each of the other five.
    assert_eq!(provider.call_count(), 7);
    let overview = summary
        .documents
        .iter()
        .find(|d| d.filename == "01-OVERVIEW.md")
        .unwrap();
    assert_eq!(overview.status, DocumentStatus::Full);
}

// ── Fallback path ────────────────────────────────────────────────

#[tokio::test]
async fn double_failure_degrades_round_and_marks_documents_partial() {
    let repo = TestRepo::minimal_rust();

    // Round 1 fails twice → degraded; the rest succeed.
    let mut responses: Vec<Result<String, String>> = vec![
        Err("malformed".to_string()),
        Err("malformed again".to_string()),
    ];
    responses.extend((0..5).map(|_| Ok(valid_round_responses("src/main.rs"))));
    let provider = StubProvider::new(responses);

    let summary = run_with_stub(repo.path(), HandoverConfig::default(), provider.clone())
        .await
        .unwrap();

    assert_eq!(provider.call_count(), 7);
    let overview = summary
        .documents
        .iter()
        .find(|d| d.filename == "01-OVERVIEW.md")
        .unwrap();
    assert_eq!(overview.status, DocumentStatus::Partial);

    // The degraded output was cached: a rerun reuses it without new calls.
    let provider2 = StubProvider::new(vec![]);
    let second = run_with_stub(repo.path(), HandoverConfig::default(), provider2.clone())
        .await
        .unwrap();
    assert_eq!(provider2.call_count(), 0);
    assert_eq!(second.cache_hits, 6);
    let overview2 = second
        .documents
        .iter()
        .find(|d| d.filename == "01-OVERVIEW.md")
        .unwrap();
    assert_eq!(overview2.status, DocumentStatus::Partial);
}

// ── no-cache mode ────────────────────────────────────────────────

#[tokio::test]
async fn no_cache_skips_reads_but_warms_the_cache() {
    let repo = TestRepo::minimal_rust();
    let mut config = HandoverConfig::default();
    config.cache.no_cache = true;

    let provider = StubProvider::always_valid("src/main.rs");
    let first = run_with_stub(repo.path(), config.clone(), provider.clone())
        .await
        .unwrap();
    assert_eq!(first.cache_hits, 0);
    assert_eq!(provider.call_count(), 6);

    // Normal run afterwards reads the cache written by the no-cache run.
    let normal = HandoverConfig::default();
    let provider2 = StubProvider::new(vec![]);
    let second = run_with_stub(repo.path(), normal, provider2.clone())
        .await
        .unwrap();
    assert_eq!(second.cache_hits, 6);
    assert_eq!(provider2.call_count(), 0);
}

// ── Static-only mode ─────────────────────────────────────────────

#[tokio::test]
async fn static_only_runs_without_provider() {
    let repo = TestRepo::minimal_rust();
    let summary = run_static(repo.path(), HandoverConfig::default())
        .await
        .unwrap();

    assert_eq!(summary.documents.len(), 14);
    assert_eq!(summary.rounds_run, 0);
    assert!((summary.total_cost_usd - 0.0).abs() < f64::EPSILON);

    // Static documents still carry real content.
    let deps = std::fs::read_to_string(repo.path().join("handover/08-DEPENDENCIES.md")).unwrap();
    assert!(deps.contains("serde"));
    let todo = std::fs::read_to_string(repo.path().join("handover/10-TODO-DEBT.md")).unwrap();
    assert!(todo.contains("#42"));
}

// ── Cache directory hygiene ──────────────────────────────────────

#[tokio::test]
async fn cache_dir_is_gitignored_and_not_analyzed() {
    let repo = TestRepo::minimal_rust();
    let provider = StubProvider::always_valid("src/main.rs");
    run_with_stub(repo.path(), HandoverConfig::default(), provider)
        .await
        .unwrap();

    let gitignore = std::fs::read_to_string(repo.path().join(".gitignore")).unwrap();
    assert!(gitignore.contains(".handover-cache/"));

    // A second run must not treat cache entries as repository files, so the
    // fingerprint (and therefore every round hash) stays stable.
    let provider2 = StubProvider::new(vec![]);
    let second = run_with_stub(repo.path(), HandoverConfig::default(), provider2)
        .await
        .unwrap();
    assert_eq!(second.cache_hits, 6);
}
