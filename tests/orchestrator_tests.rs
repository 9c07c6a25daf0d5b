//! End-to-end research runs through the service facade.
//!
//! All runs are offline: the knowledge base is the small sample corpus and
//! tools are mocks.

mod common;

use common::mocks::{FailingHistoryStore, MockTool, ToolFailure};
use common::{corpus, harness, test_config};
use rstest::rstest;
use sage::types::{AgentName, AppError, CitationKind, DirectRoute, Intent, RunState, TaskStatus};
use sage::utils::toml_config::SageConfigManager;
use sage::{InMemoryThoughtPathStore, IntentClassifier, ResearchService, ThoughtPathStore, Tool};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const COMPARE: &str = "Compare transformer and RNN architectures for time-series forecasting";

fn no_tools() -> Vec<Arc<dyn Tool>> {
    Vec::new()
}

#[tokio::test]
async fn test_comparison_query_end_to_end() {
    let history = Arc::new(InMemoryThoughtPathStore::new());
    let h = harness(no_tools(), history.clone()).await;

    let outcome = h.service.run_research_query("s1", COMPARE).await.unwrap();

    assert_eq!(outcome.intent, Intent::MultiStepResearch);
    assert_eq!(
        outcome.agent_path.agents(),
        vec![
            AgentName::Orchestrator,
            AgentName::Planning,
            AgentName::Retrieval,
            AgentName::Retrieval,
            AgentName::Summarization,
        ]
    );
    assert_eq!(outcome.tasks.len(), 2);
    assert!(outcome.tasks.iter().all(|t| t.status == TaskStatus::Done));

    let report = &outcome.report;
    assert!(!report.partial);
    assert!(!report.claims.is_empty());
    for claim in &report.claims {
        assert!(!claim.citations.is_empty(), "uncited claim: {}", claim.text);
        for marker in &claim.citations {
            let citation = report.citation(*marker).expect("marker resolves");
            assert_eq!(citation.kind, CitationKind::Evidence);
        }
    }

    let records = history.list("s1").await.unwrap();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(Some(record.id.clone()), outcome.record_id);
    assert_eq!(record.agent_path, outcome.agent_path);
    assert_eq!(record.query, COMPARE);
    assert!(!record.evidence_refs.is_empty());
    assert_eq!(
        record.transitions.last().map(|t| t.state),
        Some(RunState::Synthesizing)
    );
}

#[tokio::test]
async fn test_greeting_is_casual() {
    let history = Arc::new(InMemoryThoughtPathStore::new());
    let wiki = Arc::new(MockTool::new("wikipedia_search"));
    let h = harness(vec![wiki.clone() as Arc<dyn Tool>], history.clone()).await;

    let outcome = h.service.run_research_query("s1", "hello").await.unwrap();

    assert_eq!(outcome.intent, Intent::Casual);
    assert_eq!(outcome.agent_path.agents(), vec![AgentName::Orchestrator]);
    assert!(outcome.tasks.is_empty());
    assert!(outcome.report.citations.is_empty());
    assert_eq!(wiki.calls(), 0);
    assert_eq!(history.list("s1").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_single_tool_query_cites_tool_sources() {
    let history = Arc::new(InMemoryThoughtPathStore::new());
    let wiki = Arc::new(
        MockTool::new("wikipedia_search")
            .with_result(
                "Mamba (deep learning architecture)",
                "https://en.wikipedia.org/wiki/Mamba_(deep_learning_architecture)",
                "Mamba is a deep learning architecture focused on sequence modeling.",
            )
            .with_result(
                "State-space representation",
                "https://en.wikipedia.org/wiki/State-space_representation",
                "A state-space representation is a mathematical model of a physical system.",
            ),
    );
    let h = harness(vec![wiki.clone() as Arc<dyn Tool>], history).await;

    let outcome = h
        .service
        .run_research_query("s1", "latest news on state space models")
        .await
        .unwrap();

    assert_eq!(outcome.intent, Intent::SingleTool(DirectRoute::ToolUse));
    assert_eq!(
        outcome.agent_path.agents(),
        vec![
            AgentName::Orchestrator,
            AgentName::ToolUse,
            AgentName::Summarization
        ]
    );
    assert_eq!(wiki.calls(), 1);
    let keys: Vec<&str> = outcome
        .report
        .citations
        .iter()
        .map(|c| c.key.as_str())
        .collect();
    assert!(keys.contains(&"https://en.wikipedia.org/wiki/Mamba_(deep_learning_architecture)"));
    assert!(outcome
        .report
        .citations
        .iter()
        .all(|c| c.kind == CitationKind::Tool));
}

#[tokio::test]
async fn test_vector_outage_yields_partial_report() {
    let history = Arc::new(InMemoryThoughtPathStore::new());
    let h = harness(no_tools(), history.clone()).await;
    h.vector.set_failing(true);

    let outcome = h.service.run_research_query("s1", COMPARE).await.unwrap();

    assert!(outcome.report.partial);
    assert!(outcome
        .report
        .text
        .contains("the vector index was unavailable"));
    let records = history.list("s1").await.unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].partial);
}

#[tokio::test]
async fn test_both_backends_down_fails_without_persisting() {
    let history = Arc::new(InMemoryThoughtPathStore::new());
    let h = harness(no_tools(), history.clone()).await;
    h.vector.set_failing(true);
    h.graph.set_failing(true);

    let result = h.service.run_research_query("s1", COMPARE).await;

    assert!(matches!(result, Err(AppError::ExecutionFailed(_))));
    assert!(history.list("s1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_task_is_reported_not_fatal() {
    let history = Arc::new(InMemoryThoughtPathStore::new());
    let arxiv = Arc::new(MockTool::new("arxiv_search").failing(ToolFailure::Permanent));
    let h = harness(vec![arxiv.clone() as Arc<dyn Tool>], history).await;

    let outcome = h
        .service
        .run_research_query("s1", "Investigate attention; list recent papers on RWKV")
        .await
        .unwrap();

    assert_eq!(outcome.tasks.len(), 2);
    let statuses: Vec<TaskStatus> = outcome.tasks.iter().map(|t| t.status).collect();
    assert!(statuses.contains(&TaskStatus::Done));
    assert!(statuses.contains(&TaskStatus::Failed));
    assert!(outcome.report.partial);
    assert!(outcome
        .report
        .text
        .contains("1 research task could not be completed."));
    // a permanent error is not retried
    assert_eq!(arxiv.calls(), 1);
}

#[tokio::test]
async fn test_dependent_task_skipped_after_failure() {
    let history = Arc::new(InMemoryThoughtPathStore::new());
    let wiki = Arc::new(MockTool::new("wikipedia_search").failing(ToolFailure::Permanent));
    let h = harness(vec![wiki as Arc<dyn Tool>], history.clone()).await;

    let result = h
        .service
        .run_research_query(
            "s1",
            "Find the latest news on state space models, then summarize what our notes say about Mamba",
        )
        .await;

    // t1 fails, t2 depends on it and is skipped: nothing completed
    assert!(matches!(result, Err(AppError::ExecutionFailed(_))));
    assert!(history.list("s1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_persistence_failure_still_returns_report() {
    let h = harness(no_tools(), Arc::new(FailingHistoryStore)).await;

    let outcome = h.service.run_research_query("s1", COMPARE).await.unwrap();

    assert!(outcome.record_id.is_none());
    assert!(outcome.persistence_degraded());
    assert!(outcome
        .persistence_error
        .as_deref()
        .unwrap_or_default()
        .contains("disk full"));
    assert!(!outcome.report.claims.is_empty());
}

#[tokio::test]
async fn test_cancellation_mid_run_persists_nothing() {
    let history = Arc::new(InMemoryThoughtPathStore::new());
    let wiki = Arc::new(
        MockTool::new("wikipedia_search")
            .with_result("GPU", "https://en.wikipedia.org/wiki/GPU", "A GPU is a processor.")
            .slow(Duration::from_millis(800)),
    );
    let h = harness(vec![wiki as Arc<dyn Tool>], history.clone()).await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let result = h
        .service
        .run_research_query_with_cancel("s1", "latest GPU prices", &cancel)
        .await;

    assert!(matches!(result, Err(AppError::Cancelled(_))));
    assert!(history.list("s1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_history_is_per_session() {
    let history = Arc::new(InMemoryThoughtPathStore::new());
    let h = harness(no_tools(), history).await;

    h.service.run_research_query("alice", "hello").await.unwrap();
    h.service.run_research_query("alice", COMPARE).await.unwrap();
    h.service.run_research_query("bob", "thanks").await.unwrap();

    let alice = h.service.history("alice").await.unwrap();
    assert_eq!(alice.len(), 2);
    assert_eq!(alice[0].query, "hello");
    assert_eq!(alice[1].query, COMPARE);

    let recent = h.service.recent_history("alice", 1).await.unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(recent[0].query, COMPARE);

    assert_eq!(h.service.sessions().await.unwrap().len(), 2);
    assert_eq!(h.service.delete_history("alice").await.unwrap(), 2);
    assert!(h.service.history("alice").await.unwrap().is_empty());
    assert_eq!(h.service.history("bob").await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_runs_in_one_session_are_both_recorded() {
    let history = Arc::new(InMemoryThoughtPathStore::new());
    let h = harness(no_tools(), history.clone()).await;

    let (first, second) = tokio::join!(
        h.service.run_research_query("s1", COMPARE),
        h.service.run_research_query("s1", "hello"),
    );
    let first = first.unwrap();
    let second = second.unwrap();

    let records = history.list("s1").await.unwrap();
    assert_eq!(records.len(), 2);
    let ids: Vec<Option<String>> = records.iter().map(|r| Some(r.id.clone())).collect();
    assert!(ids.contains(&first.record_id));
    assert!(ids.contains(&second.record_id));
    assert_ne!(records[0].id, records[1].id);
}

#[tokio::test]
async fn test_ingest_reindexes_same_document() {
    let service = ResearchService::builder(test_config())
        .build()
        .await
        .unwrap();
    let document = corpus().remove(0);

    let first = service.ingest(&document).await.unwrap();
    let second = service.ingest(&document).await.unwrap();

    assert_eq!(first.document_id, second.document_id);
    assert_eq!(first.chunk_count, second.chunk_count);
    assert!(first.chunk_count > 0);
}

#[rstest]
#[case("hello", Intent::Casual)]
#[case("thanks so much", Intent::Casual)]
#[case("what can you do", Intent::Casual)]
#[case(COMPARE, Intent::MultiStepResearch)]
#[case("LSTM vs GRU", Intent::MultiStepResearch)]
#[case("Summarize: RNNs read one token at a time.", Intent::SingleTool(DirectRoute::Summarization))]
#[case("What do our notes say about LSTM?", Intent::SingleTool(DirectRoute::Retrieval))]
#[case("latest GPU prices", Intent::SingleTool(DirectRoute::ToolUse))]
fn test_classification_is_deterministic(#[case] query: &str, #[case] expected: Intent) {
    let classifier = IntentClassifier::new();
    for _ in 0..3 {
        assert_eq!(classifier.classify(query).unwrap(), expected);
    }
}

#[test]
fn test_empty_query_is_a_classification_error() {
    assert!(matches!(
        IntentClassifier::new().classify("  ?! "),
        Err(AppError::Classification(_))
    ));
}

fn live_config(data_dir: &Path, top_k: usize, vector_weight: f32) -> String {
    format!(
        r#"
[retrieval]
top_k = {top_k}
vector_weight = {vector_weight}
graph_weight = 0.5
retry_backoff_ms = 1

[ingestion]
chunk_size = 80
chunk_overlap = 0

[tools]
web_search = false
timeout_secs = 2

[history]
backend = "memory"

[storage]
data_dir = '{}'
"#,
        data_dir.display()
    )
}

#[tokio::test]
async fn test_reloaded_retrieval_settings_apply_to_next_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sage.toml");
    std::fs::write(&path, live_config(&dir.path().join("data"), 1, 0.5)).unwrap();

    let manager = Arc::new(SageConfigManager::new(&path).unwrap());
    let service = ResearchService::from_manager(manager.clone()).await.unwrap();
    for document in corpus() {
        service.ingest(&document).await.unwrap();
    }

    let before = service.run_research_query("s1", COMPARE).await.unwrap();
    let records = service.history("s1").await.unwrap();
    assert_eq!(records[0].id, before.record_id.clone().unwrap());
    assert!(records[0].evidence_refs.len() <= 2);

    std::fs::write(&path, live_config(&dir.path().join("data"), 5, 0.8)).unwrap();
    manager.reload().unwrap();

    let settings = service.retrieval_config();
    assert_eq!(settings.top_k, 5);
    assert_eq!(settings.vector_weight, 0.8);

    service.run_research_query("s1", COMPARE).await.unwrap();
    let records = service.history("s1").await.unwrap();
    assert_eq!(records.len(), 2);
    assert!(
        records[1].evidence_refs.len() >= 5,
        "refs after reload: {:?}",
        records[1].evidence_refs
    );
    // built-time sections stay as they were
    assert_eq!(service.config().retrieval.top_k, 1);
}
