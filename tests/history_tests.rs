//! Thought-path history persistence tests.
//!
//! These tests run the SQLite store against temporary database files.

mod common;

use chrono::Utc;
use common::test_config;
use sage::types::{AgentName, AgentPath, Intent, Report, RunState, ThoughtPathRecord};
use sage::utils::toml_config::HistoryConfig;
use sage::{ResearchService, SqliteThoughtPathStore, ThoughtPathStore};
use tempfile::TempDir;

fn record(id: &str, session: &str, query: &str) -> ThoughtPathRecord {
    let mut path = AgentPath::new();
    path.push(AgentName::Orchestrator, RunState::Received, None);
    path.push(AgentName::Planning, RunState::PlanningHandoff, None);
    path.push(AgentName::Retrieval, RunState::Executing, Some("t1".to_string()));
    path.push(AgentName::Summarization, RunState::Synthesizing, None);

    ThoughtPathRecord {
        id: id.to_string(),
        session_id: session.to_string(),
        query: query.to_string(),
        intent: Intent::MultiStepResearch,
        agent_path: path,
        transitions: Vec::new(),
        tasks: Vec::new(),
        evidence_refs: vec!["doc-rnn#0".to_string()],
        tool_sources: Vec::new(),
        report: Report::plain("RNNs are recurrent [1]").text,
        partial: false,
        created_at: Utc::now(),
    }
}

async fn open_store(dir: &TempDir) -> SqliteThoughtPathStore {
    SqliteThoughtPathStore::open(dir.path().join("history.db"))
        .await
        .expect("Failed to open history database")
}

#[tokio::test]
async fn test_append_and_list_in_order() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;

    let first = record("r1", "s1", "first");
    assert_eq!(store.append(&first).await.unwrap(), "r1");
    store.append(&record("r2", "s1", "second")).await.unwrap();
    store.append(&record("r3", "s2", "other")).await.unwrap();

    let records = store.list("s1").await.unwrap();
    let queries: Vec<&str> = records.iter().map(|r| r.query.as_str()).collect();
    assert_eq!(queries, vec!["first", "second"]);
    assert_eq!(records[0], first);
}

#[tokio::test]
async fn test_path_steps_stored_in_order() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    store.append(&record("r1", "s1", "q")).await.unwrap();

    let steps = store.path_steps("r1").await.unwrap();
    let agents: Vec<&str> = steps.iter().map(|(agent, _, _)| agent.as_str()).collect();
    assert_eq!(
        agents,
        vec!["orchestrator", "planning", "retrieval", "summarization"]
    );
    assert_eq!(steps[2].2.as_deref(), Some("t1"));
    assert_eq!(steps[0].2, None);
}

#[tokio::test]
async fn test_duplicate_id_rejected_atomically() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    store.append(&record("r1", "s1", "q")).await.unwrap();

    assert!(store.append(&record("r1", "s1", "again")).await.is_err());
    assert_eq!(store.list("s1").await.unwrap().len(), 1);
    assert_eq!(store.path_steps("r1").await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_recent_and_delete() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    for i in 0..5 {
        store
            .append(&record(&format!("r{}", i), "s1", &format!("q{}", i)))
            .await
            .unwrap();
    }

    let recent = store.recent("s1", 2).await.unwrap();
    let queries: Vec<&str> = recent.iter().map(|r| r.query.as_str()).collect();
    assert_eq!(queries, vec!["q3", "q4"]);

    assert_eq!(store.delete("s1").await.unwrap(), 5);
    assert!(store.list("s1").await.unwrap().is_empty());
    assert!(store.path_steps("r0").await.unwrap().is_empty());
    assert_eq!(store.delete("s1").await.unwrap(), 0);
}

#[tokio::test]
async fn test_sessions_summary() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir).await;
    store.append(&record("r1", "alice", "first question")).await.unwrap();
    store.append(&record("r2", "alice", "second question")).await.unwrap();
    store.append(&record("r3", "bob", "hello")).await.unwrap();

    let sessions = store.sessions().await.unwrap();
    assert_eq!(sessions.len(), 2);
    let alice = sessions.iter().find(|s| s.session_id == "alice").unwrap();
    assert_eq!(alice.runs, 2);
    assert_eq!(alice.first_query, "first question");
}

#[tokio::test]
async fn test_history_survives_reopen() {
    let dir = TempDir::new().unwrap();
    {
        let store = open_store(&dir).await;
        store.append(&record("r1", "s1", "q")).await.unwrap();
    }
    let store = open_store(&dir).await;
    assert_eq!(store.list("s1").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_service_records_runs_in_sqlite() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config();
    config.history = HistoryConfig::Sqlite {
        path: dir.path().join("nested").join("sage.db"),
    };

    let service = ResearchService::builder(config).build().await.unwrap();
    let outcome = service.run_research_query("s1", "hello").await.unwrap();
    assert!(outcome.record_id.is_some());

    let records = service.history("s1").await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].intent, Intent::Casual);
    assert_eq!(records[0].agent_path.agents(), vec![AgentName::Orchestrator]);
    assert!(dir.path().join("nested").join("sage.db").exists());
}
