//! Thought-path history.
//!
//! Each completed research run is stored as one [`ThoughtPathRecord`].
//! Records for a session are only ever appended; listing returns them in
//! arrival order and deletion removes a whole session at once.

use crate::types::{Result, SessionSummary, ThoughtPathRecord};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

/// Append-only, session-scoped store for run traces.
#[async_trait]
pub trait ThoughtPathStore: Send + Sync {
    fn provider_name(&self) -> &'static str;

    /// Store a record atomically. Returns the record id.
    async fn append(&self, record: &ThoughtPathRecord) -> Result<String>;

    /// All records of a session, oldest first.
    async fn list(&self, session_id: &str) -> Result<Vec<ThoughtPathRecord>>;

    /// The last `limit` records of a session, oldest first.
    async fn recent(&self, session_id: &str, limit: usize) -> Result<Vec<ThoughtPathRecord>> {
        let mut records = self.list(session_id).await?;
        let skip = records.len().saturating_sub(limit);
        Ok(records.split_off(skip))
    }

    /// Drop every record of a session. Returns how many were removed.
    async fn delete(&self, session_id: &str) -> Result<usize>;

    /// One summary per session, most recently active first.
    async fn sessions(&self) -> Result<Vec<SessionSummary>>;
}

type SessionLog = Arc<Mutex<Vec<ThoughtPathRecord>>>;

/// Process-local history. Each session has its own lock so runs for
/// different sessions do not wait on each other. Appends hold the map's read
/// lock while pushing, so a session delete (write lock) never races a push
/// into a detached log.
#[derive(Clone, Default)]
pub struct InMemoryThoughtPathStore {
    sessions: Arc<RwLock<HashMap<String, SessionLog>>>,
}

impl InMemoryThoughtPathStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, record: &ThoughtPathRecord) {
        {
            let sessions = self.sessions.read();
            if let Some(log) = sessions.get(&record.session_id) {
                log.lock().push(record.clone());
                return;
            }
        }
        let mut sessions = self.sessions.write();
        sessions
            .entry(record.session_id.clone())
            .or_default()
            .lock()
            .push(record.clone());
    }
}

#[async_trait]
impl ThoughtPathStore for InMemoryThoughtPathStore {
    fn provider_name(&self) -> &'static str {
        "in-memory"
    }

    async fn append(&self, record: &ThoughtPathRecord) -> Result<String> {
        self.push(record);
        Ok(record.id.clone())
    }

    async fn list(&self, session_id: &str) -> Result<Vec<ThoughtPathRecord>> {
        let log = self.sessions.read().get(session_id).cloned();
        let records = match log {
            Some(log) => {
                let guard = log.lock();
                guard.clone()
            }
            None => Vec::new(),
        };
        Ok(records)
    }

    async fn delete(&self, session_id: &str) -> Result<usize> {
        let mut sessions = self.sessions.write();
        let count = match sessions.remove(session_id) {
            Some(log) => log.lock().drain(..).count(),
            None => 0,
        };
        Ok(count)
    }

    async fn sessions(&self) -> Result<Vec<SessionSummary>> {
        let sessions = self.sessions.read();
        let mut summaries: Vec<SessionSummary> = sessions
            .iter()
            .filter_map(|(id, log)| {
                let records = log.lock();
                let first = records.first()?;
                let last = records.last()?;
                Some(SessionSummary {
                    session_id: id.clone(),
                    runs: records.len(),
                    first_query: first.query.clone(),
                    last_activity: last.created_at,
                })
            })
            .collect();
        summaries.sort_by(|a, b| {
            b.last_activity
                .cmp(&a.last_activity)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        Ok(summaries)
    }
}
