use crate::db::history::ThoughtPathStore;
use crate::types::{AppError, PathStep, Result, SessionSummary, ThoughtPathRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Builder, Connection, Database, Value};
use std::path::Path;
use tokio::sync::Mutex;

/// Thought-path history in a local SQLite file via libsql.
///
/// A record is one row in `thought_paths` (the full record as JSON plus the
/// columns needed for listing) and one row per agent visit in
/// `thought_path_steps`. Both are written in a single transaction.
pub struct SqliteThoughtPathStore {
    db: Database,
    // serializes transactions, libsql has no nested tx support
    write_lock: Mutex<()>,
}

impl SqliteThoughtPathStore {
    /// Open (or create) the database file and its schema.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    AppError::Database(format!("Failed to create {:?}: {}", parent, e))
                })?;
            }
        }

        let db = Builder::new_local(path)
            .build()
            .await
            .map_err(|e| AppError::Database(format!("Failed to open {:?}: {}", path, e)))?;

        let store = Self {
            db,
            write_lock: Mutex::new(()),
        };
        store.initialize_schema().await?;
        Ok(store)
    }

    pub fn connection(&self) -> Result<Connection> {
        self.db
            .connect()
            .map_err(|e| AppError::Database(format!("Failed to get connection: {}", e)))
    }

    async fn initialize_schema(&self) -> Result<()> {
        let conn = self.connection()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS thought_paths (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT UNIQUE NOT NULL,
                session_id TEXT NOT NULL,
                query TEXT NOT NULL,
                intent TEXT NOT NULL,
                report TEXT NOT NULL,
                partial INTEGER NOT NULL,
                record_json TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )",
            (),
        )
        .await
        .map_err(|e| AppError::Database(format!("Failed to create thought_paths table: {}", e)))?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_thought_paths_session
             ON thought_paths(session_id, seq)",
            (),
        )
        .await
        .map_err(|e| AppError::Database(format!("Failed to create session index: {}", e)))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS thought_path_steps (
                record_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                agent TEXT NOT NULL,
                state TEXT NOT NULL,
                task_id TEXT,
                started_at INTEGER NOT NULL,
                PRIMARY KEY (record_id, position),
                FOREIGN KEY (record_id) REFERENCES thought_paths(id)
            )",
            (),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to create thought_path_steps table: {}", e))
        })?;

        Ok(())
    }

    /// Agent visits stored for one record, in path order.
    pub async fn path_steps(&self, record_id: &str) -> Result<Vec<(String, String, Option<String>)>> {
        let conn = self.connection()?;
        let mut rows = conn
            .query(
                "SELECT agent, state, task_id FROM thought_path_steps
                 WHERE record_id = ? ORDER BY position ASC",
                [record_id],
            )
            .await
            .map_err(|e| AppError::Database(format!("Failed to query steps: {}", e)))?;

        let mut steps = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
        {
            let task_id = match row.get_value(2).map_err(|e| AppError::Database(e.to_string()))? {
                Value::Text(t) => Some(t),
                _ => None,
            };
            steps.push((
                row.get(0).map_err(|e| AppError::Database(e.to_string()))?,
                row.get(1).map_err(|e| AppError::Database(e.to_string()))?,
                task_id,
            ));
        }
        Ok(steps)
    }

    async fn collect_records(&self, sql: &str, params: Vec<Value>) -> Result<Vec<ThoughtPathRecord>> {
        let conn = self.connection()?;
        let mut rows = conn
            .query(sql, params)
            .await
            .map_err(|e| AppError::Database(format!("Failed to query thought paths: {}", e)))?;

        let mut records = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
        {
            let json: String = row.get(0).map_err(|e| AppError::Database(e.to_string()))?;
            let record: ThoughtPathRecord = serde_json::from_str(&json)
                .map_err(|e| AppError::Database(format!("Corrupt thought path row: {}", e)))?;
            records.push(record);
        }
        Ok(records)
    }
}

fn step_state(step: &PathStep) -> String {
    serde_json::to_value(step.state)
        .ok()
        .and_then(|v| v.as_str().map(String::from))
        .unwrap_or_default()
}

#[async_trait]
impl ThoughtPathStore for SqliteThoughtPathStore {
    fn provider_name(&self) -> &'static str {
        "sqlite"
    }

    async fn append(&self, record: &ThoughtPathRecord) -> Result<String> {
        let json = serde_json::to_string(record)
            .map_err(|e| AppError::Database(format!("Failed to serialize record: {}", e)))?;

        let _guard = self.write_lock.lock().await;
        let conn = self.connection()?;
        let tx = conn
            .transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        tx.execute(
            "INSERT INTO thought_paths
                (id, session_id, query, intent, report, partial, record_json, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            vec![
                Value::from(record.id.clone()),
                Value::from(record.session_id.clone()),
                Value::from(record.query.clone()),
                Value::from(record.intent.to_string()),
                Value::from(record.report.clone()),
                Value::from(record.partial as i64),
                Value::from(json),
                Value::from(record.created_at.timestamp()),
            ],
        )
        .await
        .map_err(|e| AppError::Database(format!("Failed to insert thought path: {}", e)))?;

        for (position, step) in record.agent_path.steps().iter().enumerate() {
            let task_id = match &step.task_id {
                Some(id) => Value::from(id.clone()),
                None => Value::Null,
            };
            tx.execute(
                "INSERT INTO thought_path_steps
                    (record_id, position, agent, state, task_id, started_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
                vec![
                    Value::from(record.id.clone()),
                    Value::from(position as i64),
                    Value::from(step.agent.as_str().to_string()),
                    Value::from(step_state(step)),
                    task_id,
                    Value::from(step.started_at.timestamp_millis()),
                ],
            )
            .await
            .map_err(|e| AppError::Database(format!("Failed to insert path step: {}", e)))?;
        }

        tx.commit()
            .await
            .map_err(|e| AppError::Database(format!("Failed to commit thought path: {}", e)))?;

        Ok(record.id.clone())
    }

    async fn list(&self, session_id: &str) -> Result<Vec<ThoughtPathRecord>> {
        self.collect_records(
            "SELECT record_json FROM thought_paths WHERE session_id = ? ORDER BY seq ASC",
            vec![Value::from(session_id.to_string())],
        )
        .await
    }

    async fn recent(&self, session_id: &str, limit: usize) -> Result<Vec<ThoughtPathRecord>> {
        let mut records = self
            .collect_records(
                "SELECT record_json FROM thought_paths WHERE session_id = ?
                 ORDER BY seq DESC LIMIT ?",
                vec![
                    Value::from(session_id.to_string()),
                    Value::from(limit as i64),
                ],
            )
            .await?;
        records.reverse();
        Ok(records)
    }

    async fn delete(&self, session_id: &str) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let conn = self.connection()?;
        let tx = conn
            .transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        tx.execute(
            "DELETE FROM thought_path_steps WHERE record_id IN
                (SELECT id FROM thought_paths WHERE session_id = ?)",
            [session_id],
        )
        .await
        .map_err(|e| AppError::Database(format!("Failed to delete path steps: {}", e)))?;

        let removed = tx
            .execute("DELETE FROM thought_paths WHERE session_id = ?", [session_id])
            .await
            .map_err(|e| AppError::Database(format!("Failed to delete thought paths: {}", e)))?;

        tx.commit()
            .await
            .map_err(|e| AppError::Database(format!("Failed to commit delete: {}", e)))?;

        Ok(removed as usize)
    }

    async fn sessions(&self) -> Result<Vec<SessionSummary>> {
        let conn = self.connection()?;
        let mut rows = conn
            .query(
                "SELECT t.session_id,
                        COUNT(*),
                        (SELECT query FROM thought_paths f
                          WHERE f.session_id = t.session_id ORDER BY seq ASC LIMIT 1),
                        MAX(t.created_at)
                 FROM thought_paths t
                 GROUP BY t.session_id
                 ORDER BY MAX(t.created_at) DESC, t.session_id ASC",
                (),
            )
            .await
            .map_err(|e| AppError::Database(format!("Failed to query sessions: {}", e)))?;

        let mut sessions = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
        {
            let last: i64 = row.get(3).map_err(|e| AppError::Database(e.to_string()))?;
            sessions.push(SessionSummary {
                session_id: row.get(0).map_err(|e| AppError::Database(e.to_string()))?,
                runs: row.get::<i64>(1).map_err(|e| AppError::Database(e.to_string()))? as usize,
                first_query: row.get(2).map_err(|e| AppError::Database(e.to_string()))?,
                last_activity: DateTime::from_timestamp(last, 0).unwrap_or_else(Utc::now),
            });
        }
        Ok(sessions)
    }
}
