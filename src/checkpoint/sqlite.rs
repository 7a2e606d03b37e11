//! SQLite 检查点存储
//!
//! rusqlite 为同步 API，所有访问经 spawn_blocking 执行；同一连接由 Mutex 串行化。

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::{Checkpoint, CheckpointError, CheckpointStore};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS checkpoints (
    session_id TEXT PRIMARY KEY,
    node       TEXT NOT NULL,
    state      TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
";

pub struct SqliteCheckpointStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCheckpointStore {
    /// 打开（或创建）数据库文件
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CheckpointError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        tracing::info!(path = %path.display(), "Checkpoint store opened");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 内存数据库（测试用）
    pub fn in_memory() -> Result<Self, CheckpointError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, CheckpointError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, CheckpointError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| CheckpointError::Unavailable("connection lock poisoned".into()))?;
            f(&guard)
        })
        .await
        .map_err(|e| CheckpointError::Unavailable(e.to_string()))?
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let session_id = checkpoint.session_id.clone();
        let node = checkpoint.node.as_str().to_string();
        let state = serde_json::to_string(&checkpoint.state)?;
        let updated_at = checkpoint.updated_at;
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO checkpoints (session_id, node, state, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(session_id) DO UPDATE SET
                     node = excluded.node,
                     state = excluded.state,
                     updated_at = excluded.updated_at",
                params![session_id, node, state, updated_at],
            )?;
            Ok(())
        })
        .await
    }

    async fn load(&self, session_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        let session_id = session_id.to_string();
        let row = self
            .with_conn(move |conn| {
                let row = conn
                    .query_row(
                        "SELECT session_id, node, state, updated_at FROM checkpoints WHERE session_id = ?1",
                        [&session_id],
                        |row| {
                            Ok((
                                row.get::<_, String>(0)?,
                                row.get::<_, String>(1)?,
                                row.get::<_, String>(2)?,
                                row.get::<_, DateTime<Utc>>(3)?,
                            ))
                        },
                    )
                    .optional()?;
                Ok(row)
            })
            .await?;

        let Some((session_id, node, state, updated_at)) = row else {
            return Ok(None);
        };
        let node = serde_json::from_value(serde_json::Value::String(node))?;
        let state = serde_json::from_str(&state)?;
        Ok(Some(Checkpoint {
            session_id,
            node,
            state,
            updated_at,
        }))
    }

    async fn delete(&self, session_id: &str) -> Result<(), CheckpointError> {
        let session_id = session_id.to_string();
        self.with_conn(move |conn| {
            conn.execute("DELETE FROM checkpoints WHERE session_id = ?1", [&session_id])?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::machine::Node;
    use crate::core::state::{ApprovalRequest, OrchestrationState};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_sqlite_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state").join("checkpoints.db");

        let mut state = OrchestrationState::new("s1", "run command rm -rf /tmp/x", &[]);
        state.request_approval(ApprovalRequest {
            reason: "Dangerous operation: rm -rf".into(),
            tool_call_id: "c1".into(),
            tool_name: "run_command".into(),
        });
        let saved = Checkpoint::new(Node::Suspended, &state);
        {
            let store = SqliteCheckpointStore::open(&path).unwrap();
            store.save(&saved).await.unwrap();
        }

        let reopened = SqliteCheckpointStore::open(&path).unwrap();
        let loaded = reopened.load("s1").await.unwrap().unwrap();
        assert_eq!(loaded.node, Node::Suspended);
        assert!(loaded.is_awaiting_approval());
        assert_eq!(loaded.state, state);
        assert_eq!(loaded.updated_at, saved.updated_at);
    }

    #[tokio::test]
    async fn test_sqlite_missing_and_delete() {
        let store = SqliteCheckpointStore::in_memory().unwrap();
        assert!(store.load("nope").await.unwrap().is_none());
        let state = OrchestrationState::new("s2", "hello", &[]);
        store.save(&Checkpoint::new(Node::Done, &state)).await.unwrap();
        store.delete("s2").await.unwrap();
        assert!(store.load("s2").await.unwrap().is_none());
    }
}
