//! 检查点：每次节点迁移后持久化 (节点, OrchestrationState)
//!
//! 以 session_id 为键，每个会话只保留最新一份；恢复时从保存的节点继续，不重放已完成节点。
//! 遍历到达 done 时删除该会话的检查点（结果已写回会话历史）。
//! 默认内存实现，配置 `checkpoint.backend = "sqlite"` 时使用 SQLite（进程重启后仍可恢复挂起的审批）。

pub mod sqlite;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::core::machine::Node;
use crate::core::state::OrchestrationState;

pub use sqlite::SqliteCheckpointStore;

#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("checkpoint store unavailable: {0}")]
    Unavailable(String),
}

/// 一份检查点：node 为下一步要执行（或停留）的节点
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Checkpoint {
    pub session_id: String,
    pub node: Node,
    pub state: OrchestrationState,
    pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
    pub fn new(node: Node, state: &OrchestrationState) -> Self {
        Self {
            session_id: state.session_id.clone(),
            node,
            state: state.clone(),
            updated_at: Utc::now(),
        }
    }

    /// 挂起在审批上
    pub fn is_awaiting_approval(&self) -> bool {
        self.node == Node::Suspended && self.state.is_pending_approval()
    }
}

/// 检查点存储接口
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// 覆盖保存该会话的检查点
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError>;

    async fn load(&self, session_id: &str) -> Result<Option<Checkpoint>, CheckpointError>;

    async fn delete(&self, session_id: &str) -> Result<(), CheckpointError>;
}

/// 内存检查点（进程内有效）
#[derive(Default)]
pub struct MemoryCheckpointStore {
    entries: RwLock<HashMap<String, Checkpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        self.entries
            .write()
            .await
            .insert(checkpoint.session_id.clone(), checkpoint.clone());
        Ok(())
    }

    async fn load(&self, session_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        Ok(self.entries.read().await.get(session_id).cloned())
    }

    async fn delete(&self, session_id: &str) -> Result<(), CheckpointError> {
        self.entries.write().await.remove(session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_overwrites_per_session() {
        let store = MemoryCheckpointStore::new();
        let state = OrchestrationState::new("s1", "check nginx", &[]);
        store.save(&Checkpoint::new(Node::Router, &state)).await.unwrap();
        store.save(&Checkpoint::new(Node::Agent, &state)).await.unwrap();

        assert_eq!(store.len().await, 1);
        let loaded = store.load("s1").await.unwrap().unwrap();
        assert_eq!(loaded.node, Node::Agent);
        assert!(!loaded.is_awaiting_approval());

        store.delete("s1").await.unwrap();
        assert!(store.load("s1").await.unwrap().is_none());
    }
}
