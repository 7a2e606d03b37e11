//! 会话注册表
//!
//! 注入式（非全局）的 session_id → 会话映射。每个会话包在自己的 Mutex 中：
//! 一次编排遍历全程持有该锁，因此同一会话同时只有一个活跃遍历，不同会话互不阻塞。

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use super::{Session, SessionId};

pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<Mutex<Session>>>>,
    default_directory: PathBuf,
    max_history: usize,
    max_context_turns: usize,
}

impl SessionRegistry {
    pub fn new(default_directory: impl Into<PathBuf>, max_history: usize, max_context_turns: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            default_directory: default_directory.into(),
            max_history,
            max_context_turns,
        }
    }

    pub fn new_session_id() -> SessionId {
        format!("session_{}", uuid::Uuid::new_v4())
    }

    /// 获取会话；id 缺失时新建，id 未知时以该 id 新建（进程重启后仍可用旧 id 恢复检查点）
    pub async fn get_or_create(&self, id: Option<&str>) -> (SessionId, Arc<Mutex<Session>>) {
        let id = match id.map(str::trim).filter(|s| !s.is_empty()) {
            Some(id) => id.to_string(),
            None => Self::new_session_id(),
        };
        if let Some(session) = self.sessions.read().await.get(&id) {
            return (id, Arc::clone(session));
        }
        let mut sessions = self.sessions.write().await;
        let session = sessions.entry(id.clone()).or_insert_with(|| {
            tracing::info!(session = %id, "Session created");
            Arc::new(Mutex::new(Session::new(
                id.clone(),
                self.default_directory.clone(),
                self.max_history,
                self.max_context_turns,
            )))
        });
        (id, Arc::clone(session))
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Mutex<Session>>> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn remove(&self, id: &str) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
