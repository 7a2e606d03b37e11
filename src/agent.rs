//! 组装：由配置构建 CommandCenter
//!
//! 供 CLI 与 HTTP 前端共用：LLM 后端、内置工具注册表、检查点存储、会话注册表、审批策略。
//! 测试或嵌入场景可用 `CenterBuilder` 替换 LLM、服务后端或整个工具注册表。

use std::path::PathBuf;
use std::sync::Arc;

use crate::checkpoint::{CheckpointStore, MemoryCheckpointStore, SqliteCheckpointStore};
use crate::config::{load_config, AppConfig, CheckpointSection};
use crate::core::{CommandCenter, Engine, EngineSettings, OrchestratorError};
use crate::llm::{create_llm_from_config, LlmClient};
use crate::react::PolicyGate;
use crate::session::SessionRegistry;
use crate::tools::{builtin_registry, ServiceManager, SystemServiceManager, ToolDispatcher, ToolRegistry};

/// 加载配置，失败时告警并使用默认值
pub fn load_config_or_default(path: Option<PathBuf>) -> AppConfig {
    load_config(path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    })
}

/// 按 [checkpoint] 配置打开检查点存储
pub fn open_checkpoint_store(cfg: &CheckpointSection) -> Result<Arc<dyn CheckpointStore>, OrchestratorError> {
    match cfg.backend.to_lowercase().as_str() {
        "sqlite" => {
            let store = SqliteCheckpointStore::open(&cfg.db_path)?;
            tracing::info!(path = %cfg.db_path.display(), "Using SQLite checkpoints");
            Ok(Arc::new(store))
        }
        "memory" => {
            tracing::info!("Using in-memory checkpoints");
            Ok(Arc::new(MemoryCheckpointStore::new()))
        }
        other => Err(OrchestratorError::Config(format!(
            "unknown checkpoint backend: {}",
            other
        ))),
    }
}

/// 可替换部件的构建器；未设置的部件按配置创建
pub struct CenterBuilder {
    cfg: AppConfig,
    llm: Option<Arc<dyn LlmClient>>,
    services: Option<Arc<dyn ServiceManager>>,
    registry: Option<ToolRegistry>,
    checkpoints: Option<Arc<dyn CheckpointStore>>,
}

impl CenterBuilder {
    pub fn new(cfg: AppConfig) -> Self {
        Self {
            cfg,
            llm: None,
            services: None,
            registry: None,
            checkpoints: None,
        }
    }

    pub fn llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn services(mut self, services: Arc<dyn ServiceManager>) -> Self {
        self.services = Some(services);
        self
    }

    /// 替换整个工具注册表（忽略 services）
    pub fn registry(mut self, registry: ToolRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn checkpoints(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = Some(store);
        self
    }

    pub fn build(self) -> Result<CommandCenter, OrchestratorError> {
        let cfg = self.cfg;

        let llm = self.llm.unwrap_or_else(|| create_llm_from_config(&cfg.llm));
        let registry = match self.registry {
            Some(registry) => registry,
            None => {
                let services = self
                    .services
                    .unwrap_or_else(|| Arc::new(SystemServiceManager::new(cfg.tools.shell.timeout_secs)));
                builtin_registry(&cfg.tools, services)
            }
        };
        let dispatcher = Arc::new(ToolDispatcher::new(registry, cfg.tools.tool_timeout_secs));
        let checkpoints = match self.checkpoints {
            Some(store) => store,
            None => open_checkpoint_store(&cfg.checkpoint)?,
        };

        let engine = Engine::new(
            llm,
            dispatcher,
            checkpoints,
            EngineSettings::from(&cfg.orchestration),
        )
        .with_policy(PolicyGate::from_config(&cfg.policy));

        let workspace = match cfg.app.workspace_root.clone() {
            Some(root) => root,
            None => std::env::current_dir().map_err(|e| OrchestratorError::Config(e.to_string()))?,
        };
        let sessions = Arc::new(SessionRegistry::new(
            workspace,
            cfg.app.max_history,
            cfg.app.max_context_turns,
        ));

        tracing::info!(tools = engine.dispatcher().tool_names().len(), "command center ready");
        Ok(CommandCenter::new(sessions, engine))
    }
}

/// 按配置构建 CommandCenter
pub fn build_command_center(cfg: AppConfig) -> Result<CommandCenter, OrchestratorError> {
    CenterBuilder::new(cfg).build()
}
