//! 工具层：注册表、能力组映射、分发器与内置工具

pub mod capability;
pub mod dispatcher;
pub mod filesystem;
pub mod registry;
pub mod schema;
pub mod service;
pub mod shell;
pub mod system;
pub mod web;

use std::sync::Arc;

pub use capability::Capability;
pub use dispatcher::ToolDispatcher;
pub use filesystem::{ListFilesTool, ReadFileTool, WriteFileTool};
pub use registry::{Tool, ToolContext, ToolRegistry, ToolSpec};
pub use service::{ServiceManager, ServiceOp, ServiceStatus, ServiceTool, SystemServiceManager};
pub use shell::RunCommandTool;
pub use system::{ChangeDirectoryTool, CurrentDirectoryTool, SystemInfoTool};
pub use web::{FetchUrlTool, WebSearchTool};

use crate::config::ToolsSection;

/// 内置工具注册表；服务后端可注入（测试或非 systemd 环境）
pub fn builtin_registry(cfg: &ToolsSection, services: Arc<dyn ServiceManager>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    registry.register(ReadFileTool);
    registry.register(WriteFileTool);
    registry.register(ListFilesTool);

    registry.register(WebSearchTool::new(&cfg.web));
    registry.register(FetchUrlTool::new(&cfg.web));

    registry.register(RunCommandTool::new(
        cfg.shell.blocked_patterns.clone(),
        cfg.shell.timeout_secs,
    ));
    for op in ServiceOp::ALL {
        registry.register(ServiceTool::new(op, Arc::clone(&services)));
    }
    registry.register(SystemInfoTool);
    registry.register(ChangeDirectoryTool);
    registry.register(CurrentDirectoryTool);

    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry_covers_capability_table() {
        let services: Arc<dyn ServiceManager> = Arc::new(SystemServiceManager::new(5));
        let registry = builtin_registry(&ToolsSection::default(), services);
        for cap in [Capability::Code, Capability::Web, Capability::Action] {
            for name in cap.tools() {
                assert!(registry.contains(name), "missing builtin tool {name}");
            }
        }
        assert_eq!(registry.len(), 14);
    }
}
