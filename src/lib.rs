//! IQIDE Command Center - 请求编排引擎
//!
//! 模块划分：
//! - **agent**: 由配置组装 CommandCenter（CLI / HTTP 共用）
//! - **checkpoint**: 检查点存储（内存 / SQLite），支持挂起后跨进程恢复
//! - **command**: 确定性命令路径（正则解析 → 固定模板 → 顺序执行 → 格式化）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 编排状态、状态机、引擎与对外 turn API
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **memory**: 对话历史
//! - **observability**: tracing 初始化
//! - **react**: 编排节点的业务逻辑（意图、规划、推理、审批策略、摘要）
//! - **session**: 会话上下文与会话注册表
//! - **tools**: 工具注册表、能力组、分发器与内置工具

pub mod agent;
pub mod checkpoint;
pub mod command;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod session;
pub mod tools;

pub use agent::{build_command_center, CenterBuilder};
pub use core::{ApproveResponse, CommandCenter, ExecuteResponse, RoutingMode, TurnStatus};
