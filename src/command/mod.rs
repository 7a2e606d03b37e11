//! 确定性命令路径：解析 → 路由到固定模板 → 顺序执行 → 格式化
//!
//! 不经过模型，适合 "restart nginx"、"run command uptime" 这类固定句式。

pub mod executor;
pub mod formatter;
pub mod parser;
pub mod router;

pub use executor::{ExecutionReport, PlanExecutor, StepResult};
pub use formatter::{format_report, format_unknown};
pub use parser::{ActionKind, ParsedIntent, RequestParser};
pub use router::{ActionStep, PlanRouter};
