//! 认知层：编排图中各节点的业务逻辑（意图分类、规划、推理、审批策略、人工闸门、摘要）
//!
//! 节点之间的流转由 core::machine 决定，这里的函数只读写 OrchestrationState。

pub mod agent;
pub mod chat;
pub mod hil;
pub mod intent;
pub mod planner;
pub mod summarize;
pub mod verify;

pub use agent::{think, AgentTurn, AGENT_SYSTEM_PROMPT};
pub use chat::chat_reply;
pub use hil::{HilDecision, REJECTED_MESSAGE};
pub use intent::{classify, Classification};
pub use planner::{parse_plan_steps, PlanOutcome, Planner};
pub use summarize::summarize;
pub use verify::{PolicyGate, PolicyViolation};
