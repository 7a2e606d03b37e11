//! 核心编排层：状态定义、状态机、引擎、对外 turn API

pub mod center;
pub mod engine;
pub mod error;
pub mod machine;
pub mod state;

pub use center::{ApproveResponse, CommandCenter, ExecuteResponse, RoutingMode, TurnStatus};
pub use engine::{Engine, EngineSettings, TurnOutcome};
pub use error::OrchestratorError;
pub use machine::{transition, Event, Node};
pub use state::{
    ApprovalRequest, ApprovalStatus, ExecutionMode, FailureKind, Intent, OrchestrationState, Plan,
    PlanStep, StepStatus, ToolCall, ToolResult, TurnFailure, VerificationResult,
};
