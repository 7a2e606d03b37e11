//! 编排状态机：节点、事件与迁移表
//!
//! 迁移是纯函数 `transition(node, event)`，未列出的 (节点, 事件) 组合一律返回 InvalidTransition，
//! 因此图结构完全由本文件决定，引擎只负责执行节点并喂入事件。
//!
//! ```text
//! ingress ─► router ─┬─► chat_agent ─► done
//!                    ├─► planner ─► agent
//!                    └─► agent ◄──────────────┐
//!                          ├─► {code,web,action}_tools ─┘ (或转交下一能力组)
//!                          ├─► verify ─┬─► summarize ─► done
//!                          │           └─► hil ─┬─► summarize
//!                          │                    └─► suspended ─(resume)─► hil
//!                          └─► done（oracle 错误 / 超过迭代上限）
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::error::OrchestratorError;
use crate::core::state::{ExecutionMode, Intent};
use crate::tools::Capability;

/// 编排图中的节点
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Ingress,
    Router,
    ChatAgent,
    Planner,
    Agent,
    CodeTools,
    WebTools,
    ActionTools,
    Verify,
    Hil,
    Summarize,
    /// 等待审批：遍历在此暂停，只能由 resume 唤醒
    Suspended,
    Done,
}

impl Node {
    pub fn as_str(&self) -> &'static str {
        match self {
            Node::Ingress => "ingress",
            Node::Router => "router",
            Node::ChatAgent => "chat_agent",
            Node::Planner => "planner",
            Node::Agent => "agent",
            Node::CodeTools => "code_tools",
            Node::WebTools => "web_tools",
            Node::ActionTools => "action_tools",
            Node::Verify => "verify",
            Node::Hil => "hil",
            Node::Summarize => "summarize",
            Node::Suspended => "suspended",
            Node::Done => "done",
        }
    }

    /// 某能力组对应的工具节点
    pub fn tools_for(capability: Capability) -> Node {
        match capability {
            Capability::Code => Node::CodeTools,
            Capability::Web => Node::WebTools,
            Capability::Action => Node::ActionTools,
        }
    }

    /// 工具节点负责的能力组
    pub fn capability(&self) -> Option<Capability> {
        match self {
            Node::CodeTools => Some(Capability::Code),
            Node::WebTools => Some(Capability::Web),
            Node::ActionTools => Some(Capability::Action),
            _ => None,
        }
    }

    /// 遍历在此节点停下（完成或挂起）
    pub fn is_resting(&self) -> bool {
        matches!(self, Node::Done | Node::Suspended)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 节点执行后产生的事件
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// ingress：请求有效
    Validated,
    /// ingress：请求为空
    Rejected,
    /// router：分类完成
    Classified { intent: Intent, mode: ExecutionMode },
    /// chat_agent：已回复
    Replied,
    /// planner：计划已生成（含回退计划）
    Planned,
    /// agent：模型提出了工具调用，首个调用属于该能力组
    ToolsProposed(Capability),
    /// agent：模型给出最终文本
    Finished,
    /// agent / chat_agent：本轮终止（oracle 错误或超出迭代上限）
    Aborted,
    /// 工具节点：本组执行完毕，remaining 为仍待执行的下一能力组
    ToolsExecuted { remaining: Option<Capability> },
    /// verify / hil：无需审批
    Clear,
    /// verify：命中审批策略
    ApprovalRequired,
    /// hil：审批待定
    AwaitingApproval,
    /// hil：已批准
    Approved,
    /// hil：已拒绝
    Denied,
    /// suspended：外部提交了审批决定
    Resumed,
    /// summarize：报告已生成
    Summarized,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Classified { intent, mode } => {
                write!(f, "classified({}, {})", intent.as_str(), mode.as_str())
            }
            Event::ToolsProposed(cap) => write!(f, "tools_proposed({})", cap.as_str()),
            Event::ToolsExecuted { remaining } => match remaining {
                Some(cap) => write!(f, "tools_executed(next={})", cap.as_str()),
                None => f.write_str("tools_executed"),
            },
            other => write!(f, "{:?}", other),
        }
    }
}

/// 迁移表
pub fn transition(node: Node, event: &Event) -> Result<Node, OrchestratorError> {
    let next = match (node, event) {
        (Node::Ingress, Event::Validated) => Node::Router,
        (Node::Ingress, Event::Rejected) => Node::Summarize,

        (Node::Router, Event::Classified { intent: Intent::Chat, .. }) => Node::ChatAgent,
        (Node::Router, Event::Classified { mode: ExecutionMode::Planning, .. }) => Node::Planner,
        (Node::Router, Event::Classified { .. }) => Node::Agent,

        (Node::ChatAgent, Event::Replied | Event::Aborted) => Node::Done,

        (Node::Planner, Event::Planned) => Node::Agent,

        (Node::Agent, Event::ToolsProposed(cap)) => Node::tools_for(*cap),
        (Node::Agent, Event::Finished) => Node::Verify,
        (Node::Agent, Event::Aborted) => Node::Done,

        (Node::CodeTools | Node::WebTools | Node::ActionTools, Event::ToolsExecuted { remaining }) => {
            match remaining {
                Some(cap) => Node::tools_for(*cap),
                None => Node::Agent,
            }
        }

        (Node::Verify, Event::Clear) => Node::Summarize,
        (Node::Verify, Event::ApprovalRequired) => Node::Hil,

        (Node::Hil, Event::Clear | Event::Approved | Event::Denied) => Node::Summarize,
        (Node::Hil, Event::AwaitingApproval) => Node::Suspended,

        (Node::Suspended, Event::Resumed) => Node::Hil,

        (Node::Summarize, Event::Summarized) => Node::Done,

        (node, event) => {
            return Err(OrchestratorError::InvalidTransition {
                node,
                event: event.to_string(),
            })
        }
    };
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_router_branches() {
        let chat = Event::Classified {
            intent: Intent::Chat,
            mode: ExecutionMode::Simple,
        };
        let complex = Event::Classified {
            intent: Intent::Complex,
            mode: ExecutionMode::Planning,
        };
        let action = Event::Classified {
            intent: Intent::Action,
            mode: ExecutionMode::Simple,
        };
        assert_eq!(transition(Node::Router, &chat).unwrap(), Node::ChatAgent);
        assert_eq!(transition(Node::Router, &complex).unwrap(), Node::Planner);
        assert_eq!(transition(Node::Router, &action).unwrap(), Node::Agent);
    }

    #[test]
    fn test_tool_nodes_hand_off_then_return_to_agent() {
        let next = transition(
            Node::CodeTools,
            &Event::ToolsExecuted {
                remaining: Some(Capability::Web),
            },
        )
        .unwrap();
        assert_eq!(next, Node::WebTools);
        let back = transition(Node::WebTools, &Event::ToolsExecuted { remaining: None }).unwrap();
        assert_eq!(back, Node::Agent);
    }

    #[test]
    fn test_approval_path() {
        assert_eq!(transition(Node::Verify, &Event::ApprovalRequired).unwrap(), Node::Hil);
        assert_eq!(transition(Node::Hil, &Event::AwaitingApproval).unwrap(), Node::Suspended);
        assert_eq!(transition(Node::Suspended, &Event::Resumed).unwrap(), Node::Hil);
        assert_eq!(transition(Node::Hil, &Event::Denied).unwrap(), Node::Summarize);
    }

    #[test]
    fn test_invalid_pair_is_an_error() {
        let err = transition(Node::Done, &Event::Validated).unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidTransition { node: Node::Done, .. }));
        assert!(transition(Node::Suspended, &Event::Approved).is_err());
        assert!(transition(Node::Verify, &Event::Finished).is_err());
    }
}
