//! hil 节点：人工审批闸门
//!
//! 无需审批时直接放行；待审批时挂起（由引擎持久化检查点并返回 Suspended）；
//! 恢复后 approved 放行到 summarize，rejected 记录终止性错误后同样进入 summarize，不会自动重试。

use crate::core::{ApprovalStatus, FailureKind, OrchestrationState};

pub const REJECTED_MESSAGE: &str = "Operation rejected by user";

/// 闸门判定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HilDecision {
    PassThrough,
    Suspend,
    Approved,
    Rejected,
}

pub fn gate(state: &mut OrchestrationState) -> HilDecision {
    if !state.requires_approval {
        return HilDecision::PassThrough;
    }
    match state.approval_status {
        ApprovalStatus::Pending => HilDecision::Suspend,
        ApprovalStatus::Approved => {
            state.approval_request = None;
            HilDecision::Approved
        }
        ApprovalStatus::Rejected => {
            state.approval_request = None;
            state.fail(FailureKind::ApprovalRejected, REJECTED_MESSAGE);
            HilDecision::Rejected
        }
        ApprovalStatus::None => {
            // 需要审批但尚未发起请求：补成待审批
            state.approval_status = ApprovalStatus::Pending;
            HilDecision::Suspend
        }
    }
}

/// 写入外部审批决定（仅在待审批时有效）
pub fn apply_decision(state: &mut OrchestrationState, approved: bool) -> bool {
    if !state.is_pending_approval() {
        return false;
    }
    state.approval_status = if approved {
        ApprovalStatus::Approved
    } else {
        ApprovalStatus::Rejected
    };
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ApprovalRequest;

    fn pending_state() -> OrchestrationState {
        let mut state = OrchestrationState::new("s1", "run command rm -rf /", &[]);
        state.request_approval(ApprovalRequest {
            reason: "Dangerous operation detected".into(),
            tool_call_id: "c1".into(),
            tool_name: "run_command".into(),
        });
        state
    }

    #[test]
    fn test_pass_through_without_approval() {
        let mut state = OrchestrationState::new("s1", "list files", &[]);
        assert_eq!(gate(&mut state), HilDecision::PassThrough);
    }

    #[test]
    fn test_pending_suspends_then_rejection_fails_turn() {
        let mut state = pending_state();
        assert_eq!(gate(&mut state), HilDecision::Suspend);
        assert!(apply_decision(&mut state, false));
        assert_eq!(gate(&mut state), HilDecision::Rejected);
        assert_eq!(state.errors, vec![REJECTED_MESSAGE.to_string()]);
        assert!(!state.succeeded());
        assert!(state.approval_request.is_none());
        assert!(!apply_decision(&mut state, true));
    }

    #[test]
    fn test_approval_clears_request() {
        let mut state = pending_state();
        assert!(apply_decision(&mut state, true));
        assert_eq!(gate(&mut state), HilDecision::Approved);
        assert!(state.succeeded());
    }
}
