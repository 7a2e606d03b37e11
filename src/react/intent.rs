//! 意图分类（router 节点）
//!
//! 纯关键词规则，无外部调用：complex > code > web > action，都不命中则为 chat。
//! code 意图在请求词数超过阈值时升级为 planning 模式；complex 总是 planning。

use crate::core::{ExecutionMode, Intent};

const COMPLEX_KEYWORDS: &[&str] = &[
    "refactor",
    "migrate",
    "implement",
    "add authentication",
    "add feature",
    "restructure",
    "redesign",
];

const CODE_KEYWORDS: &[&str] = &[
    "file", "code", "function", "class", "import", "refactor", "edit", "create", "modify", "add",
    "remove", "test", "bug", "fix", "implement", "feature", "module", "package",
];

const WEB_KEYWORDS: &[&str] = &[
    "search",
    "find",
    "lookup",
    "web",
    "internet",
    "url",
    "fetch",
    "research",
    "information",
    "about",
];

const ACTION_KEYWORDS: &[&str] = &[
    "run", "execute", "command", "service", "system", "check", "start", "stop", "restart", "status",
];

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| text.contains(k))
}

/// 分类结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub intent: Intent,
    pub mode: ExecutionMode,
}

/// 对一条用户消息分类；planning_threshold 为 code 意图升级 planning 的词数阈值
pub fn classify(message: &str, planning_threshold: usize) -> Classification {
    let text = message.to_lowercase();

    let (intent, mode) = if contains_any(&text, COMPLEX_KEYWORDS) {
        (Intent::Complex, ExecutionMode::Planning)
    } else if contains_any(&text, CODE_KEYWORDS) {
        let mode = if text.split_whitespace().count() > planning_threshold {
            ExecutionMode::Planning
        } else {
            ExecutionMode::Simple
        };
        (Intent::Code, mode)
    } else if contains_any(&text, WEB_KEYWORDS) {
        (Intent::Web, ExecutionMode::Simple)
    } else if contains_any(&text, ACTION_KEYWORDS) {
        (Intent::Action, ExecutionMode::Simple)
    } else {
        (Intent::Chat, ExecutionMode::Simple)
    };

    Classification { intent, mode }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence() {
        let c = classify("refactor the session module", 10);
        assert_eq!(c.intent, Intent::Complex);
        assert_eq!(c.mode, ExecutionMode::Planning);

        assert_eq!(classify("fix the bug in main.rs", 10).intent, Intent::Code);
        assert_eq!(classify("search for tokio docs", 10).intent, Intent::Web);
        assert_eq!(classify("restart nginx", 10).intent, Intent::Action);
        assert_eq!(classify("run command rm -rf /", 10).intent, Intent::Action);
    }

    #[test]
    fn test_unrecognized_defaults_to_chat() {
        let c = classify("hello there", 10);
        assert_eq!(c.intent, Intent::Chat);
        assert_eq!(c.mode, ExecutionMode::Simple);
        assert_eq!(classify("", 10).intent, Intent::Chat);
    }

    #[test]
    fn test_long_code_request_escalates_to_planning() {
        let short = classify("edit the config loader", 10);
        assert_eq!(short.mode, ExecutionMode::Simple);
        let long = classify(
            "please edit the config loader so that it also reads values from a second file",
            10,
        );
        assert_eq!(long.intent, Intent::Code);
        assert_eq!(long.mode, ExecutionMode::Planning);
    }
}
