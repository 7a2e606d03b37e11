//! 请求解析（确定性路径的前端）
//!
//! 按固定顺序匹配正则（忽略大小写，首个命中即返回），把请求映射到一个封闭的动作集合并提取目标参数。
//! 都不命中时为 Unknown，置信度 0。

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

/// 确定性路径支持的动作
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    RestartService,
    StartService,
    StopService,
    CheckService,
    RunCommand,
    ListServices,
    Unknown,
}

impl ActionKind {
    pub const SUPPORTED: [ActionKind; 6] = [
        ActionKind::RestartService,
        ActionKind::StartService,
        ActionKind::StopService,
        ActionKind::CheckService,
        ActionKind::RunCommand,
        ActionKind::ListServices,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::RestartService => "restart_service",
            ActionKind::StartService => "start_service",
            ActionKind::StopService => "stop_service",
            ActionKind::CheckService => "check_service",
            ActionKind::RunCommand => "run_command",
            ActionKind::ListServices => "list_services",
            ActionKind::Unknown => "unknown",
        }
    }

    /// 面向用户的动词（restart / start / ...）
    pub fn verb(&self) -> &'static str {
        match self {
            ActionKind::RestartService => "restart",
            ActionKind::StartService => "start",
            ActionKind::StopService => "stop",
            ActionKind::CheckService => "check",
            ActionKind::RunCommand => "run",
            ActionKind::ListServices => "list",
            ActionKind::Unknown => "operation",
        }
    }
}

/// 解析结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedIntent {
    pub action: ActionKind,
    pub target: Option<String>,
    pub original_request: String,
    pub confidence: f32,
}

impl ParsedIntent {
    pub fn is_unknown(&self) -> bool {
        self.action == ActionKind::Unknown
    }
}

/// 按顺序尝试的模式；带捕获组的模式第 1 组为目标
const PATTERNS: &[(&str, ActionKind)] = &[
    (r"\b(?:restart|reboot|reload)\s+(?:the\s+)?([\w@.\-]+)", ActionKind::RestartService),
    (r"\bstart\s+the\s+([\w@.\-]+)", ActionKind::StartService),
    (r"\bstart\s+([\w@.\-]+)", ActionKind::StartService),
    (r"\bstop\s+the\s+([\w@.\-]+)", ActionKind::StopService),
    (r"\bstop\s+([\w@.\-]+)", ActionKind::StopService),
    (r"\bcheck\s+(?:the\s+)?([\w@.\-]+)", ActionKind::CheckService),
    (r"\bstatus\s+of\s+(?:the\s+)?([\w@.\-]+)", ActionKind::CheckService),
    (r"\bstatus\s+([\w@.\-]+)", ActionKind::CheckService),
    (r"\bis\s+([\w@.\-]+)\s+running", ActionKind::CheckService),
    (r"\b([\w@.\-]+)\s+status\b", ActionKind::CheckService),
    (r"\brun\s+command\s+(.+)", ActionKind::RunCommand),
    (r"\bexecute\s+(.+)", ActionKind::RunCommand),
    (r"\brun\s+(.+)", ActionKind::RunCommand),
    (r"\blist\s+services\b", ActionKind::ListServices),
    (r"\bshow\s+services\b", ActionKind::ListServices),
    (r"\bwhat\s+services\s+are\s+running\b", ActionKind::ListServices),
];

pub struct RequestParser {
    patterns: Vec<(Regex, ActionKind)>,
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestParser {
    pub fn new() -> Self {
        let patterns = PATTERNS
            .iter()
            .filter_map(|(pattern, action)| {
                match RegexBuilder::new(pattern).case_insensitive(true).build() {
                    Ok(re) => Some((re, *action)),
                    Err(e) => {
                        tracing::error!(pattern = %pattern, error = %e, "invalid request pattern");
                        None
                    }
                }
            })
            .collect();
        Self { patterns }
    }

    pub fn parse(&self, request: &str) -> ParsedIntent {
        let text = request.trim();
        for (re, action) in &self.patterns {
            if let Some(caps) = re.captures(text) {
                let target = caps
                    .get(1)
                    .map(|m| m.as_str().trim().to_string())
                    .filter(|t| !t.is_empty());
                return ParsedIntent {
                    action: *action,
                    target,
                    original_request: request.to_string(),
                    confidence: 1.0,
                };
            }
        }
        ParsedIntent {
            action: ActionKind::Unknown,
            target: None,
            original_request: request.to_string(),
            confidence: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> ParsedIntent {
        RequestParser::new().parse(s)
    }

    #[test]
    fn test_service_actions() {
        let p = parse("restart nginx");
        assert_eq!(p.action, ActionKind::RestartService);
        assert_eq!(p.target.as_deref(), Some("nginx"));
        assert_eq!(p.confidence, 1.0);

        assert_eq!(parse("Reload the apache2").target.as_deref(), Some("apache2"));
        assert_eq!(parse("please start the postgresql").action, ActionKind::StartService);
        assert_eq!(parse("start the postgresql").target.as_deref(), Some("postgresql"));
        assert_eq!(parse("stop redis").action, ActionKind::StopService);
        assert_eq!(parse("is docker running").target.as_deref(), Some("docker"));
        assert_eq!(parse("nginx status").action, ActionKind::CheckService);
        assert_eq!(parse("status of nginx").target.as_deref(), Some("nginx"));
    }

    #[test]
    fn test_run_command_keeps_original_case() {
        let p = parse("run command ls -la /tmp/MyDir");
        assert_eq!(p.action, ActionKind::RunCommand);
        assert_eq!(p.target.as_deref(), Some("ls -la /tmp/MyDir"));
        assert_eq!(parse("execute uptime").target.as_deref(), Some("uptime"));
        assert_eq!(parse("run command rm -rf /").target.as_deref(), Some("rm -rf /"));
    }

    #[test]
    fn test_list_services_variants() {
        assert_eq!(parse("list services").action, ActionKind::ListServices);
        assert_eq!(parse("show services").action, ActionKind::ListServices);
        assert_eq!(parse("what services are running").action, ActionKind::ListServices);
    }

    #[test]
    fn test_unknown() {
        let p = parse("tell me a joke");
        assert!(p.is_unknown());
        assert_eq!(p.confidence, 0.0);
        assert!(p.target.is_none());
    }
}
