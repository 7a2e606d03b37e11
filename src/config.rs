//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `IQIDE__*` 覆盖（双下划线表示嵌套，如 `IQIDE__ORCHESTRATION__MAX_ITERATIONS=8`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub orchestration: OrchestrationSection,
    pub tools: ToolsSection,
    pub policy: PolicySection,
    pub checkpoint: CheckpointSection,
    pub server: ServerSection,
}

/// [app] 段：应用名、初始工作目录、会话记录上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 新会话的初始工作目录，未设置时用进程当前目录
    pub workspace_root: Option<PathBuf>,
    /// recent_commands / recent_actions / file_history 的环形缓冲大小
    pub max_history: usize,
    /// 对话历史保留轮数（短期记忆）
    pub max_context_turns: usize,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            workspace_root: None,
            max_history: 10,
            max_context_turns: 20,
        }
    }
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：openai / deepseek / mock
    pub provider: String,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub temperature: f32,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            model: None,
            base_url: None,
            temperature: 0.2,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    /// 单次模型请求超时（秒）
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 60 }
    }
}

/// [orchestration] 段：迭代上限、规划阈值、摘要错误条数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestrationSection {
    /// 单轮 agent 最多模型调用次数
    pub max_iterations: usize,
    /// code 意图的请求超过该词数时进入 planning 模式
    pub planning_token_threshold: usize,
    pub summary_max_errors: usize,
}

impl Default for OrchestrationSection {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            planning_token_threshold: 10,
            summary_max_errors: 5,
        }
    }
}

/// [tools] 段：工具超时、Shell 禁止子串、Web 抓取参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
    pub shell: ShellSection,
    pub web: WebSection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
            shell: ShellSection::default(),
            web: WebSection::default(),
        }
    }
}

/// [tools.shell] 段：run_command 拒绝执行的子串
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShellSection {
    pub blocked_patterns: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for ShellSection {
    fn default() -> Self {
        Self {
            blocked_patterns: vec![
                "rm -rf /".into(),
                "rm -fr /".into(),
                "mkfs".into(),
                "dd if=".into(),
                "> /dev/sd".into(),
                ":(){ :|:& };:".into(),
            ],
            timeout_secs: 30,
        }
    }
}

/// [tools.web] 段：抓取超时、最大字符数、搜索入口、可选域名白名单（空 = 不限制）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WebSection {
    pub timeout_secs: u64,
    pub max_result_chars: usize,
    pub search_endpoint: String,
    pub allowed_domains: Vec<String>,
}

impl Default for WebSection {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            max_result_chars: 10_000,
            search_endpoint: "https://html.duckduckgo.com/html/".into(),
            allowed_domains: Vec::new(),
        }
    }
}

/// [policy] 段：需要人工审批的操作签名
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PolicySection {
    /// write_file 目标路径落在这些前缀下需要审批
    pub protected_paths: Vec<String>,
    /// run_command 命令中出现这些片段需要审批
    pub dangerous_command_patterns: Vec<String>,
    /// 调用这些工具一律需要审批
    pub service_control_tools: Vec<String>,
    /// run_command 中匹配该正则（不区分大小写）视为服务控制
    pub service_command_pattern: String,
}

const DEFAULT_SERVICE_COMMAND_PATTERN: &str =
    r"\b(systemctl|service|launchctl|rc-service)\b.*\b(start|stop|restart|reload|kill|load|unload|kickstart|bootout)\b";

impl Default for PolicySection {
    fn default() -> Self {
        Self {
            protected_paths: [
                "/etc/", "/usr/", "/var/", "/boot/", "/bin/", "/sbin/", "/lib/", "/sys/", "/proc/",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            dangerous_command_patterns: [
                "rm -rf", "rm -fr", "rm -r ", "mkfs", "dd if=", "chmod 777", "chmod +s",
                "shutdown", "reboot", "uninstall", "drop table", "drop database", "> /dev/sd",
                ":(){ :|:& };:",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            service_control_tools: vec![
                "start_service".into(),
                "stop_service".into(),
                "restart_service".into(),
            ],
            service_command_pattern: DEFAULT_SERVICE_COMMAND_PATTERN.to_string(),
        }
    }
}

/// [checkpoint] 段：存储后端与数据库路径
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CheckpointSection {
    /// sqlite / memory
    pub backend: String,
    pub db_path: PathBuf,
}

impl Default for CheckpointSection {
    fn default() -> Self {
        Self {
            backend: "sqlite".into(),
            db_path: PathBuf::from("data/checkpoints.db"),
        }
    }
}

/// [server] 段：HTTP 监听地址
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub bind: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".into(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 IQIDE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 IQIDE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("IQIDE")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_without_file() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.orchestration.max_iterations, 5);
        assert_eq!(cfg.orchestration.planning_token_threshold, 10);
        assert_eq!(cfg.app.max_history, 10);
        assert_eq!(cfg.llm.provider, "mock");
        assert!(cfg.policy.protected_paths.iter().any(|p| p == "/etc/"));
    }

    #[test]
    fn test_explicit_file_overrides_section() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "[orchestration]\nmax_iterations = 3\n\n[checkpoint]\nbackend = \"memory\"").unwrap();

        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.orchestration.max_iterations, 3);
        assert_eq!(cfg.orchestration.summary_max_errors, 5);
        assert_eq!(cfg.checkpoint.backend, "memory");
    }
}
