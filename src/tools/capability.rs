//! 能力组：工具名 → code / web / action 的封闭映射表
//!
//! 表外的工具名不会被执行：路由到 action 节点，由 dispatcher 返回 "Unknown tool" 结果。

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Code,
    Web,
    Action,
}

const CAPABILITY_TABLE: &[(&str, Capability)] = &[
    ("read_file", Capability::Code),
    ("write_file", Capability::Code),
    ("list_files", Capability::Code),
    ("web_search", Capability::Web),
    ("fetch_url", Capability::Web),
    ("run_command", Capability::Action),
    ("check_service", Capability::Action),
    ("start_service", Capability::Action),
    ("stop_service", Capability::Action),
    ("restart_service", Capability::Action),
    ("list_services", Capability::Action),
    ("get_system_info", Capability::Action),
    ("change_directory", Capability::Action),
    ("get_current_directory", Capability::Action),
];

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Code => "code",
            Capability::Web => "web",
            Capability::Action => "action",
        }
    }

    /// 查表；表外工具返回 None
    pub fn of(tool_name: &str) -> Option<Capability> {
        CAPABILITY_TABLE
            .iter()
            .find(|(name, _)| *name == tool_name)
            .map(|(_, cap)| *cap)
    }

    /// 选择处理该调用的节点所属能力组（表外工具归 action）
    pub fn route(tool_name: &str) -> Capability {
        Self::of(tool_name).unwrap_or(Capability::Action)
    }

    /// 本能力组包含的工具名
    pub fn tools(self) -> impl Iterator<Item = &'static str> {
        CAPABILITY_TABLE
            .iter()
            .filter(move |(_, cap)| *cap == self)
            .map(|(name, _)| *name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_table() {
        assert_eq!(Capability::of("read_file"), Some(Capability::Code));
        assert_eq!(Capability::of("fetch_url"), Some(Capability::Web));
        assert_eq!(Capability::of("restart_service"), Some(Capability::Action));
        assert_eq!(Capability::of("format_disk"), None);
        assert_eq!(Capability::route("format_disk"), Capability::Action);
        assert_eq!(Capability::Code.tools().count(), 3);
    }
}
