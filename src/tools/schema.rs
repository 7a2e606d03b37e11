//! 工具参数 JSON Schema 生成（schemars 自动生成，保证 schema 与参数结构体一致）

use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// 由参数结构体生成 function calling 使用的 parameters schema（去掉 $schema / title 元信息）
pub fn parameters_for<T: JsonSchema>() -> Value {
    let schema = schema_for!(T);
    let mut value = serde_json::to_value(&schema).unwrap_or_else(|_| serde_json::json!({}));
    if let Some(obj) = value.as_object_mut() {
        obj.remove("$schema");
        obj.remove("title");
        obj.entry("properties")
            .or_insert_with(|| serde_json::json!({}));
    }
    value
}

/// 将 JSON 参数解析为结构体，错误转为可回写给模型的描述
pub fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, String> {
    serde_json::from_value(args).map_err(|e| format!("Invalid arguments: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    /// 示例参数
    #[allow(dead_code)]
    #[derive(Deserialize, JsonSchema)]
    struct ServiceArgs {
        /// 服务名
        service_name: String,
    }

    #[test]
    fn test_schema_lists_required_fields() {
        let schema = parameters_for::<ServiceArgs>();
        assert_eq!(schema["type"], "object");
        assert!(schema["properties"]["service_name"].is_object());
        assert_eq!(schema["required"][0], "service_name");
        assert!(schema.get("$schema").is_none());
    }

    #[test]
    fn test_parse_args_reports_missing_field() {
        let err = parse_args::<ServiceArgs>(serde_json::json!({})).err().unwrap();
        assert!(err.starts_with("Invalid arguments"));
    }
}
