//! 工具参数 JSON Schema 生成（schemars）
//!
//! 参数结构体同时用于 Schema 生成（声明给模型）与参数反序列化（执行时），两者不会脱节。
//! 生成结果去掉 `$schema` / `title`，可选字段不加 null 类型，兼容各家 function calling 的严格校验。

use schemars::gen::SchemaSettings;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

/// web_search 参数
#[derive(Debug, Deserialize, JsonSchema)]
pub struct WebSearchArgs {
    /// The search keywords
    pub query: String,
}

/// code_analysis 参数
#[derive(Debug, Deserialize, JsonSchema)]
pub struct CodeAnalysisArgs {
    /// The source code to analyze
    pub code: String,
    /// Specific area to focus on (e.g., 'security', 'performance')
    #[serde(default)]
    pub focus: Option<String>,
}

/// 生成某参数类型的 Schema（对象形式）
pub fn parameters_schema<T: JsonSchema>() -> Value {
    let settings = SchemaSettings::draft07().with(|s| {
        s.option_nullable = false;
        s.option_add_null_type = false;
        s.meta_schema = None;
        s.inline_subschemas = true;
    });
    let schema = settings.into_generator().into_root_schema_for::<T>();
    let mut value = serde_json::to_value(schema).unwrap_or_else(|_| serde_json::json!({"type": "object"}));
    if let Some(obj) = value.as_object_mut() {
        obj.remove("title");
        obj.remove("$schema");
        obj.remove("definitions");
    }
    value
}

/// 按参数类型解析工具参数；失败时返回可读错误
pub fn parse_args<T: for<'de> Deserialize<'de>>(tool: &str, args: Value) -> Result<T, String> {
    serde_json::from_value(args).map_err(|e| format!("Invalid arguments for {tool}: {e}"))
}
