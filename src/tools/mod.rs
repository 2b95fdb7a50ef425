//! 工具箱：工具契约、封闭注册表与四个地理空间筛选工具
//!
//! 契约：name / description / parameters（参数规范）/ validate（纯前置校验，
//! 不做 IO）/ execute（唯一副作用点，产物为全新带时间戳的 GeoJSON，不覆盖
//! 历史结果）。工具之间不互相调用，串联由执行引擎负责。

pub mod buffer;
pub mod elevation;
pub mod registry;
pub mod slope;
pub mod vegetation;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::AgentError;

pub use buffer::BufferFilterTool;
pub use elevation::ElevationFilterTool;
pub use registry::{ToolId, ToolRegistry};
pub use slope::SlopeFilterTool;
pub use vegetation::VegetationFilterTool;

/// 工具参数（JSON 对象）
pub type Params = serde_json::Map<String, Value>;

/// 单个参数规范
#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub name: &'static str,
    pub ty: &'static str,
    pub description: &'static str,
    pub required: bool,
}

/// 工具执行结果：success 为业务结论，error 与之互斥；附带领域指标
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_area_m2: Option<f64>,
}

impl ToolResult {
    pub fn ok(result_path: String, region_count: usize, total_area_m2: f64) -> Self {
        Self {
            success: true,
            result_path: Some(result_path),
            region_count: Some(region_count),
            total_area_m2: Some(total_area_m2),
            error: None,
        }
    }

    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// 工具契约
#[async_trait]
pub trait Tool: Send + Sync {
    fn id(&self) -> ToolId;

    fn description(&self) -> &str;

    fn parameters(&self) -> &'static [ParamSpec];

    /// 前置校验：必填参数存在且类型正确；不得做任何 IO
    fn validate(&self, params: &Params) -> bool;

    /// 唯一副作用点；域内失败以 success=false 返回，意外 IO 错误走 Err
    async fn execute(&self, params: &Params) -> Result<ToolResult, AgentError>;
}

impl std::fmt::Debug for dyn Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool").field("id", &self.id()).finish()
    }
}

/// 工具声明的链式输入参数名（`input_*path`）；串联注入只认 schema 里的声明
pub fn input_path_param(tool: &dyn Tool) -> Option<&'static str> {
    tool.parameters()
        .iter()
        .find(|p| p.name.starts_with("input_") && p.name.ends_with("path"))
        .map(|p| p.name)
}

/// 工具 schema 的 JSON 表示（拼入 think / replan 提示词）
pub fn schema_json(tool: &dyn Tool) -> Value {
    let mut props = serde_json::Map::new();
    for p in tool.parameters() {
        props.insert(
            p.name.to_string(),
            serde_json::json!({
                "type": p.ty,
                "description": p.description,
                "required": p.required,
            }),
        );
    }
    serde_json::json!({
        "name": tool.id().name(),
        "description": tool.description(),
        "parameters": props,
    })
}

/// 必填参数齐备且类型匹配（validate 的通用实现）
pub(crate) fn required_params_valid(specs: &[ParamSpec], params: &Params) -> bool {
    specs.iter().filter(|p| p.required).all(|p| {
        params
            .get(p.name)
            .map(|v| type_matches(p.ty, v))
            .unwrap_or(false)
    })
}

fn type_matches(ty: &str, value: &Value) -> bool {
    match ty {
        "number" => value.is_number(),
        "string" => value.as_str().map(|s| !s.is_empty()).unwrap_or(false),
        "array" => value.is_array(),
        _ => true,
    }
}

/// 读取 GeoJSON FeatureCollection 的 features 数组
pub(crate) fn load_features(path: &str) -> Result<Vec<Value>, AgentError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| AgentError::ToolExecution(format!("read {}: {}", path, e)))?;
    let doc: Value = serde_json::from_str(&raw)
        .map_err(|e| AgentError::ToolExecution(format!("parse {}: {}", path, e)))?;
    Ok(doc
        .get("features")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default())
}

/// 写出筛选产物：result 目录下全新的带时间戳文件，返回 (路径, 区域数, 总面积)
pub(crate) fn write_artifact(
    result_dir: &Path,
    prefix: &str,
    features: Vec<Value>,
) -> Result<(String, usize, f64), AgentError> {
    std::fs::create_dir_all(result_dir)?;
    let stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S%3f");
    let tag = uuid::Uuid::new_v4().simple().to_string();
    let path: PathBuf = result_dir.join(format!("{}_{}_{}.geojson", prefix, stamp, &tag[..8]));

    let region_count = features.len();
    let total_area_m2: f64 = features
        .iter()
        .filter_map(|f| f.pointer("/properties/area_m2").and_then(Value::as_f64))
        .sum();

    let doc = serde_json::json!({
        "type": "FeatureCollection",
        "features": features,
    });
    std::fs::write(&path, serde_json::to_string_pretty(&doc).unwrap_or_default())?;

    Ok((path.to_string_lossy().into_owned(), region_count, total_area_m2))
}

/// 特征属性取数值
pub(crate) fn feature_number(feature: &Value, key: &str) -> Option<f64> {
    feature
        .pointer(&format!("/properties/{}", key))
        .and_then(Value::as_f64)
}
