//! 植被筛选工具：按地表覆盖类型收窄上一环的产物
//!
//! 类型名沿用 ESA WorldCover 的中文类别（草地、林地、耕地、裸地、
//! 水体、湿地、苔原、稀疏植被、永久性水体、雪和冰、树木）。

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::AgentError;

use super::{
    load_features, required_params_valid, write_artifact, ParamSpec, Params, Tool, ToolId,
    ToolResult,
};

const PARAMS: &[ParamSpec] = &[
    ParamSpec {
        name: "input_geojson_path",
        ty: "string",
        description: "上一步筛选产物的 GeoJSON 路径",
        required: true,
    },
    ParamSpec {
        name: "vegetation_types",
        ty: "array",
        description: "保留的地表覆盖类型，如 [\"草地\", \"稀疏植被\"]",
        required: false,
    },
    ParamSpec {
        name: "exclude_types",
        ty: "array",
        description: "剔除的地表覆盖类型，如 [\"水体\", \"湿地\"]",
        required: false,
    },
];

pub struct VegetationFilterTool {
    result_dir: PathBuf,
}

impl VegetationFilterTool {
    pub fn new(result_dir: PathBuf) -> Self {
        Self { result_dir }
    }
}

fn string_list(params: &Params, key: &str) -> Vec<String> {
    params
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl Tool for VegetationFilterTool {
    fn id(&self) -> ToolId {
        ToolId::Vegetation
    }

    fn description(&self) -> &str {
        "按地表覆盖类型筛选输入区域，可指定保留类型或剔除类型"
    }

    fn parameters(&self) -> &'static [ParamSpec] {
        PARAMS
    }

    fn validate(&self, params: &Params) -> bool {
        required_params_valid(PARAMS, params)
    }

    async fn execute(&self, params: &Params) -> Result<ToolResult, AgentError> {
        let input = params
            .get("input_geojson_path")
            .and_then(Value::as_str)
            .ok_or_else(|| AgentError::ToolExecution("input_geojson_path 缺失".into()))?;
        let keep = string_list(params, "vegetation_types");
        let exclude = string_list(params, "exclude_types");

        let features = load_features(input)?;
        let kept: Vec<Value> = features
            .into_iter()
            .filter(|f| {
                let ty = f
                    .pointer("/properties/vegetation_type")
                    .and_then(Value::as_str)
                    .unwrap_or("");
                if exclude.iter().any(|t| t == ty) {
                    return false;
                }
                keep.is_empty() || keep.iter().any(|t| t == ty)
            })
            .collect();

        let (path, count, area) = write_artifact(&self.result_dir, "vegetation_filter", kept)?;
        tracing::info!(tool = self.id().name(), count, path = %path, "植被筛选完成");
        Ok(ToolResult::ok(path, count, area))
    }
}
