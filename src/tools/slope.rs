//! 坡度筛选工具：按坡度区间收窄上一环的产物

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::AgentError;

use super::{
    feature_number, load_features, required_params_valid, write_artifact, ParamSpec, Params, Tool,
    ToolId, ToolResult,
};

const PARAMS: &[ParamSpec] = &[
    ParamSpec {
        name: "input_geojson_path",
        ty: "string",
        description: "上一步筛选产物的 GeoJSON 路径",
        required: true,
    },
    ParamSpec {
        name: "min_slope",
        ty: "number",
        description: "最小坡度，单位度",
        required: false,
    },
    ParamSpec {
        name: "max_slope",
        ty: "number",
        description: "最大坡度，单位度",
        required: false,
    },
];

pub struct SlopeFilterTool {
    result_dir: PathBuf,
}

impl SlopeFilterTool {
    pub fn new(result_dir: PathBuf) -> Self {
        Self { result_dir }
    }
}

#[async_trait]
impl Tool for SlopeFilterTool {
    fn id(&self) -> ToolId {
        ToolId::Slope
    }

    fn description(&self) -> &str {
        "按坡度区间筛选输入区域，保留平均坡度落在 [min_slope, max_slope] 内的部分"
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
        let min_slope = params.get("min_slope").and_then(Value::as_f64);
        let max_slope = params.get("max_slope").and_then(Value::as_f64);

        let features = load_features(input)?;
        let kept: Vec<Value> = features
            .into_iter()
            .filter(|f| match feature_number(f, "slope") {
                Some(s) => {
                    min_slope.map(|lo| s >= lo).unwrap_or(true)
                        && max_slope.map(|hi| s <= hi).unwrap_or(true)
                }
                None => false,
            })
            .collect();

        let (path, count, area) = write_artifact(&self.result_dir, "slope_filter", kept)?;
        tracing::info!(tool = self.id().name(), count, path = %path, "坡度筛选完成");
        Ok(ToolResult::ok(path, count, area))
    }
}
