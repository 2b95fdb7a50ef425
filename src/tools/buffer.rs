//! 缓冲区筛选工具：按障碍物最小距离筛选候选区域
//!
//! 链路的第一环：不声明 `input_*path`，候选区域来自配置的底图数据，
//! 之后的工具在其产物上继续收窄。

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
        name: "buffer_distance",
        ty: "number",
        description: "距障碍物（建筑、道路）的最小距离，单位米",
        required: true,
    },
    ParamSpec {
        name: "utm_crs",
        ty: "string",
        description: "投影坐标系，如 EPSG:32650",
        required: false,
    },
];

pub struct BufferFilterTool {
    result_dir: PathBuf,
    regions_path: Option<PathBuf>,
}

impl BufferFilterTool {
    pub fn new(result_dir: PathBuf, regions_path: Option<PathBuf>) -> Self {
        Self {
            result_dir,
            regions_path,
        }
    }
}

#[async_trait]
impl Tool for BufferFilterTool {
    fn id(&self) -> ToolId {
        ToolId::Buffer
    }

    fn description(&self) -> &str {
        "在候选区域中剔除距建筑、道路等障碍物过近的部分，输出满足缓冲距离的空地"
    }

    fn parameters(&self) -> &'static [ParamSpec] {
        PARAMS
    }

    fn validate(&self, params: &Params) -> bool {
        required_params_valid(PARAMS, params)
            && params
                .get("buffer_distance")
                .and_then(Value::as_f64)
                .map(|d| d >= 0.0)
                .unwrap_or(false)
    }

    async fn execute(&self, params: &Params) -> Result<ToolResult, AgentError> {
        let distance = params
            .get("buffer_distance")
            .and_then(Value::as_f64)
            .ok_or_else(|| AgentError::ToolExecution("buffer_distance 缺失".into()))?;

        let regions_path = match &self.regions_path {
            Some(p) => p.to_string_lossy().into_owned(),
            None => return Ok(ToolResult::fail("候选区域底图未配置")),
        };

        let features = load_features(&regions_path)?;
        let kept: Vec<Value> = features
            .into_iter()
            .filter(|f| {
                feature_number(f, "min_obstacle_distance_m")
                    .map(|d| d >= distance)
                    .unwrap_or(false)
            })
            .collect();

        let (path, count, area) = write_artifact(&self.result_dir, "buffer_filter", kept)?;
        tracing::info!(tool = self.id().name(), count, path = %path, "缓冲区筛选完成");
        Ok(ToolResult::ok(path, count, area))
    }
}
