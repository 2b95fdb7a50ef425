//! 高程筛选工具：按高程区间收窄上一环的产物

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
        name: "min_elev",
        ty: "number",
        description: "最低高程，单位米",
        required: false,
    },
    ParamSpec {
        name: "max_elev",
        ty: "number",
        description: "最高高程，单位米",
        required: false,
    },
];

pub struct ElevationFilterTool {
    result_dir: PathBuf,
}

impl ElevationFilterTool {
    pub fn new(result_dir: PathBuf) -> Self {
        Self { result_dir }
    }
}

#[async_trait]
impl Tool for ElevationFilterTool {
    fn id(&self) -> ToolId {
        ToolId::Elevation
    }

    fn description(&self) -> &str {
        "按高程区间筛选输入区域，保留平均高程落在 [min_elev, max_elev] 内的部分"
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
        let min_elev = params.get("min_elev").and_then(Value::as_f64);
        let max_elev = params.get("max_elev").and_then(Value::as_f64);

        let features = load_features(input)?;
        let kept: Vec<Value> = features
            .into_iter()
            .filter(|f| match feature_number(f, "elevation") {
                Some(e) => {
                    min_elev.map(|lo| e >= lo).unwrap_or(true)
                        && max_elev.map(|hi| e <= hi).unwrap_or(true)
                }
                None => false,
            })
            .collect();

        let (path, count, area) = write_artifact(&self.result_dir, "elevation_filter", kept)?;
        tracing::info!(tool = self.id().name(), count, path = %path, "高程筛选完成");
        Ok(ToolResult::ok(path, count, area))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_filter_by_elevation_range() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.geojson");
        let doc = serde_json::json!({
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "properties": {"elevation": 80.0, "area_m2": 5000.0}, "geometry": null},
                {"type": "Feature", "properties": {"elevation": 260.0, "area_m2": 3000.0}, "geometry": null},
                {"type": "Feature", "properties": {"slope": 5.0}, "geometry": null}
            ]
        });
        std::fs::write(&input, doc.to_string()).unwrap();

        let tool = ElevationFilterTool::new(dir.path().join("result"));
        let params: Params = serde_json::json!({
            "input_geojson_path": input.to_string_lossy(),
            "min_elev": 50,
            "max_elev": 200
        })
        .as_object()
        .cloned()
        .unwrap();

        let result = tool.execute(&params).await.unwrap();
        assert!(result.success);
        // 260 米越界，缺少 elevation 属性的也被剔除
        assert_eq!(result.region_count, Some(1));
    }

    #[test]
    fn test_validate_requires_input_path() {
        let tool = ElevationFilterTool::new("/tmp".into());
        let missing: Params = serde_json::from_str(r#"{"min_elev": 50}"#).unwrap();
        assert!(!tool.validate(&missing));
        let empty: Params = serde_json::from_str(r#"{"input_geojson_path": ""}"#).unwrap();
        assert!(!tool.validate(&empty));
    }
}
