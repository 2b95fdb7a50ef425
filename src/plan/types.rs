//! 计划数据模型：步骤、单任务计划与多任务子计划

use serde::{Deserialize, Serialize};

use crate::tools::{Params, ToolId};

/// 步骤类型；原始字符串经 `from_raw` 归一到封闭枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepType {
    Buffer,
    Elevation,
    Slope,
    Vegetation,
}

impl StepType {
    pub fn from_raw(raw: &str) -> Option<StepType> {
        match raw.trim() {
            "buffer" => Some(StepType::Buffer),
            "elevation" => Some(StepType::Elevation),
            "slope" => Some(StepType::Slope),
            "vegetation" => Some(StepType::Vegetation),
            _ => None,
        }
    }

    /// 类型 → 默认工具的固定映射表
    pub fn default_tool(&self) -> ToolId {
        match self {
            StepType::Buffer => ToolId::Buffer,
            StepType::Elevation => ToolId::Elevation,
            StepType::Slope => ToolId::Slope,
            StepType::Vegetation => ToolId::Vegetation,
        }
    }
}

/// 计划中的一个步骤；params 由执行引擎就地注入串联输入路径
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Step {
    #[serde(default)]
    pub step_id: u32,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub step_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub params: Params,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_result_path: Option<String>,
}

impl Step {
    pub fn type_enum(&self) -> Option<StepType> {
        self.step_type.as_deref().and_then(StepType::from_raw)
    }
}

/// 多任务模式下的独立子计划，按单位区分
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubPlan {
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// 计划：平铺步骤（单任务）或若干独立子计划（多任务）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Plan {
    #[serde(default)]
    pub task: String,
    #[serde(default)]
    pub goal: String,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(default)]
    pub estimated_steps: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_plans: Vec<SubPlan>,
}

impl Plan {
    pub fn is_multi(&self) -> bool {
        !self.sub_plans.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_type_mapping() {
        assert_eq!(StepType::from_raw("buffer"), Some(StepType::Buffer));
        assert_eq!(StepType::from_raw(" slope "), Some(StepType::Slope));
        assert_eq!(StepType::from_raw("unknown"), None);
        assert_eq!(StepType::Vegetation.default_tool(), ToolId::Vegetation);
    }

    #[test]
    fn test_plan_deserializes_with_defaults() {
        let plan: Plan = serde_json::from_str(
            r#"{"task": "t", "steps": [{"step_id": 1, "description": "d", "type": "buffer"}]}"#,
        )
        .unwrap();
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].type_enum(), Some(StepType::Buffer));
        assert!(plan.steps[0].params.is_empty());
        assert!(!plan.is_multi());
    }

    #[test]
    fn test_multi_plan_shape() {
        let plan: Plan = serde_json::from_str(
            r#"{"task": "t", "sub_plans": [{"unit": "甲", "steps": []}, {"unit": "乙"}]}"#,
        )
        .unwrap();
        assert!(plan.is_multi());
        assert_eq!(plan.sub_plans[1].unit, "乙");
        assert!(plan.sub_plans[1].steps.is_empty());
    }
}
