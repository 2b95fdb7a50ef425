//! 提示词集合：内置默认文案，可由磁盘上的 JSON 覆盖

use std::path::Path;

use serde::Deserialize;

const PLAN_PROMPT: &str = r#"你是一个任务规划助手，负责将用户的任务分解为可执行的步骤。

你的职责：
1. 理解用户任务的目标和要求
2. 将任务分解为清晰的步骤
3. 不涉及具体工具，只描述需要做什么

可用工具类型：
- buffer_filter: 缓冲区筛选（根据建筑和道路距离筛选）
- elevation_filter: 高程筛选（根据高程范围筛选）
- slope_filter: 坡度筛选（根据坡度范围筛选）
- vegetation_filter: 植被筛选（根据植被类型筛选）

输出格式（JSON）：
{
    "task": "用户原始任务",
    "goal": "任务目标描述",
    "steps": [
        {"step_id": 1, "description": "步骤描述", "type": "buffer/elevation/slope/vegetation"},
        ...
    ],
    "estimated_steps": 步骤数量
}

注意：只描述任务目标，不指定具体工具和参数。"#;

const REPLAN_PROMPT: &str = r#"你是一个重新规划助手，当执行失败时需要调整计划。

你的职责：
1. 分析执行失败的原因
2. 根据可用工具重新规划
3. 生成包含具体工具和参数的详细计划

输出格式（JSON）：
{
    "task": "用户原始任务",
    "goal": "调整后的任务目标",
    "steps": [
        {"step_id": 1, "tool": "buffer_filter_tool", "params": {"buffer_distance": 500}},
        {"step_id": 2, "tool": "elevation_filter_tool", "params": {"input_geojson_path": "...", "min_elev": 100, "max_elev": 500}},
        ...
    ],
    "reason": "重新规划的原因"
}"#;

const WORK_PROMPT: &str = r#"你是一个执行助手，负责根据计划步骤执行具体操作。

你的职责：
1. 分析步骤描述，理解需要做什么
2. 选择合适的工具和参数
3. 返回执行动作

输出格式（JSON）：
{
    "tool": "工具名称",
    "params": {
        "参数名": "参数值"
    }
}

注意：
- buffer_filter_tool的输出可以作为后续筛选工具的input_geojson_path
- 如果步骤描述包含"距离"、"缓冲区"等关键词，使用buffer_filter_tool
- 如果步骤描述包含"高程"、"海拔"等关键词，使用elevation_filter_tool
- 如果步骤描述包含"坡度"、"倾斜"等关键词，使用slope_filter_tool
- 如果步骤描述包含"植被"、"草地"、"林地"、"水体"等关键词，使用vegetation_filter_tool"#;

const SYSTEM_PROMPT: &str = r#"你是一个专业的空地分析智能体，专门处理地理空间数据的筛选和分析任务。

你的能力包括：
1. 理解用户的地理空间分析需求
2. 规划合理的分析流程
3. 执行地理空间筛选操作
4. 根据执行结果调整策略

工作原则：
- 仔细分析用户需求
- 合理规划执行步骤
- 准确选择工具和参数
- 及时处理错误和异常"#;

/// 四段提示词；缺字段时回落到内置文案
#[derive(Debug, Clone, Deserialize)]
pub struct PromptSet {
    #[serde(default = "default_plan_prompt")]
    pub plan_prompt: String,
    #[serde(default = "default_replan_prompt")]
    pub replan_prompt: String,
    #[serde(default = "default_work_prompt")]
    pub work_prompt: String,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
}

fn default_plan_prompt() -> String {
    PLAN_PROMPT.to_string()
}
fn default_replan_prompt() -> String {
    REPLAN_PROMPT.to_string()
}
fn default_work_prompt() -> String {
    WORK_PROMPT.to_string()
}
fn default_system_prompt() -> String {
    SYSTEM_PROMPT.to_string()
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            plan_prompt: default_plan_prompt(),
            replan_prompt: default_replan_prompt(),
            work_prompt: default_work_prompt(),
            system_prompt: default_system_prompt(),
        }
    }
}

impl PromptSet {
    /// 从 JSON 文件加载；文件不存在或解析失败时回落到内置默认并告警
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };
        match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(set) => set,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "提示词文件解析失败，使用内置默认");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_present() {
        let prompts = PromptSet::default();
        assert!(prompts.plan_prompt.contains("任务规划助手"));
        assert!(prompts.work_prompt.contains("buffer_filter_tool"));
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prompts.json");
        std::fs::write(&path, r#"{"plan_prompt": "自定义规划"}"#).unwrap();

        let prompts = PromptSet::load(Some(&path));
        assert_eq!(prompts.plan_prompt, "自定义规划");
        // 未覆盖的字段保持内置默认
        assert!(prompts.replan_prompt.contains("重新规划助手"));
    }

    #[test]
    fn test_load_missing_file_falls_back() {
        let prompts = PromptSet::load(Some(Path::new("/no/such/prompts.json")));
        assert!(prompts.system_prompt.contains("空地分析"));
    }
}
