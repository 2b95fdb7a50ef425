//! LLM 输出的计划解析
//!
//! 两段式：先找 ```json 围栏块，再扫描正文中最后一个结构完整的 JSON
//! 对象。两段都失败时回退到确定性的关键词计划，保证流水线总有计划可试。

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use super::types::{Plan, Step};

static FENCED_JSON: OnceLock<Regex> = OnceLock::new();

fn fenced_json() -> &'static Regex {
    FENCED_JSON.get_or_init(|| {
        Regex::new(r"```(?:json)?\s*(\{[\s\S]*?\})\s*```").expect("valid fenced-json pattern")
    })
}

/// 植被类步骤的触发词（地表覆盖类别名）
const VEGETATION_KEYWORDS: &[&str] = &[
    "植被", "草地", "林地", "树木", "耕地", "裸地", "水体", "湿地", "苔原", "稀疏植被",
    "永久性水体", "雪和冰",
];

/// 解析 LLM 响应中的计划；两段都失败返回 None
pub fn parse_plan_response(response: &str) -> Option<Plan> {
    if let Some(caps) = fenced_json().captures(response) {
        if let (Some(whole), Some(body)) = (caps.get(0), caps.get(1)) {
            if let Ok(value) = serde_json::from_str::<Value>(body.as_str()) {
                if let Some(plan) = normalize(value, response, whole.start()) {
                    return Some(plan);
                }
            }
        }
    }

    // 正文扫描：保留最后一个可解析的对象
    let mut last: Option<(usize, Value)> = None;
    for (start, candidate) in json_object_spans(response) {
        if let Ok(value) = serde_json::from_str::<Value>(candidate) {
            if value.is_object() {
                last = Some((start, value));
            }
        }
    }
    let (start, value) = last?;
    normalize(value, response, start)
}

/// 解析失败时退回关键词计划
pub fn parse_or_fallback(response: &str) -> Plan {
    match parse_plan_response(response) {
        Some(plan) => plan,
        None => {
            tracing::warn!("计划解析失败，使用关键词回退计划");
            fallback_plan(response)
        }
    }
}

fn normalize(value: Value, response: &str, json_start: usize) -> Option<Plan> {
    let mut plan: Plan = serde_json::from_value(value).ok()?;

    if !plan.is_multi() && plan.estimated_steps == 0 {
        plan.estimated_steps = plan.steps.len();
    }

    // JSON 之前的自由文本视为思考过程，并入 goal
    let thinking = response[..json_start].trim();
    if !thinking.is_empty() {
        if plan.goal.is_empty() {
            plan.goal = thinking.to_string();
        } else if plan.goal.len() < thinking.len() {
            plan.goal = format!("{}\n\n{}", thinking, plan.goal);
        }
    }

    Some(plan)
}

/// 确定性回退计划：按响应文本中的领域关键词拼出步骤序列
pub fn fallback_plan(response: &str) -> Plan {
    let mut steps: Vec<Step> = Vec::new();
    let mut push = |description: &str, step_type: &str| {
        steps.push(Step {
            step_id: steps.len() as u32 + 1,
            description: description.to_string(),
            step_type: Some(step_type.to_string()),
            ..Default::default()
        });
    };

    if response.contains("缓冲区") || response.contains("距离") {
        push("根据建筑和道路距离筛选空地", "buffer");
    }
    if response.contains("高程") || response.contains("海拔") {
        push("根据高程范围筛选", "elevation");
    }
    if response.contains("坡度") || response.contains("倾斜") {
        push("根据坡度范围筛选", "slope");
    }
    if VEGETATION_KEYWORDS.iter().any(|k| response.contains(k)) {
        push("根据植被类型筛选", "vegetation");
    }

    let estimated_steps = steps.len();
    Plan {
        task: String::new(),
        goal: response.to_string(),
        steps,
        estimated_steps,
        sub_plans: Vec::new(),
    }
}

/// 扫描文本中所有平衡的顶层 `{...}` 片段（跳过字符串字面量内的花括号）
pub(crate) fn json_object_spans(text: &str) -> Vec<(usize, &str)> {
    let bytes = text.as_bytes();
    let mut spans = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' if depth > 0 => in_string = true,
            b'{' => {
                if depth == 0 {
                    start = i;
                }
                depth += 1;
            }
            b'}' => {
                if depth > 0 {
                    depth -= 1;
                    if depth == 0 {
                        spans.push((start, &text[start..=i]));
                    }
                }
            }
            _ => {}
        }
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fenced_block_preferred() {
        let response = r#"先说明思路。
```json
{"task": "部署", "goal": "找空地", "steps": [{"step_id": 1, "description": "筛选", "type": "buffer"}]}
```
后面还有别的 {"task": "噪声"} 对象。"#;

        let plan = parse_plan_response(response).unwrap();
        assert_eq!(plan.task, "部署");
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.estimated_steps, 1);
    }

    #[test]
    fn test_last_wellformed_object_wins() {
        let response = r#"{"broken": 这不是JSON} 然后 {"task": "旧"} 最后 {"task": "新", "steps": []}"#;
        let plan = parse_plan_response(response).unwrap();
        assert_eq!(plan.task, "新");
    }

    #[test]
    fn test_thinking_merged_into_goal() {
        let response = "需要先做缓冲区筛选，再看高程。\n{\"task\": \"t\", \"steps\": []}";
        let plan = parse_plan_response(response).unwrap();
        assert!(plan.goal.contains("缓冲区筛选"));
    }

    #[test]
    fn test_braces_inside_strings_ignored() {
        let response = r#"{"task": "包含}字符", "goal": "g", "steps": []}"#;
        let plan = parse_plan_response(response).unwrap();
        assert_eq!(plan.task, "包含}字符");
    }

    #[test]
    fn test_fallback_plan_keywords() {
        let plan = fallback_plan("请按距离500米筛选，再按高程和坡度过滤，保留草地");
        let types: Vec<_> = plan
            .steps
            .iter()
            .filter_map(|s| s.step_type.as_deref())
            .collect();
        assert_eq!(types, vec!["buffer", "elevation", "slope", "vegetation"]);
        assert_eq!(plan.steps[3].step_id, 4);
        assert_eq!(plan.estimated_steps, 4);
    }

    #[test]
    fn test_unparseable_falls_back() {
        let plan = parse_or_fallback("完全没有结构化内容，但提到了海拔");
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].step_type.as_deref(), Some("elevation"));
    }
}
