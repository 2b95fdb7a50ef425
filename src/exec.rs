//! 执行引擎：按计划逐步调用工具
//!
//! 每步三件事：串联注入（上一步产物路径注入声明了 `input_*path` 的工具）、
//! 三级解析（显式工具 → 类型映射表 → LLM think）、校验后执行并把结果
//! 记入容量受限的执行历史集合。单个步骤列表首败即停；多任务模式下各
//! 子计划彼此隔离，一个失败不影响其余。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::embedding::Embedder;
use crate::error::AgentError;
use crate::knowledge::COLLECTION_EXECUTIONS;
use crate::llm::{LlmClient, Message};
use crate::plan::parser::json_object_spans;
use crate::plan::{Plan, PromptSet, Step};
use crate::retrieval::RetrievalEngine;
use crate::store::{KnowledgeEntry, KnowledgeStore};
use crate::tools::{input_path_param, Params, Tool, ToolRegistry, ToolResult};

/// think 阶段检索的执行历史条数
const HISTORY_TOP_K: usize = 3;

/// 单步执行结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub params: Params,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ToolResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 子计划执行结果（多任务模式）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubPlanResult {
    pub unit: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_path: Option<String>,
    pub steps: Vec<StepOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 整个计划的执行结果；每轮编排迭代新建，不跨轮复用
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanResult {
    pub success: bool,
    #[serde(default)]
    pub results: Vec<StepOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_result_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_results: Vec<SubPlanResult>,
}

pub struct ExecutionEngine {
    registry: Arc<ToolRegistry>,
    llm: Arc<dyn LlmClient>,
    retrieval: Arc<RetrievalEngine>,
    store: Arc<dyn KnowledgeStore>,
    embedder: Arc<dyn Embedder>,
    prompts: PromptSet,
    executions_capacity: usize,
    tool_timeout: Duration,
}

impl ExecutionEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<ToolRegistry>,
        llm: Arc<dyn LlmClient>,
        retrieval: Arc<RetrievalEngine>,
        store: Arc<dyn KnowledgeStore>,
        embedder: Arc<dyn Embedder>,
        prompts: PromptSet,
        executions_capacity: usize,
        tool_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            llm,
            retrieval,
            store,
            embedder,
            prompts,
            executions_capacity,
            tool_timeout,
        }
    }

    /// 执行计划：多任务走子计划隔离路径，单任务直接执行步骤列表
    pub async fn execute_plan(&self, plan: &Plan) -> PlanResult {
        if !plan.is_multi() {
            return self.execute_steps(&plan.steps).await;
        }

        let mut sub_results = Vec::with_capacity(plan.sub_plans.len());
        for sub_plan in &plan.sub_plans {
            let result = self.execute_steps(&sub_plan.steps).await;
            tracing::info!(
                unit = %sub_plan.unit,
                success = result.success,
                "子计划执行完成"
            );
            sub_results.push(SubPlanResult {
                unit: sub_plan.unit.clone(),
                success: result.success,
                result_path: result.final_result_path,
                steps: result.results,
                error: result.error,
            });
        }

        let success = sub_results.iter().all(|r| r.success);
        PlanResult {
            success,
            sub_results,
            ..Default::default()
        }
    }

    /// 顺序执行一个步骤列表；首个失败立即终止，已完成步骤随错误一并返回
    pub async fn execute_steps(&self, steps: &[Step]) -> PlanResult {
        let mut results: Vec<StepOutcome> = Vec::new();
        let mut last_result_path: Option<String> = None;

        for step in steps {
            let mut step = step.clone();
            self.wire_chain(&mut step, last_result_path.as_deref());

            let outcome = self.execute_step(&step).await;
            let success = outcome.success;
            if let Some(path) = outcome
                .result
                .as_ref()
                .and_then(|r| r.result_path.clone())
                .filter(|_| success)
            {
                last_result_path = Some(path);
            }
            let error = outcome.error.clone();
            results.push(outcome);

            if !success {
                return PlanResult {
                    success: false,
                    results,
                    final_result_path: last_result_path,
                    error,
                    sub_results: Vec::new(),
                };
            }
        }

        PlanResult {
            success: true,
            results,
            final_result_path: last_result_path,
            error: None,
            sub_results: Vec::new(),
        }
    }

    /// 串联注入：仅当本步工具的 schema 声明了 `input_*path` 参数、且该参数
    /// 缺失或为空时，把上一步产物路径写进去。结构化规则，不做猜测。
    fn wire_chain(&self, step: &mut Step, last_result_path: Option<&str>) {
        let Some(path) = last_result_path else {
            return;
        };
        step.last_result_path = Some(path.to_string());

        let tool = step
            .tool
            .as_deref()
            .and_then(|name| self.registry.resolve(name).ok())
            .or_else(|| {
                step.type_enum()
                    .and_then(|ty| self.registry.get(ty.default_tool()))
            });
        let Some(tool) = tool else {
            return;
        };
        let Some(param_name) = input_path_param(tool.as_ref()) else {
            return;
        };

        let missing = step
            .params
            .get(param_name)
            .and_then(Value::as_str)
            .map(str::is_empty)
            .unwrap_or(true);
        if missing {
            step.params
                .insert(param_name.to_string(), Value::String(path.to_string()));
        }
    }

    /// 三级解析后调用工具
    async fn execute_step(&self, step: &Step) -> StepOutcome {
        // (a) 显式工具名
        if let Some(tool_name) = step.tool.as_deref() {
            return self.invoke(tool_name, step.params.clone()).await;
        }

        // (b) 类型映射表（参数已就绪时）
        if let (Some(ty), false) = (step.type_enum(), step.params.is_empty()) {
            return self.invoke(ty.default_tool().name(), step.params.clone()).await;
        }

        // (c) LLM think
        match self.think(step).await {
            Ok(Some((tool_name, params))) => self.invoke(&tool_name, params).await,
            Ok(None) => {
                // 提取失败但类型已知：回退映射表
                if let Some(ty) = step.type_enum() {
                    return self.invoke(ty.default_tool().name(), step.params.clone()).await;
                }
                StepOutcome {
                    success: false,
                    tool: None,
                    params: step.params.clone(),
                    result: None,
                    error: Some("无法确定执行动作或参数".to_string()),
                }
            }
            Err(e) => StepOutcome {
                success: false,
                tool: None,
                params: step.params.clone(),
                result: None,
                error: Some(e.to_string()),
            },
        }
    }

    /// 请 LLM 根据步骤描述和执行历史给出 {tool, params}；步骤自带参数优先
    async fn think(&self, step: &Step) -> Result<Option<(String, Params)>, AgentError> {
        let history = self
            .retrieval
            .retrieve(&step.description, HISTORY_TOP_K, Some(COLLECTION_EXECUTIONS))
            .await?;

        let system = format!(
            "{}\n\n工具参数规范:\n{}",
            self.prompts.work_prompt,
            self.registry.schema_text()
        );

        let step_json = serde_json::to_string(step).unwrap_or_default();
        let mut user_content = format!("步骤: {}", step_json);
        if !history.is_empty() {
            user_content.push_str("\n相关执行历史:\n");
            for candidate in &history {
                user_content.push_str(&candidate.text);
                user_content.push('\n');
            }
        }
        if let Some(path) = &step.last_result_path {
            user_content.push_str(&format!("\n上一步的输出文件路径: {}", path));
        }

        let messages = [Message::system(&system), Message::user(&user_content)];
        let thought = self.llm.complete(&messages).await?;

        Ok(extract_action(&thought).map(|(tool, mut params)| {
            // 步骤声明的参数覆盖 LLM 推断的
            for (k, v) in &step.params {
                params.insert(k.clone(), v.clone());
            }
            (tool, params)
        }))
    }

    /// 校验 → 带超时执行 → 记录执行历史
    async fn invoke(&self, tool_name: &str, params: Params) -> StepOutcome {
        let tool = match self.registry.resolve(tool_name) {
            Ok(t) => t,
            Err(_) => {
                return StepOutcome {
                    success: false,
                    tool: Some(tool_name.to_string()),
                    params,
                    result: None,
                    error: Some(format!("工具不存在: {}", tool_name)),
                }
            }
        };

        if !tool.validate(&params) {
            return StepOutcome {
                success: false,
                tool: Some(tool_name.to_string()),
                params,
                result: None,
                error: Some("参数验证失败".to_string()),
            };
        }

        let result = match tokio::time::timeout(self.tool_timeout, tool.execute(&params)).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => ToolResult::fail(e.to_string()),
            Err(_) => ToolResult::fail(format!("工具执行超时（{:?}）", self.tool_timeout)),
        };

        self.record_history(tool.as_ref(), &params, &result).await;

        let error = if result.success {
            None
        } else {
            Some(result.error.clone().unwrap_or_else(|| "执行失败".to_string()))
        };
        StepOutcome {
            success: result.success,
            tool: Some(tool_name.to_string()),
            params,
            result: Some(result),
            error,
        }
    }

    /// 执行结果写入 executions 集合（容量受限）；写入失败只告警
    async fn record_history(&self, tool: &dyn Tool, params: &Params, result: &ToolResult) {
        let params_json = serde_json::to_string(&Value::Object(params.clone())).unwrap_or_default();
        let tool_name = tool.id().name();
        let text = if result.success {
            format!("使用{}执行成功，参数: {}", tool_name, params_json)
        } else {
            format!(
                "使用{}执行失败，参数: {}，错误: {}",
                tool_name,
                params_json,
                result.error.as_deref().unwrap_or("执行失败")
            )
        };

        let vector = match self.embedder.embed_passage(&text).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "执行历史向量化失败，跳过记录");
                return;
            }
        };

        let mut metadata = HashMap::new();
        metadata.insert("tool".to_string(), tool_name.to_string());
        metadata.insert("success".to_string(), result.success.to_string());
        if let Some(err) = &result.error {
            metadata.insert("error".to_string(), err.clone());
        }
        let entry = KnowledgeEntry::new(&text, metadata, vector);
        if let Err(e) = self
            .store
            .insert_bounded(COLLECTION_EXECUTIONS, entry, self.executions_capacity)
            .await
        {
            tracing::warn!(error = %e, "执行历史入库失败");
        }

        tracing::info!(tool = tool_name, success = result.success, "工具调用记录");
    }
}

/// 从 think 输出中提取首个可解析的 {tool, params} 对象
fn extract_action(thought: &str) -> Option<(String, Params)> {
    for (_, candidate) in json_object_spans(thought) {
        let Ok(value) = serde_json::from_str::<Value>(candidate) else {
            continue;
        };
        let Some(tool) = value.get("tool").and_then(Value::as_str) else {
            continue;
        };
        let params = value
            .get("params")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        return Some((tool.to_string(), params));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_action() {
        let thought = r#"我认为应该用缓冲区工具。
{"tool": "buffer_filter_tool", "params": {"buffer_distance": 500}}"#;
        let (tool, params) = extract_action(thought).unwrap();
        assert_eq!(tool, "buffer_filter_tool");
        assert_eq!(params.get("buffer_distance").and_then(Value::as_f64), Some(500.0));
    }

    #[test]
    fn test_extract_action_skips_non_action_objects() {
        let thought = r#"{"note": "不是动作"} 然后 {"tool": "slope_filter_tool"}"#;
        let (tool, params) = extract_action(thought).unwrap();
        assert_eq!(tool, "slope_filter_tool");
        assert!(params.is_empty());
    }

    #[test]
    fn test_extract_action_none() {
        assert!(extract_action("没有任何结构化输出").is_none());
    }
}
