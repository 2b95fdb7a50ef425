//! 计划生成与重规划
//!
//! 规划提示词只谈目标不谈参数，参数细节留给执行阶段；重规划把工具
//! schema 和相关装备信息一并喂给 LLM，产出带具体工具与参数的计划。

use std::sync::Arc;

use serde_json::Value;

use crate::embedding::Embedder;
use crate::error::AgentError;
use crate::knowledge::{COLLECTION_EQUIPMENT, COLLECTION_KNOWLEDGE, COLLECTION_TASKS};
use crate::llm::{LlmClient, Message};
use crate::retrieval::RetrievalEngine;
use crate::store::{KnowledgeEntry, KnowledgeStore};
use crate::tools::ToolRegistry;

use super::parser::parse_or_fallback;
use super::prompts::PromptSet;
use super::types::Plan;

/// 规划/重规划检索的上下文条数
const CONTEXT_TOP_K: usize = 3;

pub struct PlanProducer {
    llm: Arc<dyn LlmClient>,
    retrieval: Arc<RetrievalEngine>,
    store: Arc<dyn KnowledgeStore>,
    embedder: Arc<dyn Embedder>,
    prompts: PromptSet,
}

impl PlanProducer {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        retrieval: Arc<RetrievalEngine>,
        store: Arc<dyn KnowledgeStore>,
        embedder: Arc<dyn Embedder>,
        prompts: PromptSet,
    ) -> Self {
        Self {
            llm,
            retrieval,
            store,
            embedder,
            prompts,
        }
    }

    /// 生成计划：检索历史任务与部署规则作上下文，并把任务记入任务集合
    pub async fn generate_plan(&self, user_task: &str) -> Result<Plan, AgentError> {
        let rag_tasks = self
            .retrieval
            .retrieve(user_task, CONTEXT_TOP_K, Some(COLLECTION_TASKS))
            .await?;
        let rag_knowledge = self
            .retrieval
            .retrieve(user_task, CONTEXT_TOP_K, Some(COLLECTION_KNOWLEDGE))
            .await?;

        let mut user_content = format!("任务: {}", user_task);
        if !rag_knowledge.is_empty() {
            user_content.push_str("\n相关部署规则:\n");
            for candidate in &rag_knowledge {
                user_content.push_str(&candidate.text);
                user_content.push('\n');
            }
        }
        if !rag_tasks.is_empty() {
            user_content.push_str("\n相关历史任务:\n");
            for candidate in &rag_tasks {
                user_content.push_str(&candidate.text);
                user_content.push('\n');
            }
        }

        let messages = [
            Message::system(&self.prompts.plan_prompt),
            Message::user(&user_content),
        ];
        let response = self.llm.complete(&messages).await?;

        let mut plan = parse_or_fallback(&response);
        if plan.task.is_empty() {
            plan.task = user_task.to_string();
        }

        self.journal_task(user_task, &plan).await;
        Ok(plan)
    }

    /// 执行失败后的重规划：以序列化计划为键检索装备信息
    pub async fn replan(
        &self,
        original_plan: &Plan,
        last_result: &Value,
        registry: &ToolRegistry,
    ) -> Result<Plan, AgentError> {
        let plan_str = serde_json::to_string_pretty(original_plan)
            .map_err(|e| AgentError::PlanParse(e.to_string()))?;
        let result_str = serde_json::to_string_pretty(last_result)
            .map_err(|e| AgentError::PlanParse(e.to_string()))?;
        let equipment_text = self.equipment_context(&plan_str).await?;

        let user_content = format!(
            "请根据原计划和执行结果重写 JSON 计划\n\n原计划:\n{}\n\n执行结果:\n{}{}",
            plan_str, result_str, equipment_text
        );
        self.replan_call(original_plan, &user_content, registry)
            .await
    }

    /// 用户反馈驱动的重规划（不经过执行）
    pub async fn replan_with_feedback(
        &self,
        original_plan: &Plan,
        feedback: &str,
        registry: &ToolRegistry,
    ) -> Result<Plan, AgentError> {
        let plan_str = serde_json::to_string_pretty(original_plan)
            .map_err(|e| AgentError::PlanParse(e.to_string()))?;
        let equipment_text = self.equipment_context(&plan_str).await?;

        let user_content = format!(
            "请根据原计划和用户反馈重写 JSON 计划\n\n原计划:\n{}\n\n用户反馈:\n{}{}",
            plan_str, feedback, equipment_text
        );
        self.replan_call(original_plan, &user_content, registry)
            .await
    }

    async fn replan_call(
        &self,
        original_plan: &Plan,
        user_content: &str,
        registry: &ToolRegistry,
    ) -> Result<Plan, AgentError> {
        let system = format!(
            "{}\n\n## 工具参数规范\n{}",
            self.prompts.replan_prompt,
            registry.schema_text()
        );
        let messages = [Message::system(&system), Message::user(user_content)];
        let response = self.llm.complete(&messages).await?;

        let mut plan = parse_or_fallback(&response);
        if plan.task.is_empty() {
            plan.task = original_plan.task.clone();
        }
        tracing::info!(steps = plan.steps.len(), "重规划完成");
        Ok(plan)
    }

    async fn equipment_context(&self, plan_str: &str) -> Result<String, AgentError> {
        let rag_equipment = self
            .retrieval
            .retrieve(plan_str, CONTEXT_TOP_K, Some(COLLECTION_EQUIPMENT))
            .await?;
        if rag_equipment.is_empty() {
            return Ok(String::new());
        }
        let mut text = String::from("\n\n相关装备信息（含射程）:\n");
        for candidate in &rag_equipment {
            text.push_str(&candidate.text);
            text.push('\n');
        }
        Ok(text)
    }

    /// 任务入库供后续检索；入库失败只告警，不影响本次计划
    async fn journal_task(&self, user_task: &str, plan: &Plan) {
        let vector = match self.embedder.embed_passage(user_task).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "任务向量化失败，跳过任务入库");
                return;
            }
        };
        let mut metadata = std::collections::HashMap::new();
        metadata.insert("type".to_string(), "task".to_string());
        metadata.insert(
            "plan".to_string(),
            serde_json::to_string(plan).unwrap_or_default(),
        );
        let entry = KnowledgeEntry::new(user_task, metadata, vector);
        if let Err(e) = self.store.insert(COLLECTION_TASKS, entry).await {
            tracing::warn!(error = %e, "任务入库失败");
        }
    }
}
