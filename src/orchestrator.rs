//! 编排器：PLAN → EXECUTE → (REPLAN → EXECUTE)* 状态机
//!
//! 重试以总执行次数为界：最多 max_iterations 次执行、max_iterations - 1
//! 次重规划。耗尽后把最后一次（仍失败的）计划与结果原样返回，由调用方
//! 决定如何呈现，不抛异常。

use std::sync::Arc;

use serde::Serialize;

use crate::error::AgentError;
use crate::exec::{ExecutionEngine, PlanResult};
use crate::plan::{Plan, PlanProducer};
use crate::tools::ToolRegistry;

/// 任务终态：无论成败都带回最后的计划与结果
#[derive(Debug, Serialize)]
pub struct TaskOutcome {
    pub success: bool,
    pub plan: Plan,
    pub result: PlanResult,
    pub iterations: usize,
}

pub struct Orchestrator {
    producer: PlanProducer,
    engine: ExecutionEngine,
    registry: Arc<ToolRegistry>,
    max_iterations: usize,
}

impl Orchestrator {
    pub fn new(
        producer: PlanProducer,
        engine: ExecutionEngine,
        registry: Arc<ToolRegistry>,
        max_iterations: usize,
    ) -> Self {
        Self {
            producer,
            engine,
            registry,
            max_iterations: max_iterations.max(1),
        }
    }

    /// 规划阶段单独入口
    pub async fn generate_plan(&self, user_task: &str) -> Result<Plan, AgentError> {
        self.producer.generate_plan(user_task).await
    }

    /// 用户反馈驱动的重规划（执行前）
    pub async fn replan_with_feedback(
        &self,
        original_plan: &Plan,
        feedback: &str,
    ) -> Result<Plan, AgentError> {
        self.producer
            .replan_with_feedback(original_plan, feedback, &self.registry)
            .await
    }

    /// 完整任务：规划 + 带重试的执行
    pub async fn execute_task(&self, user_task: &str) -> Result<TaskOutcome, AgentError> {
        let plan = self.producer.generate_plan(user_task).await?;
        self.execute_plan(plan).await
    }

    /// 执行既有计划（带自动重规划重试）
    pub async fn execute_plan(&self, plan: Plan) -> Result<TaskOutcome, AgentError> {
        let mut plan = plan;
        let mut result = self.engine.execute_plan(&plan).await;
        let mut attempts = 1usize;

        if result.success {
            return Ok(TaskOutcome {
                success: true,
                plan,
                result,
                iterations: attempts,
            });
        }

        while !result.success && attempts < self.max_iterations {
            if should_replan(&result) {
                tracing::info!(attempt = attempts, "执行失败，触发重规划");
                let result_value = serde_json::to_value(&result)
                    .map_err(|e| AgentError::PlanParse(e.to_string()))?;
                plan = self
                    .producer
                    .replan(&plan, &result_value, &self.registry)
                    .await?;
            }
            result = self.engine.execute_plan(&plan).await;
            attempts += 1;
        }

        if !result.success {
            tracing::warn!(iterations = attempts, "重试耗尽，返回最后一次失败结果");
        }
        Ok(TaskOutcome {
            success: result.success,
            plan,
            result,
            iterations: attempts,
        })
    }
}

/// 重规划判定：上一次执行没有成功（不区分瞬时与结构性失败）
fn should_replan(result: &PlanResult) -> bool {
    !result.success
}
