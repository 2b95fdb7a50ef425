//! LLM 客户端抽象
//!
//! 规划、重规划与步骤 think 调用都走 complete（非流式），部署时配置单一模型/温度/超时。

use async_trait::async_trait;

use crate::error::AgentError;
use crate::llm::Message;

/// LLM 客户端 trait：给定消息列表，返回补全文本
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[Message]) -> Result<String, AgentError>;
}
