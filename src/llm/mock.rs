//! Mock LLM 客户端（用于测试，无需 API）
//!
//! 按脚本顺序返回预置回复，跑完脚本后重复最后一条；便于本地驱动
//! 规划 → 执行 → 重规划流程。收到的消息列表会被记录，测试可据此
//! 断言提示词内容。

use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::AgentError;
use crate::llm::{LlmClient, Message};

/// Mock 客户端：依次返回预置脚本中的回复
#[derive(Debug, Default)]
pub struct MockLlmClient {
    responses: Mutex<Vec<String>>,
    cursor: Mutex<usize>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl MockLlmClient {
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses),
            cursor: Mutex::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// 单条固定回复
    pub fn always(response: impl Into<String>) -> Self {
        Self::new(vec![response.into()])
    }

    /// 已收到的消息列表（按调用顺序）
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, AgentError> {
        self.requests.lock().unwrap().push(messages.to_vec());
        let responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Ok(String::new());
        }
        let mut cursor = self.cursor.lock().unwrap();
        let idx = (*cursor).min(responses.len() - 1);
        *cursor += 1;
        Ok(responses[idx].clone())
    }
}
