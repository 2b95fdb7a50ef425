//! 嵌入端口：文本 → 定长向量
//!
//! query 与 passage 使用不同前缀框定（同一向量空间），与存量知识条目的
//! 入库框定保持一致。实现走 OpenAI 兼容 /embeddings 端点。

use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::types::embeddings::{CreateEmbeddingRequestArgs, EmbeddingInput};
use async_openai::Client;
use async_trait::async_trait;

use crate::config::EmbeddingSection;
use crate::error::AgentError;

/// 嵌入提供方：查询侧与入库侧分别框定
#[async_trait]
pub trait Embedder: Send + Sync {
    /// 以 "query" 框定编码查询文本
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, AgentError>;

    /// 以 "passage" 框定编码入库文本
    async fn embed_passage(&self, text: &str) -> Result<Vec<f32>, AgentError>;
}

/// 使用 async-openai 调用 OpenAI 兼容的 embeddings API
pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
    timeout: Duration,
}

impl OpenAiEmbedder {
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = if let Some(url) = base_url {
            OpenAIConfig::new().with_api_base(url).with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    /// 从 [embedding] 配置段创建
    pub fn from_config(cfg: &EmbeddingSection) -> Self {
        let mut embedder = Self::new(cfg.base_url.as_deref(), &cfg.model, None);
        embedder.timeout = Duration::from_secs(cfg.timeout_secs);
        embedder
    }

    async fn embed(&self, prefixed: String) -> Result<Vec<f32>, AgentError> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(EmbeddingInput::String(prefixed))
            .build()
            .map_err(|e| AgentError::Embedding(e.to_string()))?;

        let response = tokio::time::timeout(self.timeout, self.client.embeddings().create(request))
            .await
            .map_err(|_| AgentError::Embedding(format!("timeout after {:?}", self.timeout)))?
            .map_err(|e| AgentError::Embedding(e.to_string()))?;

        let vec = response
            .data
            .first()
            .map(|e| e.embedding.clone())
            .unwrap_or_default();
        if vec.is_empty() {
            return Err(AgentError::Embedding("empty embedding".to_string()));
        }
        Ok(vec)
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, AgentError> {
        self.embed(format!("query: {}", text.trim())).await
    }

    async fn embed_passage(&self, text: &str) -> Result<Vec<f32>, AgentError> {
        self.embed(format!("passage: {}", text.trim())).await
    }
}
