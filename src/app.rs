//! 组件装配：按配置把存储、嵌入、LLM、工具、检索与编排器接起来

use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::embedding::{Embedder, OpenAiEmbedder};
use crate::error::AgentError;
use crate::exec::ExecutionEngine;
use crate::knowledge::seed_collections;
use crate::llm::{LlmClient, OpenAiClient};
use crate::orchestrator::Orchestrator;
use crate::plan::{PlanProducer, PromptSet};
use crate::retrieval::RetrievalEngine;
use crate::store::{KnowledgeStore, MemoryStore, SqliteStore};
use crate::tools::{
    BufferFilterTool, ElevationFilterTool, SlopeFilterTool, ToolRegistry, VegetationFilterTool,
};

/// 装配产物：编排器加上知识库管理所需的共享组件
pub struct AppComponents {
    pub orchestrator: Arc<Orchestrator>,
    pub store: Arc<dyn KnowledgeStore>,
    pub embedder: Arc<dyn Embedder>,
    pub registry: Arc<ToolRegistry>,
}

/// 按配置装配全部组件；sqlite_path 未配置时用内存库，并预置种子语料
pub async fn build_components(cfg: &AppConfig) -> Result<AppComponents, AgentError> {
    let store: Arc<dyn KnowledgeStore> = match &cfg.store.sqlite_path {
        Some(path) => Arc::new(SqliteStore::open(path)?),
        None => Arc::new(MemoryStore::new()),
    };
    let embedder: Arc<dyn Embedder> = Arc::new(OpenAiEmbedder::from_config(&cfg.embedding));
    let llm: Arc<dyn LlmClient> = Arc::new(OpenAiClient::from_config(&cfg.llm));

    seed_collections(store.clone(), embedder.clone()).await?;

    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(BufferFilterTool::new(
        cfg.app.result_dir.clone(),
        cfg.tools.regions_path.clone(),
    )));
    registry.register(Arc::new(ElevationFilterTool::new(cfg.app.result_dir.clone())));
    registry.register(Arc::new(SlopeFilterTool::new(cfg.app.result_dir.clone())));
    registry.register(Arc::new(VegetationFilterTool::new(cfg.app.result_dir.clone())));
    let registry = Arc::new(registry);

    let retrieval = Arc::new(RetrievalEngine::new(
        store.clone(),
        embedder.clone(),
        cfg.retrieval.clone(),
        registry.tool_names(),
    ));

    let prompts = PromptSet::load(cfg.app.prompts_path.as_deref());

    let producer = PlanProducer::new(
        llm.clone(),
        retrieval.clone(),
        store.clone(),
        embedder.clone(),
        prompts.clone(),
    );
    let engine = ExecutionEngine::new(
        registry.clone(),
        llm,
        retrieval,
        store.clone(),
        embedder.clone(),
        prompts,
        cfg.store.executions_capacity,
        Duration::from_secs(cfg.tools.tool_timeout_secs),
    );

    let orchestrator = Arc::new(Orchestrator::new(
        producer,
        engine,
        registry.clone(),
        cfg.orchestrator.max_iterations,
    ));

    Ok(AppComponents {
        orchestrator,
        store,
        embedder,
        registry,
    })
}
