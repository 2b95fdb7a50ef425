//! Terra - 检索增强的空地分析任务智能体
//!
//! 模块划分：
//! - **app**: 组件装配（配置 → 编排器）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **embedding**: 嵌入端口（query / passage 双框架）
//! - **exec**: 执行引擎（串联注入、三级步骤解析、首败即停）
//! - **knowledge**: 集合名、单位名与内置种子语料
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **orchestrator**: 规划 → 执行 → 重规划状态机
//! - **plan**: 计划类型、LLM 输出解析、计划生成与重规划
//! - **retrieval**: 混合检索（语义 + 关键词 + 元数据加权，带降级）
//! - **store**: 知识库端口与内存 / SQLite 实现
//! - **tools**: 工具契约、注册表与四个地理空间筛选工具

pub mod app;
pub mod config;
pub mod embedding;
pub mod error;
pub mod exec;
pub mod knowledge;
pub mod llm;
pub mod orchestrator;
pub mod plan;
pub mod retrieval;
#[cfg(feature = "server")]
pub mod server;
pub mod store;
pub mod tools;

pub use error::AgentError;
pub use orchestrator::{Orchestrator, TaskOutcome};
