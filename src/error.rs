//! Agent 错误类型
//!
//! 对应失败分类：检索（嵌入/存储）、计划解析、步骤解析、参数校验、工具执行等。
//! 所有失败都以结构化结果向上返回，核心流程不允许 panic 托管进程。

use thiserror::Error;

/// Agent 运行过程中可能出现的错误（嵌入、存储、LLM、解析、工具等）
#[derive(Error, Debug)]
pub enum AgentError {
    /// 嵌入服务调用失败；检索自身不重试，直接向调用方透出
    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Knowledge store error: {0}")]
    Store(String),

    #[error("LLM error: {0}")]
    Llm(String),

    /// LLM 输出无法解析为计划结构（调用方应回退到关键词计划）
    #[error("Plan parse error: {0}")]
    PlanParse(String),

    /// 步骤无法解析出工具与参数
    #[error("Step resolution failed: {0}")]
    StepResolution(String),

    /// 工具参数前置校验失败（区别于执行失败）
    #[error("Parameter validation failed: {0}")]
    ToolValidation(String),

    #[error("Tool execution failed: {0}")]
    ToolExecution(String),

    /// 未注册的工具名（封闭 ToolId 集合之外）
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
