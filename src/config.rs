//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `TERRA__*` 覆盖（双下划线表示嵌套，
//! 如 `TERRA__LLM__MODEL=qwen3:32b`）。检索打分常量、重试上限、集合容量等
//! 均在此集中配置，组件在构造时显式接收配置对象，不依赖全局单例。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub embedding: EmbeddingSection,
    pub retrieval: RetrievalConfig,
    pub orchestrator: OrchestratorSection,
    pub store: StoreSection,
    pub tools: ToolsSection,
}

/// [app] 段：应用名与结果输出目录
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 工具产物（GeoJSON）输出目录
    pub result_dir: PathBuf,
    /// 提示词覆盖文件（JSON，缺省用内置文案）
    pub prompts_path: Option<PathBuf>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            result_dir: PathBuf::from("result"),
            prompts_path: None,
        }
    }
}

/// [llm] 段：OpenAI 兼容端点、模型与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub base_url: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// 单次补全超时（秒）；超时视为该次调用失败
    pub timeout_secs: u64,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            base_url: None,
            model: "qwen3:32b".to_string(),
            temperature: 0.7,
            max_tokens: 2000,
            timeout_secs: 180,
        }
    }
}

/// [embedding] 段：嵌入模型端点
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingSection {
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for EmbeddingSection {
    fn default() -> Self {
        Self {
            base_url: None,
            model: "all-minilm".to_string(),
            timeout_secs: 30,
        }
    }
}

/// [retrieval] 段：混合检索打分常量
///
/// 经验常量：数值/工具名关键词权重高于普通词，元数据 unit 命中可反超
/// 中等距离差；保持相对权重结构不变，具体数值可调。
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// 默认返回条数
    pub top_k: usize,
    /// 召回过采样倍数（top_k * oversample 条原始近邻）
    pub oversample: usize,
    /// 主过滤：余弦距离上限
    pub max_distance: f32,
    /// 降级路径的距离放宽量（max_distance + relaxed_increment）
    pub relaxed_increment: f32,
    /// 主过滤结果少于 min_k 条时触发降级
    pub min_k: usize,
    /// 语义分权重
    pub w_semantic: f32,
    /// 关键词分权重
    pub w_keyword: f32,
    /// 数值/工具名关键词的出现次数权重（普通词为 1.0）
    pub strong_keyword_weight: f32,
    /// 元数据 unit 字段命中加分
    pub boost_unit: f32,
    /// 元数据 type/tool 字段命中加分
    pub boost_type: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            oversample: 2,
            max_distance: 0.35,
            relaxed_increment: 0.15,
            min_k: 2,
            w_semantic: 0.75,
            w_keyword: 0.25,
            strong_keyword_weight: 2.0,
            boost_unit: 0.35,
            boost_type: 0.15,
        }
    }
}

/// [orchestrator] 段：重试上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorSection {
    /// 单个任务的总执行次数上限（首次执行 + 重规划后的再执行）
    pub max_iterations: usize,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self { max_iterations: 3 }
    }
}

/// [store] 段：知识库持久化与容量
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    /// SQLite 文件路径；未设置时使用内存库
    pub sqlite_path: Option<PathBuf>,
    /// executions 集合容量，超出时淘汰最旧一条
    pub executions_capacity: usize,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            sqlite_path: None,
            executions_capacity: 30,
        }
    }
}

/// [tools] 段：工具超时与缓冲区筛选的数据源
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
    /// buffer_filter_tool 的候选区域源文件（GeoJSON）
    pub regions_path: Option<PathBuf>,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
            regions_path: None,
        }
    }
}

/// 从 config 目录加载配置，环境变量 TERRA__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 TERRA__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("TERRA")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
