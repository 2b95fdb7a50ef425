//! 混合检索：语义召回 + 关键词/元数据加权 + 降级回退

pub mod engine;
pub mod keywords;

pub use engine::{RetrievalCandidate, RetrievalEngine};
pub use keywords::{extract_keywords, Keyword};
