//! 知识库端口：按命名集合分区的向量条目存储
//!
//! 端口操作：insert / insert_bounded / list_all / delete / nearest_neighbors。
//! 条目不做原地更新（更新 = 删除 + 插入）；容量受限集合（executions）
//! 的「淘汰最旧 + 插入」必须对单集合原子，实现以存储级锁保证。

pub mod memory;
pub mod sqlite;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AgentError;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// 知识条目：入库后不可变
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub id: String,
    pub text: String,
    pub metadata: HashMap<String, String>,
    pub vector: Vec<f32>,
    /// 创建时间（Unix 毫秒），容量淘汰按此排序
    pub created_at: i64,
}

impl KnowledgeEntry {
    pub fn new(
        text: impl Into<String>,
        metadata: HashMap<String, String>,
        vector: Vec<f32>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            metadata,
            vector,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// 近邻查询结果
#[derive(Debug, Clone)]
pub struct Neighbor {
    pub entry: KnowledgeEntry,
    /// 余弦距离（1 - cosine_similarity）
    pub distance: f32,
}

/// 知识库端口
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    async fn insert(&self, collection: &str, entry: KnowledgeEntry) -> Result<(), AgentError>;

    /// 容量受限插入：集合达到 capacity 时先淘汰最旧一条再插入（对集合原子）
    async fn insert_bounded(
        &self,
        collection: &str,
        entry: KnowledgeEntry,
        capacity: usize,
    ) -> Result<(), AgentError>;

    async fn list_all(&self, collection: &str) -> Result<Vec<KnowledgeEntry>, AgentError>;

    async fn delete(&self, collection: &str, id: &str) -> Result<(), AgentError>;

    /// 集合内按余弦距离取 top-n 近邻；空集合返回空列表而非错误
    async fn nearest_neighbors(
        &self,
        collection: &str,
        query: &[f32],
        n: usize,
    ) -> Result<Vec<Neighbor>, AgentError>;
}

/// 余弦距离：1 - cos(a, b)；零向量或维度不一致视为最远
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 1.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}

/// 在条目列表上计算 top-n 近邻（内存与 SQLite 实现共用）
pub(crate) fn rank_neighbors(
    entries: &[KnowledgeEntry],
    query: &[f32],
    n: usize,
) -> Vec<Neighbor> {
    let mut neighbors: Vec<Neighbor> = entries
        .iter()
        .map(|e| Neighbor {
            distance: cosine_distance(query, &e.vector),
            entry: e.clone(),
        })
        .collect();
    neighbors.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    neighbors.truncate(n);
    neighbors
}
