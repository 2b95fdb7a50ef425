//! 混合检索引擎
//!
//! 流程：集合路由 → 关键词抽取 → 过采样近邻召回 → 语义/关键词/元数据融合打分
//! → 距离主过滤 → 不足 min_k 时放宽距离上限做降级回捞（结果带 low_confidence
//! 标记）→ 按 final_score 取 top_k。
//!
//! 关键词与元数据加分是为了补偿嵌入模型对「语义接近但作战含义不同」条目
//! （如两类单位的部署规则）的混淆；降级路径保证语料稀疏时下游规划仍有
//! 上下文可用，由调用方决定是否向用户透出低置信标记。

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::RetrievalConfig;
use crate::embedding::Embedder;
use crate::error::AgentError;
use crate::knowledge::{COLLECTION_EQUIPMENT, COLLECTION_KNOWLEDGE, KNOWN_UNITS};
use crate::retrieval::keywords::{extract_keywords, occurrence_count, Keyword};
use crate::store::{KnowledgeStore, Neighbor};

/// 装备/射程相关词：命中则路由到 equipment 集合
const EQUIPMENT_TERMS: &[&str] = &["射程", "装备", "武器", "火力", "弹药"];

/// 部署/地形相关词：命中则路由到 knowledge 集合
const TERRAIN_TERMS: &[&str] = &[
    "部署", "地形", "高程", "海拔", "坡度", "植被", "缓冲", "空地", "筛选", "隐蔽",
];

/// 检索候选（查询期临时结构，不落盘）
#[derive(Debug, Clone)]
pub struct RetrievalCandidate {
    pub text: String,
    pub metadata: HashMap<String, String>,
    pub distance: f32,
    pub collection: String,
    pub semantic_score: f32,
    pub keyword_score: f32,
    pub metadata_boost: f32,
    pub final_score: f32,
    /// 仅在降级（距离放宽）路径被回捞的候选为 true
    pub low_confidence: bool,
}

/// 混合检索引擎：构造时显式注入存储、嵌入与打分配置
pub struct RetrievalEngine {
    store: Arc<dyn KnowledgeStore>,
    embedder: Arc<dyn Embedder>,
    cfg: RetrievalConfig,
    tool_names: Vec<String>,
}

impl RetrievalEngine {
    pub fn new(
        store: Arc<dyn KnowledgeStore>,
        embedder: Arc<dyn Embedder>,
        cfg: RetrievalConfig,
        tool_names: Vec<String>,
    ) -> Self {
        Self {
            store,
            embedder,
            cfg,
            tool_names,
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.cfg
    }

    /// 检索：collection 显式给定时跳过路由；空集合得到空结果而非错误
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        collection: Option<&str>,
    ) -> Result<Vec<RetrievalCandidate>, AgentError> {
        let collections: Vec<String> = match collection {
            Some(c) => vec![c.to_string()],
            None => self.route_collections(query),
        };
        let keywords = extract_keywords(query, &self.tool_names, KNOWN_UNITS);
        let query_vector = self.embedder.embed_query(query).await?;

        let oversampled = top_k * self.cfg.oversample.max(1);
        let mut primary: Vec<RetrievalCandidate> = Vec::new();
        let mut excluded: Vec<(Neighbor, String)> = Vec::new();

        for coll in &collections {
            let neighbors = self
                .store
                .nearest_neighbors(coll, &query_vector, oversampled)
                .await?;
            for neighbor in neighbors {
                if neighbor.distance <= self.cfg.max_distance {
                    primary.push(self.score(neighbor, coll, query, &keywords, false));
                } else {
                    excluded.push((neighbor, coll.clone()));
                }
            }
        }

        sort_by_score(&mut primary);

        // 降级：主过滤不足 min_k 且还有被拒候选时，放宽距离上限回捞
        if primary.len() < self.cfg.min_k && !excluded.is_empty() {
            let relaxed_ceiling = self.cfg.max_distance + self.cfg.relaxed_increment;
            let rescued: Vec<RetrievalCandidate> = excluded
                .into_iter()
                .filter(|(n, _)| n.distance <= relaxed_ceiling)
                .map(|(n, coll)| self.score(n, &coll, query, &keywords, true))
                .collect();
            if !rescued.is_empty() {
                tracing::debug!(
                    rescued = rescued.len(),
                    "retrieval degraded: relaxed distance ceiling"
                );
                primary.extend(rescued);
                sort_by_score(&mut primary);
                dedup_by_text(&mut primary);
            }
        }

        primary.truncate(top_k);
        Ok(primary)
    }

    /// 集合路由：按查询中的领域词与实体名挑选目标集合，无命中则回退 knowledge
    fn route_collections(&self, query: &str) -> Vec<String> {
        let mut collections: Vec<String> = Vec::new();
        let mut add = |c: &str| {
            if !collections.iter().any(|x| x == c) {
                collections.push(c.to_string());
            }
        };

        if EQUIPMENT_TERMS.iter().any(|t| query.contains(t)) {
            add(COLLECTION_EQUIPMENT);
        }
        if TERRAIN_TERMS.iter().any(|t| query.contains(t)) {
            add(COLLECTION_KNOWLEDGE);
        }
        if KNOWN_UNITS.iter().any(|u| query.contains(u)) {
            add(COLLECTION_KNOWLEDGE);
            add(COLLECTION_EQUIPMENT);
        }

        if collections.is_empty() {
            collections.push(COLLECTION_KNOWLEDGE.to_string());
        }
        collections
    }

    fn score(
        &self,
        neighbor: Neighbor,
        collection: &str,
        query: &str,
        keywords: &[Keyword],
        low_confidence: bool,
    ) -> RetrievalCandidate {
        let entry = neighbor.entry;
        let semantic_score = 1.0 - neighbor.distance;
        let keyword_score = self.keyword_score(&entry.text, keywords);
        let metadata_boost = self.metadata_boost(&entry.metadata, query, keywords);
        let final_score = self.cfg.w_semantic * semantic_score
            + self.cfg.w_keyword * keyword_score
            + metadata_boost;

        RetrievalCandidate {
            text: entry.text,
            metadata: entry.metadata,
            distance: neighbor.distance,
            collection: collection.to_string(),
            semantic_score,
            keyword_score,
            metadata_boost,
            final_score,
            low_confidence,
        }
    }

    /// 出现次数加权平均；数值/工具名关键词权重更高
    fn keyword_score(&self, text: &str, keywords: &[Keyword]) -> f32 {
        if keywords.is_empty() {
            return 0.0;
        }
        let sum: f32 = keywords
            .iter()
            .map(|k| {
                let weight = if k.strong {
                    self.cfg.strong_keyword_weight
                } else {
                    1.0
                };
                occurrence_count(text, &k.text) as f32 * weight
            })
            .sum();
        sum / keywords.len() as f32
    }

    /// 元数据字段与查询/关键词的文本匹配加分：unit 命中加 boost_unit，
    /// type/tool 命中各加 boost_type
    fn metadata_boost(
        &self,
        metadata: &HashMap<String, String>,
        query: &str,
        keywords: &[Keyword],
    ) -> f32 {
        let matches = |value: &str| -> bool {
            !value.is_empty()
                && (query.contains(value) || keywords.iter().any(|k| k.text == value))
        };

        let mut boost = 0.0;
        if metadata.get("unit").map(|v| matches(v)).unwrap_or(false) {
            boost += self.cfg.boost_unit;
        }
        for field in ["type", "tool"] {
            if metadata.get(field).map(|v| matches(v)).unwrap_or(false) {
                boost += self.cfg.boost_type;
            }
        }
        boost
    }
}

fn sort_by_score(candidates: &mut [RetrievalCandidate]) {
    candidates.sort_by(|a, b| {
        b.final_score
            .partial_cmp(&a.final_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// 按文本去重，保留分数更高（排序后靠前）的一条
fn dedup_by_text(candidates: &mut Vec<RetrievalCandidate>) {
    let mut seen = std::collections::HashSet::new();
    candidates.retain(|c| seen.insert(c.text.clone()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{KnowledgeEntry, MemoryStore};
    use async_trait::async_trait;

    /// 测试嵌入：查询固定返回 [1, 0]，条目向量在插入时直接指定
    struct FixedEmbedder;

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed_query(&self, _text: &str) -> Result<Vec<f32>, AgentError> {
            Ok(vec![1.0, 0.0])
        }
        async fn embed_passage(&self, _text: &str) -> Result<Vec<f32>, AgentError> {
            Ok(vec![1.0, 0.0])
        }
    }

    /// 与 [1,0] 的余弦距离恰为 d 的单位向量
    fn vector_at_distance(d: f32) -> Vec<f32> {
        let cos = 1.0 - d;
        vec![cos, (1.0 - cos * cos).max(0.0).sqrt()]
    }

    fn entry(text: &str, metadata: &[(&str, &str)], d: f32) -> KnowledgeEntry {
        let metadata = metadata
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        KnowledgeEntry::new(text, metadata, vector_at_distance(d))
    }

    async fn engine_with(entries: Vec<KnowledgeEntry>) -> RetrievalEngine {
        let store = Arc::new(MemoryStore::new());
        for e in entries {
            store.insert(COLLECTION_KNOWLEDGE, e).await.unwrap();
        }
        RetrievalEngine::new(
            store,
            Arc::new(FixedEmbedder),
            RetrievalConfig::default(),
            vec!["buffer_filter_tool".to_string()],
        )
    }

    #[tokio::test]
    async fn test_distance_monotonicity() {
        // 关键词/元数据贡献相同时，距离近者分数不低
        let engine = engine_with(vec![
            entry("甲地概述", &[], 0.10),
            entry("乙地概述", &[], 0.30),
        ])
        .await;
        let results = engine
            .retrieve("概述", 5, Some(COLLECTION_KNOWLEDGE))
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].text, "甲地概述");
        assert!(results[0].final_score >= results[1].final_score);
    }

    #[tokio::test]
    async fn test_threshold_respected() {
        // 主过滤结果充足时，超阈值候选绝不出现
        let engine = engine_with(vec![
            entry("近条目一", &[], 0.10),
            entry("近条目二", &[], 0.20),
            entry("远条目", &[], 0.60),
        ])
        .await;
        let results = engine
            .retrieve("条目", 5, Some(COLLECTION_KNOWLEDGE))
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|c| c.distance <= 0.35));
        assert!(results.iter().all(|c| !c.low_confidence));
    }

    #[tokio::test]
    async fn test_degradation_only_when_needed() {
        // min_k 已满足时，即便还有原始候选也不触发降级
        let engine = engine_with(vec![
            entry("近一", &[], 0.05),
            entry("近二", &[], 0.15),
            entry("边缘条目", &[], 0.40),
        ])
        .await;
        let results = engine
            .retrieve("条目", 5, Some(COLLECTION_KNOWLEDGE))
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert!(!results.iter().any(|c| c.text == "边缘条目"));
    }

    #[tokio::test]
    async fn test_degradation_tags_low_confidence() {
        // 主过滤只剩 1 条（< min_k=2），放宽后回捞 0.45 的候选并打低置信标记
        let engine = engine_with(vec![
            entry("近条目", &[], 0.10),
            entry("边缘条目", &[], 0.45),
            entry("极远条目", &[], 0.90),
        ])
        .await;
        let results = engine
            .retrieve("条目", 5, Some(COLLECTION_KNOWLEDGE))
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        let rescued = results.iter().find(|c| c.text == "边缘条目").unwrap();
        assert!(rescued.low_confidence);
        let primary = results.iter().find(|c| c.text == "近条目").unwrap();
        assert!(!primary.low_confidence);
        // 0.90 超出放宽上限 0.50，仍被拒
        assert!(!results.iter().any(|c| c.text == "极远条目"));
    }

    #[tokio::test]
    async fn test_unit_boost_inverts_distance_ranking() {
        // 语义距离更远但 unit 元数据命中的条目，加分后反超纯距离更近的无关条目
        let engine = engine_with(vec![
            entry(
                "轻步兵适合部署在中等高程区域，缓冲距离100-300米。",
                &[("unit", "轻步兵"), ("type", "deployment_rule")],
                0.20,
            ),
            entry("后勤保障部队适合部署在低高程安全区域。", &[], 0.10),
        ])
        .await;
        let results = engine
            .retrieve("轻步兵 500米", 5, Some(COLLECTION_KNOWLEDGE))
            .await
            .unwrap();
        assert_eq!(results[0].metadata.get("unit").map(String::as_str), Some("轻步兵"));
        assert!(results[0].metadata_boost >= 0.35);
        assert!(results[0].final_score > results[1].final_score);
    }

    #[tokio::test]
    async fn test_empty_collection_yields_empty() {
        let engine = engine_with(vec![]).await;
        let results = engine
            .retrieve("任意查询", 5, Some(COLLECTION_KNOWLEDGE))
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_routing_defaults_to_knowledge() {
        let engine = engine_with(vec![entry("部署规则", &[], 0.1)]).await;
        // 无领域词：回退 knowledge 集合
        assert_eq!(engine.route_collections("随便说点什么"), vec!["knowledge"]);
        // 单位名：knowledge + equipment
        let routed = engine.route_collections("坦克部队的阵地");
        assert!(routed.contains(&"knowledge".to_string()));
        assert!(routed.contains(&"equipment".to_string()));
        // 射程词：equipment
        assert!(engine
            .route_collections("射程是多少")
            .contains(&"equipment".to_string()));
    }
}
