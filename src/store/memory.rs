//! 内存知识库：单进程锁保护的按集合条目表
//!
//! 默认实现，适合测试与无持久化部署；跨会话续用请配置 SqliteStore。

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::AgentError;
use crate::store::{rank_neighbors, KnowledgeEntry, KnowledgeStore, Neighbor};

/// 内存实现：存储级 Mutex，淘汰 + 插入天然原子
#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<HashMap<String, Vec<KnowledgeEntry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 最旧条目下标：created_at 最小，平手取先插入者
    fn oldest_index(entries: &[KnowledgeEntry]) -> Option<usize> {
        entries
            .iter()
            .enumerate()
            .min_by_key(|(_, e)| e.created_at)
            .map(|(i, _)| i)
    }
}

#[async_trait]
impl KnowledgeStore for MemoryStore {
    async fn insert(&self, collection: &str, entry: KnowledgeEntry) -> Result<(), AgentError> {
        let mut collections = self.collections.lock().unwrap();
        collections
            .entry(collection.to_string())
            .or_default()
            .push(entry);
        Ok(())
    }

    async fn insert_bounded(
        &self,
        collection: &str,
        entry: KnowledgeEntry,
        capacity: usize,
    ) -> Result<(), AgentError> {
        let mut collections = self.collections.lock().unwrap();
        let entries = collections.entry(collection.to_string()).or_default();
        if capacity > 0 && entries.len() >= capacity {
            if let Some(idx) = Self::oldest_index(entries) {
                let evicted = entries.remove(idx);
                tracing::debug!(collection, id = %evicted.id, "evicted oldest entry");
            }
        }
        entries.push(entry);
        Ok(())
    }

    async fn list_all(&self, collection: &str) -> Result<Vec<KnowledgeEntry>, AgentError> {
        let collections = self.collections.lock().unwrap();
        Ok(collections.get(collection).cloned().unwrap_or_default())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), AgentError> {
        let mut collections = self.collections.lock().unwrap();
        if let Some(entries) = collections.get_mut(collection) {
            entries.retain(|e| e.id != id);
        }
        Ok(())
    }

    async fn nearest_neighbors(
        &self,
        collection: &str,
        query: &[f32],
        n: usize,
    ) -> Result<Vec<Neighbor>, AgentError> {
        let collections = self.collections.lock().unwrap();
        let entries = collections.get(collection).map(|v| v.as_slice()).unwrap_or(&[]);
        Ok(rank_neighbors(entries, query, n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(text: &str, created_at: i64) -> KnowledgeEntry {
        let mut e = KnowledgeEntry::new(text, HashMap::new(), vec![1.0, 0.0]);
        e.created_at = created_at;
        e
    }

    #[tokio::test]
    async fn test_insert_and_list() {
        let store = MemoryStore::new();
        store.insert("knowledge", entry("a", 1)).await.unwrap();
        store.insert("knowledge", entry("b", 2)).await.unwrap();
        assert_eq!(store.list_all("knowledge").await.unwrap().len(), 2);
        assert!(store.list_all("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete() {
        let store = MemoryStore::new();
        let e = entry("a", 1);
        let id = e.id.clone();
        store.insert("knowledge", e).await.unwrap();
        store.delete("knowledge", &id).await.unwrap();
        assert!(store.list_all("knowledge").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bounded_insert_evicts_oldest() {
        let store = MemoryStore::new();
        let capacity = 30;
        for i in 0..capacity as i64 + 1 {
            store
                .insert_bounded("executions", entry(&format!("e{}", i), i), capacity)
                .await
                .unwrap();
        }
        let remaining = store.list_all("executions").await.unwrap();
        assert_eq!(remaining.len(), capacity);
        // 最旧的 e0 被淘汰
        assert!(!remaining.iter().any(|e| e.text == "e0"));
        assert!(remaining.iter().any(|e| e.text == "e1"));
    }

    #[tokio::test]
    async fn test_nearest_empty_collection() {
        let store = MemoryStore::new();
        let result = store
            .nearest_neighbors("executions", &[1.0, 0.0], 5)
            .await
            .unwrap();
        assert!(result.is_empty());
    }
}
