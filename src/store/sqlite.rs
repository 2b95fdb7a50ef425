//! SQLite 知识库：跨会话持久化
//!
//! 单表存全部集合，向量与元数据以 JSON 文本落盘（查询语义与端口一致即可，
//! 格式不对外承诺）。近邻查询在进程内算余弦距离，数据规模为数十条级别。

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::{params, Connection};

use crate::error::AgentError;
use crate::store::{rank_neighbors, KnowledgeEntry, KnowledgeStore, Neighbor};

/// SQLite 实现：Connection 由 Mutex 保护，淘汰 + 插入走单事务
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AgentError> {
        let conn = Connection::open(path).map_err(|e| AgentError::Store(e.to_string()))?;
        Self::init(conn)
    }

    /// 内存库（测试用）
    pub fn open_in_memory() -> Result<Self, AgentError> {
        let conn = Connection::open_in_memory().map_err(|e| AgentError::Store(e.to_string()))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, AgentError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS entries (
                seq        INTEGER PRIMARY KEY AUTOINCREMENT,
                collection TEXT NOT NULL,
                id         TEXT NOT NULL,
                text       TEXT NOT NULL,
                metadata   TEXT NOT NULL,
                vector     TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_entries_collection ON entries(collection);",
        )
        .map_err(|e| AgentError::Store(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn insert_row(conn: &Connection, collection: &str, entry: &KnowledgeEntry) -> Result<(), AgentError> {
        let metadata = serde_json::to_string(&entry.metadata)
            .map_err(|e| AgentError::Store(e.to_string()))?;
        let vector =
            serde_json::to_string(&entry.vector).map_err(|e| AgentError::Store(e.to_string()))?;
        conn.execute(
            "INSERT INTO entries (collection, id, text, metadata, vector, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![collection, entry.id, entry.text, metadata, vector, entry.created_at],
        )
        .map_err(|e| AgentError::Store(e.to_string()))?;
        Ok(())
    }

    fn load_collection(conn: &Connection, collection: &str) -> Result<Vec<KnowledgeEntry>, AgentError> {
        let mut stmt = conn
            .prepare(
                "SELECT id, text, metadata, vector, created_at FROM entries
                 WHERE collection = ?1 ORDER BY seq",
            )
            .map_err(|e| AgentError::Store(e.to_string()))?;
        let rows = stmt
            .query_map(params![collection], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            })
            .map_err(|e| AgentError::Store(e.to_string()))?;

        let mut entries = Vec::new();
        for row in rows {
            let (id, text, metadata, vector, created_at) =
                row.map_err(|e| AgentError::Store(e.to_string()))?;
            let metadata: HashMap<String, String> = serde_json::from_str(&metadata)
                .map_err(|e| AgentError::Store(e.to_string()))?;
            let vector: Vec<f32> =
                serde_json::from_str(&vector).map_err(|e| AgentError::Store(e.to_string()))?;
            entries.push(KnowledgeEntry {
                id,
                text,
                metadata,
                vector,
                created_at,
            });
        }
        Ok(entries)
    }
}

#[async_trait]
impl KnowledgeStore for SqliteStore {
    async fn insert(&self, collection: &str, entry: KnowledgeEntry) -> Result<(), AgentError> {
        let conn = self.conn.lock().unwrap();
        Self::insert_row(&conn, collection, &entry)
    }

    async fn insert_bounded(
        &self,
        collection: &str,
        entry: KnowledgeEntry,
        capacity: usize,
    ) -> Result<(), AgentError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn
            .transaction()
            .map_err(|e| AgentError::Store(e.to_string()))?;
        let count: i64 = tx
            .query_row(
                "SELECT COUNT(*) FROM entries WHERE collection = ?1",
                params![collection],
                |row| row.get(0),
            )
            .map_err(|e| AgentError::Store(e.to_string()))?;
        if capacity > 0 && count as usize >= capacity {
            tx.execute(
                "DELETE FROM entries WHERE seq = (
                    SELECT seq FROM entries WHERE collection = ?1
                    ORDER BY created_at, seq LIMIT 1
                )",
                params![collection],
            )
            .map_err(|e| AgentError::Store(e.to_string()))?;
        }
        Self::insert_row(&tx, collection, &entry)?;
        tx.commit().map_err(|e| AgentError::Store(e.to_string()))
    }

    async fn list_all(&self, collection: &str) -> Result<Vec<KnowledgeEntry>, AgentError> {
        let conn = self.conn.lock().unwrap();
        Self::load_collection(&conn, collection)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), AgentError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM entries WHERE collection = ?1 AND id = ?2",
            params![collection, id],
        )
        .map_err(|e| AgentError::Store(e.to_string()))?;
        Ok(())
    }

    async fn nearest_neighbors(
        &self,
        collection: &str,
        query: &[f32],
        n: usize,
    ) -> Result<Vec<Neighbor>, AgentError> {
        let entries = {
            let conn = self.conn.lock().unwrap();
            Self::load_collection(&conn, collection)?
        };
        Ok(rank_neighbors(&entries, query, n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(text: &str, created_at: i64, vector: Vec<f32>) -> KnowledgeEntry {
        let mut e = KnowledgeEntry::new(text, HashMap::new(), vector);
        e.created_at = created_at;
        e
    }

    #[tokio::test]
    async fn test_roundtrip() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut metadata = HashMap::new();
        metadata.insert("unit".to_string(), "轻步兵".to_string());
        let e = KnowledgeEntry::new("部署规则", metadata, vec![0.5, 0.5]);
        let id = e.id.clone();
        store.insert("knowledge", e).await.unwrap();

        let all = store.list_all("knowledge").await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, id);
        assert_eq!(all[0].metadata.get("unit").unwrap(), "轻步兵");
        assert_eq!(all[0].vector, vec![0.5, 0.5]);
    }

    #[tokio::test]
    async fn test_bounded_eviction() {
        let store = SqliteStore::open_in_memory().unwrap();
        for i in 0..5i64 {
            store
                .insert_bounded("executions", entry(&format!("e{}", i), i, vec![1.0]), 4)
                .await
                .unwrap();
        }
        let remaining = store.list_all("executions").await.unwrap();
        assert_eq!(remaining.len(), 4);
        assert!(!remaining.iter().any(|e| e.text == "e0"));
    }

    #[tokio::test]
    async fn test_nearest_neighbors() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .insert("knowledge", entry("x", 1, vec![1.0, 0.0]))
            .await
            .unwrap();
        store
            .insert("knowledge", entry("y", 2, vec![0.0, 1.0]))
            .await
            .unwrap();
        let result = store
            .nearest_neighbors("knowledge", &[0.9, 0.1], 1)
            .await
            .unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].entry.text, "x");
    }
}
