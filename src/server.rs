//! HTTP 服务：编排器之上的薄 API 层
//!
//! 任务路由：POST /api/plan（仅规划）、/api/replan（反馈重规划）、
//! /api/execute（执行既有计划）、/api/task（规划 + 执行）。
//! 知识库管理路由：GET/POST /api/knowledge、DELETE /api/knowledge/:id、
//! GET /api/collections、GET /api/tools。

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::app::AppComponents;
use crate::embedding::Embedder;
use crate::error::AgentError;
use crate::knowledge::{
    COLLECTION_EQUIPMENT, COLLECTION_EXECUTIONS, COLLECTION_KNOWLEDGE, COLLECTION_TASKS,
};
use crate::orchestrator::Orchestrator;
use crate::plan::Plan;
use crate::store::{KnowledgeEntry, KnowledgeStore};
use crate::tools::ToolRegistry;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub store: Arc<dyn KnowledgeStore>,
    pub embedder: Arc<dyn Embedder>,
    pub registry: Arc<ToolRegistry>,
}

#[derive(Deserialize)]
struct TaskRequest {
    task: String,
}

#[derive(Deserialize)]
struct ReplanRequest {
    plan: Plan,
    feedback: String,
}

#[derive(Deserialize)]
struct ExecuteRequest {
    plan: Plan,
}

#[derive(Deserialize)]
struct CollectionQuery {
    collection: Option<String>,
}

impl CollectionQuery {
    fn name(&self) -> &str {
        self.collection.as_deref().unwrap_or(COLLECTION_KNOWLEDGE)
    }
}

#[derive(Deserialize)]
struct AddKnowledgeRequest {
    text: String,
    #[serde(default)]
    metadata: HashMap<String, String>,
    collection: Option<String>,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({"success": false, "error": self.message})),
        )
            .into_response()
    }
}

impl From<AgentError> for ApiError {
    fn from(e: AgentError) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: e.to_string(),
        }
    }
}

pub fn router(components: AppComponents) -> Router {
    Router::new()
        .route("/api/plan", post(generate_plan))
        .route("/api/replan", post(replan_with_feedback))
        .route("/api/execute", post(execute_plan))
        .route("/api/task", post(execute_task))
        .route("/api/knowledge", get(list_knowledge).post(add_knowledge))
        .route("/api/knowledge/:id", delete(delete_knowledge))
        .route("/api/collections", get(get_collections))
        .route("/api/tools", get(get_tools))
        .with_state(AppState {
            orchestrator: components.orchestrator,
            store: components.store,
            embedder: components.embedder,
            registry: components.registry,
        })
}

async fn generate_plan(
    State(state): State<AppState>,
    Json(req): Json<TaskRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let plan = state.orchestrator.generate_plan(&req.task).await?;
    Ok(Json(json!({"success": true, "plan": plan, "stage": "plan"})))
}

async fn replan_with_feedback(
    State(state): State<AppState>,
    Json(req): Json<ReplanRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let plan = state
        .orchestrator
        .replan_with_feedback(&req.plan, &req.feedback)
        .await?;
    Ok(Json(json!({"success": true, "plan": plan, "stage": "replan"})))
}

async fn execute_plan(
    State(state): State<AppState>,
    Json(req): Json<ExecuteRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let outcome = state.orchestrator.execute_plan(req.plan).await?;
    Ok(Json(serde_json::to_value(&outcome).unwrap_or_default()))
}

async fn execute_task(
    State(state): State<AppState>,
    Json(req): Json<TaskRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let outcome = state.orchestrator.execute_task(&req.task).await?;
    Ok(Json(serde_json::to_value(&outcome).unwrap_or_default()))
}

/// 列出集合全部条目；向量不回传
async fn list_knowledge(
    State(state): State<AppState>,
    Query(query): Query<CollectionQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let collection = query.name();
    let entries = state.store.list_all(collection).await?;
    let items: Vec<serde_json::Value> = entries
        .iter()
        .map(|e| {
            json!({
                "id": e.id,
                "text": e.text,
                "metadata": e.metadata,
                "created_at": e.created_at,
            })
        })
        .collect();
    Ok(Json(json!({
        "success": true,
        "collection": collection,
        "count": items.len(),
        "items": items,
    })))
}

/// 手动录入知识：服务端向量化后入库
async fn add_knowledge(
    State(state): State<AppState>,
    Json(req): Json<AddKnowledgeRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let collection = req.collection.as_deref().unwrap_or(COLLECTION_KNOWLEDGE);
    let vector = state.embedder.embed_passage(&req.text).await?;
    let entry = KnowledgeEntry::new(&req.text, req.metadata, vector);
    let id = entry.id.clone();
    state.store.insert(collection, entry).await?;
    tracing::info!(collection, id = %id, "知识条目已录入");
    Ok(Json(json!({"success": true, "collection": collection, "id": id})))
}

async fn delete_knowledge(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<CollectionQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let collection = query.name();
    let exists = state
        .store
        .list_all(collection)
        .await?
        .iter()
        .any(|e| e.id == id);
    if !exists {
        return Err(ApiError::not_found(format!("记录 {} 不存在", id)));
    }
    state.store.delete(collection, &id).await?;
    tracing::info!(collection, id = %id, "知识条目已删除");
    Ok(Json(json!({"success": true, "collection": collection, "id": id})))
}

async fn get_collections(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut collections = Vec::new();
    for name in [
        COLLECTION_KNOWLEDGE,
        COLLECTION_EQUIPMENT,
        COLLECTION_EXECUTIONS,
        COLLECTION_TASKS,
    ] {
        let count = state.store.list_all(name).await?.len();
        collections.push(json!({"name": name, "count": count}));
    }
    Ok(Json(json!({"success": true, "collections": collections})))
}

async fn get_tools(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({"tools": state.registry.schemas()}))
}
