//! 工具注册表：封闭的工具集合与名称解析

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::AgentError;

use super::{schema_json, Tool};

/// 封闭的工具标识；新增工具必须扩展此枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolId {
    Buffer,
    Elevation,
    Slope,
    Vegetation,
}

impl ToolId {
    pub const ALL: [ToolId; 4] = [
        ToolId::Buffer,
        ToolId::Elevation,
        ToolId::Slope,
        ToolId::Vegetation,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ToolId::Buffer => "buffer_filter_tool",
            ToolId::Elevation => "elevation_filter_tool",
            ToolId::Slope => "slope_filter_tool",
            ToolId::Vegetation => "vegetation_filter_tool",
        }
    }

    pub fn from_name(name: &str) -> Option<ToolId> {
        ToolId::ALL.into_iter().find(|id| id.name() == name)
    }
}

/// 注册表：按 ToolId 索引，提供名称解析与 schema 拼接
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<ToolId, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.id(), tool);
    }

    pub fn get(&self, id: ToolId) -> Option<Arc<dyn Tool>> {
        self.tools.get(&id).cloned()
    }

    /// 按名称解析工具；未知名称与未注册同样视为「工具不存在」
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Tool>, AgentError> {
        ToolId::from_name(name)
            .and_then(|id| self.get(id))
            .ok_or_else(|| AgentError::UnknownTool(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        ToolId::from_name(name)
            .map(|id| self.tools.contains_key(&id))
            .unwrap_or(false)
    }

    /// 已注册的工具名（按 ToolId 声明序）
    pub fn tool_names(&self) -> Vec<String> {
        ToolId::ALL
            .into_iter()
            .filter(|id| self.tools.contains_key(id))
            .map(|id| id.name().to_string())
            .collect()
    }

    /// 所有工具的 schema（按 ToolId 声明序）
    pub fn schemas(&self) -> Vec<serde_json::Value> {
        ToolId::ALL
            .into_iter()
            .filter_map(|id| self.tools.get(&id))
            .map(|t| schema_json(t.as_ref()))
            .collect()
    }

    /// 所有工具的 schema 文本（提示词用）
    pub fn schema_text(&self) -> String {
        serde_json::to_string_pretty(&self.schemas()).unwrap_or_default()
    }
}
