//! 执行引擎与编排器集成测试

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::Value;

    use terra::config::RetrievalConfig;
    use terra::embedding::Embedder;
    use terra::error::AgentError;
    use terra::exec::ExecutionEngine;
    use terra::llm::MockLlmClient;
    use terra::orchestrator::Orchestrator;
    use terra::plan::{Plan, PlanProducer, PromptSet, Step, SubPlan};
    use terra::retrieval::RetrievalEngine;
    use terra::store::{KnowledgeStore, MemoryStore};
    use terra::tools::{ParamSpec, Params, Tool, ToolId, ToolRegistry, ToolResult};

    /// 固定向量嵌入，测试不依赖外部服务
    struct StubEmbedder;

    #[async_trait]
    impl Embedder for StubEmbedder {
        async fn embed_query(&self, _text: &str) -> Result<Vec<f32>, AgentError> {
            Ok(vec![1.0, 0.0])
        }
        async fn embed_passage(&self, _text: &str) -> Result<Vec<f32>, AgentError> {
            Ok(vec![1.0, 0.0])
        }
    }

    const INPUT_PARAMS: &[ParamSpec] = &[ParamSpec {
        name: "input_geojson_path",
        ty: "string",
        description: "上一步产物路径",
        required: true,
    }];

    const SOURCE_PARAMS: &[ParamSpec] = &[ParamSpec {
        name: "buffer_distance",
        ty: "number",
        description: "缓冲距离",
        required: false,
    }];

    /// 记录每次调用参数的桩工具；可配置失败与是否声明链式输入参数
    struct ScriptedTool {
        id: ToolId,
        declares_input: bool,
        fail: bool,
        calls: Arc<Mutex<Vec<Params>>>,
    }

    impl ScriptedTool {
        fn new(id: ToolId, declares_input: bool, fail: bool) -> (Arc<Self>, Arc<Mutex<Vec<Params>>>) {
            let calls = Arc::new(Mutex::new(Vec::new()));
            let tool = Arc::new(Self {
                id,
                declares_input,
                fail,
                calls: calls.clone(),
            });
            (tool, calls)
        }
    }

    #[async_trait]
    impl Tool for ScriptedTool {
        fn id(&self) -> ToolId {
            self.id
        }
        fn description(&self) -> &str {
            "测试桩工具"
        }
        fn parameters(&self) -> &'static [ParamSpec] {
            if self.declares_input {
                INPUT_PARAMS
            } else {
                SOURCE_PARAMS
            }
        }
        fn validate(&self, _params: &Params) -> bool {
            true
        }
        async fn execute(&self, params: &Params) -> Result<ToolResult, AgentError> {
            self.calls.lock().unwrap().push(params.clone());
            if self.fail {
                Ok(ToolResult::fail("预置失败"))
            } else {
                Ok(ToolResult::ok(
                    format!("/tmp/{}.geojson", self.id.name()),
                    1,
                    100.0,
                ))
            }
        }
    }

    struct Harness {
        engine: ExecutionEngine,
        registry: Arc<ToolRegistry>,
        store: Arc<MemoryStore>,
        llm: Arc<MockLlmClient>,
        retrieval: Arc<RetrievalEngine>,
        embedder: Arc<StubEmbedder>,
    }

    fn harness(tools: Vec<Arc<dyn Tool>>, llm: MockLlmClient) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let embedder = Arc::new(StubEmbedder);
        let llm = Arc::new(llm);
        let mut registry = ToolRegistry::new();
        for tool in tools {
            registry.register(tool);
        }
        let registry = Arc::new(registry);
        let retrieval = Arc::new(RetrievalEngine::new(
            store.clone(),
            embedder.clone(),
            RetrievalConfig::default(),
            registry.tool_names(),
        ));
        let engine = ExecutionEngine::new(
            registry.clone(),
            llm.clone(),
            retrieval.clone(),
            store.clone(),
            embedder.clone(),
            PromptSet::default(),
            30,
            Duration::from_secs(5),
        );
        Harness {
            engine,
            registry,
            store,
            llm,
            retrieval,
            embedder,
        }
    }

    fn step(id: u32, tool: &str) -> Step {
        Step {
            step_id: id,
            description: format!("步骤{}", id),
            tool: Some(tool.to_string()),
            ..Default::default()
        }
    }

    fn orchestrator_from(h: &Harness, max_iterations: usize) -> Orchestrator {
        let producer = PlanProducer::new(
            h.llm.clone(),
            h.retrieval.clone(),
            h.store.clone(),
            h.embedder.clone(),
            PromptSet::default(),
        );
        let engine = ExecutionEngine::new(
            h.registry.clone(),
            h.llm.clone(),
            h.retrieval.clone(),
            h.store.clone(),
            h.embedder.clone(),
            PromptSet::default(),
            30,
            Duration::from_secs(5),
        );
        Orchestrator::new(producer, engine, h.registry.clone(), max_iterations)
    }

    #[tokio::test]
    async fn test_chain_wiring_injects_previous_result_path() {
        let (buffer, _) = ScriptedTool::new(ToolId::Buffer, false, false);
        let (elevation, elevation_calls) = ScriptedTool::new(ToolId::Elevation, true, false);
        let h = harness(vec![buffer, elevation], MockLlmClient::default());

        let plan = Plan {
            task: "串联".to_string(),
            steps: vec![step(1, "buffer_filter_tool"), step(2, "elevation_filter_tool")],
            ..Default::default()
        };
        let result = h.engine.execute_plan(&plan).await;

        assert!(result.success);
        // 第 2 步调用时必须已注入第 1 步的产物路径
        let calls = elevation_calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].get("input_geojson_path").and_then(Value::as_str),
            Some("/tmp/buffer_filter_tool.geojson")
        );
        assert_eq!(
            result.final_result_path.as_deref(),
            Some("/tmp/elevation_filter_tool.geojson")
        );
    }

    #[tokio::test]
    async fn test_first_failure_stops_step_list() {
        let (buffer, _) = ScriptedTool::new(ToolId::Buffer, false, false);
        let (elevation, _) = ScriptedTool::new(ToolId::Elevation, true, true);
        let (slope, slope_calls) = ScriptedTool::new(ToolId::Slope, true, false);
        let h = harness(vec![buffer, elevation, slope], MockLlmClient::default());

        let plan = Plan {
            steps: vec![
                step(1, "buffer_filter_tool"),
                step(2, "elevation_filter_tool"),
                step(3, "slope_filter_tool"),
            ],
            ..Default::default()
        };
        let result = h.engine.execute_plan(&plan).await;

        assert!(!result.success);
        // 第 2 步失败：只有 2 条步骤结果，第 3 步从未被调用
        assert_eq!(result.results.len(), 2);
        assert!(result.results[0].success);
        assert!(!result.results[1].success);
        assert_eq!(result.error.as_deref(), Some("预置失败"));
        assert!(slope_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sub_plan_failure_is_isolated() {
        let (slope, _) = ScriptedTool::new(ToolId::Slope, true, true);
        let (buffer, _) = ScriptedTool::new(ToolId::Buffer, false, false);
        let (elevation, _) = ScriptedTool::new(ToolId::Elevation, true, false);
        let h = harness(vec![slope, buffer, elevation], MockLlmClient::default());

        let plan = Plan {
            sub_plans: vec![
                SubPlan {
                    unit: "甲单位".to_string(),
                    steps: vec![step(1, "slope_filter_tool")],
                },
                SubPlan {
                    unit: "乙单位".to_string(),
                    steps: vec![step(1, "buffer_filter_tool"), step(2, "elevation_filter_tool")],
                },
            ],
            ..Default::default()
        };
        let result = h.engine.execute_plan(&plan).await;

        // 甲失败不阻止乙执行；整体失败但乙的子结果完整成功
        assert!(!result.success);
        assert_eq!(result.sub_results.len(), 2);
        assert!(!result.sub_results[0].success);
        let b = &result.sub_results[1];
        assert!(b.success);
        assert_eq!(b.steps.len(), 2);
        assert_eq!(b.result_path.as_deref(), Some("/tmp/elevation_filter_tool.geojson"));
    }

    #[tokio::test]
    async fn test_retry_bound_and_replan_count() {
        let (buffer, buffer_calls) = ScriptedTool::new(ToolId::Buffer, false, true);
        let replan_response = r#"{"task": "t", "goal": "重试", "steps": [{"step_id": 1, "tool": "buffer_filter_tool", "params": {"buffer_distance": 500}}]}"#;
        let h = harness(vec![buffer], MockLlmClient::always(replan_response));
        let orchestrator = orchestrator_from(&h, 3);

        let plan = Plan {
            task: "t".to_string(),
            steps: vec![step(1, "buffer_filter_tool")],
            ..Default::default()
        };
        let outcome = orchestrator.execute_plan(plan).await.unwrap();

        // 共 3 次执行（首次 + 2 次重规划后），每次执行恰好调用工具一次
        assert!(!outcome.success);
        assert_eq!(outcome.iterations, 3);
        assert_eq!(buffer_calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_success_skips_replanning() {
        let (buffer, buffer_calls) = ScriptedTool::new(ToolId::Buffer, false, false);
        let h = harness(vec![buffer], MockLlmClient::default());
        let orchestrator = orchestrator_from(&h, 3);

        let plan = Plan {
            steps: vec![step(1, "buffer_filter_tool")],
            ..Default::default()
        };
        let outcome = orchestrator.execute_plan(plan).await.unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.iterations, 1);
        assert_eq!(buffer_calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_execute_task_end_to_end() {
        let (buffer, _) = ScriptedTool::new(ToolId::Buffer, false, false);
        let plan_response = r#"```json
{"task": "为部队找空地", "goal": "筛选", "steps": [{"step_id": 1, "description": "按距离筛选", "tool": "buffer_filter_tool", "params": {"buffer_distance": 500}}]}
```"#;
        let h = harness(vec![buffer], MockLlmClient::always(plan_response));
        let orchestrator = orchestrator_from(&h, 3);

        let outcome = orchestrator.execute_task("为部队找空地").await.unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.plan.task, "为部队找空地");
        assert_eq!(outcome.iterations, 1);
        // 任务入库 + 执行历史入库
        assert_eq!(h.store.list_all("tasks").await.unwrap().len(), 1);
        assert_eq!(h.store.list_all("executions").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_execution_history_recorded_on_failure() {
        let (buffer, _) = ScriptedTool::new(ToolId::Buffer, false, true);
        let h = harness(vec![buffer], MockLlmClient::default());

        let plan = Plan {
            steps: vec![step(1, "buffer_filter_tool")],
            ..Default::default()
        };
        let result = h.engine.execute_plan(&plan).await;
        assert!(!result.success);

        let history = h.store.list_all("executions").await.unwrap();
        assert_eq!(history.len(), 1);
        assert!(history[0].text.contains("执行失败"));
        assert_eq!(
            history[0].metadata.get("success").map(String::as_str),
            Some("false")
        );
    }

    #[tokio::test]
    async fn test_think_step_params_override_llm_params() {
        let (buffer, buffer_calls) = ScriptedTool::new(ToolId::Buffer, false, false);
        let llm = MockLlmClient::always(
            r#"该步骤应做缓冲筛选。{"tool": "buffer_filter_tool", "params": {"buffer_distance": 100, "utm_crs": "EPSG:32650"}}"#,
        );
        let h = harness(vec![buffer], llm);

        // 无显式工具、无类型：走 LLM 解析；步骤自带的 buffer_distance 必须覆盖 LLM 给的值
        let mut think_step = Step {
            step_id: 1,
            description: "按距离筛选候选区域".to_string(),
            ..Default::default()
        };
        think_step
            .params
            .insert("buffer_distance".to_string(), Value::from(300));
        let plan = Plan {
            steps: vec![think_step],
            ..Default::default()
        };
        let result = h.engine.execute_plan(&plan).await;

        assert!(result.success);
        let calls = buffer_calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].get("buffer_distance").and_then(Value::as_f64),
            Some(300.0)
        );
        // LLM 补充的参数保留
        assert_eq!(
            calls[0].get("utm_crs").and_then(Value::as_str),
            Some("EPSG:32650")
        );
    }

    #[tokio::test]
    async fn test_think_without_action_or_type_fails_step() {
        let (buffer, buffer_calls) = ScriptedTool::new(ToolId::Buffer, false, false);
        let h = harness(vec![buffer], MockLlmClient::always("这里只有自然语言，没有可执行动作"));

        let plan = Plan {
            steps: vec![Step {
                step_id: 1,
                description: "含混不清的步骤".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let result = h.engine.execute_plan(&plan).await;

        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("无法确定执行动作或参数"));
        assert!(buffer_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_think_falls_back_to_type_table() {
        let (slope, slope_calls) = ScriptedTool::new(ToolId::Slope, false, false);
        let h = harness(vec![slope], MockLlmClient::always("没想出结构化动作"));

        // LLM 未给出动作，但步骤类型已知：回退类型映射表
        let plan = Plan {
            steps: vec![Step {
                step_id: 1,
                description: "坡度筛选".to_string(),
                step_type: Some("slope".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        };
        let result = h.engine.execute_plan(&plan).await;

        assert!(result.success);
        assert_eq!(slope_calls.lock().unwrap().len(), 1);
        assert_eq!(
            result.final_result_path.as_deref(),
            Some("/tmp/slope_filter_tool.geojson")
        );
    }

    #[tokio::test]
    async fn test_replan_with_feedback_reaches_prompt() {
        let (buffer, _) = ScriptedTool::new(ToolId::Buffer, false, false);
        let revised = r#"{"task": "找空地", "goal": "改距离", "steps": [{"step_id": 1, "tool": "buffer_filter_tool", "params": {"buffer_distance": 800}}]}"#;
        let h = harness(vec![buffer], MockLlmClient::always(revised));
        let orchestrator = orchestrator_from(&h, 3);

        let plan = Plan {
            task: "找空地".to_string(),
            steps: vec![step(1, "buffer_filter_tool")],
            ..Default::default()
        };
        let new_plan = orchestrator
            .replan_with_feedback(&plan, "缓冲距离改为800米")
            .await
            .unwrap();

        assert_eq!(new_plan.task, "找空地");
        assert_eq!(
            new_plan.steps[0]
                .params
                .get("buffer_distance")
                .and_then(Value::as_f64),
            Some(800.0)
        );

        // 反馈文本与原计划必须进入 user 消息，工具 schema 进入 system 消息
        let requests = h.llm.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0][0].content.contains("工具参数规范"));
        assert!(requests[0][0].content.contains("buffer_filter_tool"));
        let user = &requests[0][1].content;
        assert!(user.contains("用户反馈"));
        assert!(user.contains("缓冲距离改为800米"));
        assert!(user.contains("原计划"));
    }

    #[tokio::test]
    async fn test_unknown_tool_fails_step() {
        let (buffer, _) = ScriptedTool::new(ToolId::Buffer, false, false);
        let h = harness(vec![buffer], MockLlmClient::default());

        let plan = Plan {
            steps: vec![step(1, "no_such_tool")],
            ..Default::default()
        };
        let result = h.engine.execute_plan(&plan).await;

        assert!(!result.success);
        assert!(result.error.as_deref().unwrap().contains("工具不存在"));
    }
}
