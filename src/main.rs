//! Terra - 检索增强的空地分析任务智能体
//!
//! 入口：初始化日志、装配编排器，把命令行参数作为任务文本跑完整的
//! 规划 + 执行流程，结果以 JSON 输出。

use anyhow::Context;
use terra::app::build_components;
use terra::config::load_config;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 日志：默认 info，可通过 RUST_LOG 覆盖
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with(fmt::layer())
        .init();

    let task: String = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if task.is_empty() {
        eprintln!("用法: terra <任务描述>");
        eprintln!("示例: terra 为轻步兵寻找距建筑500米以上、高程100-300米的部署空地");
        std::process::exit(2);
    }

    let cfg = load_config(None).context("配置加载失败")?;
    let components = build_components(&cfg).await.context("组件装配失败")?;

    let outcome = components
        .orchestrator
        .execute_task(&task)
        .await
        .context("任务执行失败")?;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    if !outcome.success {
        std::process::exit(1);
    }
    Ok(())
}
