//! Terra HTTP 服务
//!
//! 启动: cargo run --bin terra-serve --features server
//! 监听地址可用 TERRA_LISTEN 覆盖，默认 127.0.0.1:8080

#![cfg(feature = "server")]

use anyhow::Context;
use terra::app::build_components;
use terra::config::load_config;
use terra::server::router;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with(fmt::layer())
        .init();

    let cfg = load_config(None).context("配置加载失败")?;
    let components = build_components(&cfg).await.context("组件装配失败")?;

    let addr = std::env::var("TERRA_LISTEN").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("监听 {} 失败", addr))?;
    tracing::info!(addr = %addr, "terra-serve 已启动");

    axum::serve(listener, router(components))
        .await
        .context("HTTP 服务异常退出")?;
    Ok(())
}
