use std::sync::Arc;

use common::adapters::memory::{InMemoryCache, InMemoryDocumentStore, InMemoryVectorStore};
use common::adapters::openai::OpenAiAdapter;
use common::config::{get_config, AppConfig, TransportKind};
use mcp_server::{McpState, RetrievalMcpServer};
use retrieval_core::metrics::InMemoryMetricsSink;
use retrieval_core::Dependencies;
use rmcp::service::ServiceExt;
use rmcp::transport::sse_server::SseServer;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Builds the shared `Dependencies` bundle once at startup (spec's
/// "lazy singletons -> explicit initialization phase"). Production vector
/// store / cache backends are named interfaces only (spec.md §1); this
/// wires the in-memory adapters that actually implement them today, and
/// an `OpenAiAdapter` for the one named production integration the
/// teacher already depends on.
fn build_dependencies(config: &AppConfig) -> (Dependencies, Arc<InMemoryMetricsSink>) {
    let api_key = config.openai_api_key.as_deref().unwrap_or_default();
    let llm = Arc::new(OpenAiAdapter::new(
        api_key,
        &config.openai_base_url,
        config.llm_model.clone(),
        config.embedding_model.clone(),
    ));
    let metrics = Arc::new(InMemoryMetricsSink::new());

    let deps = Dependencies {
        embedder: llm.clone(),
        llm,
        vector_store: Arc::new(InMemoryVectorStore::new()),
        cache: Arc::new(InMemoryCache::new()),
        document_store: Arc::new(InMemoryDocumentStore::default()),
        metrics: metrics.clone(),
        config: config.clone(),
    };
    (deps, metrics)
}

/// Mirrors the original `MCPServer.get_server_info()` probe: static
/// capability/architecture description, useful for smoke-testing a
/// deployment without driving a full MCP handshake.
fn server_info(config: &AppConfig) -> serde_json::Value {
    serde_json::json!({
        "name": "retrieval-mcp-server",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Multi-strategy document retrieval over MCP",
        "architecture": "CQRS: mutation-free tools/resources over a shared Dependencies bundle",
        "capabilities": {
            "tools": ["research_deep", "evaluate_rag", "strategy_compare"],
            "resources": ["retriever", "strategies_info", "collection_stats", "cache_stats", "metrics"],
        },
        "retrieval_strategies": retrieval_core::StrategyKind::ALL.iter().map(|k| k.as_str()).collect::<Vec<_>>(),
        "transport": format!("{:?}", config.transport).to_lowercase(),
    })
}

/// Mirrors `MCPServer.health_check()`: each subsystem reports its own
/// status, degrading the aggregate rather than failing outright.
async fn health_check(deps: &Dependencies) -> serde_json::Value {
    let vector_ok = deps.vector_store.get_collection_info().await.is_ok();
    let doc_ok = deps.document_store.stats().await.is_ok();
    let config_ok = deps.config.openai_api_key.is_some();

    let status = if vector_ok && doc_ok && config_ok { "healthy" } else { "degraded" };

    serde_json::json!({
        "status": status,
        "checks": {
            "vector_store": vector_ok,
            "document_store": doc_ok,
            "configuration": config_ok,
        },
    })
}

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let config = get_config()?;
    let (deps, metrics) = build_dependencies(&config);

    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|a| a == "--server-info") {
        println!("{}", serde_json::to_string_pretty(&server_info(&config))?);
        return Ok(());
    }
    if args.iter().any(|a| a == "--health-check") {
        println!("{}", serde_json::to_string_pretty(&health_check(&deps).await)?);
        return Ok(());
    }

    let state = McpState::new(deps, metrics);

    match config.transport {
        TransportKind::Stdio => {
            info!("starting retrieval MCP server on stdio transport");
            let server = RetrievalMcpServer::new(state);
            let running = server.serve(rmcp::transport::io::stdio()).await?;
            running.waiting().await?;
        }
        TransportKind::Http => {
            let bind_address = format!("0.0.0.0:{}", config.http_port).parse()?;
            info!(%bind_address, "starting retrieval MCP server on SSE transport");
            let ct = SseServer::serve(bind_address)
                .await?
                .with_service(move || RetrievalMcpServer::new(state.clone()));
            ct.cancelled().await;
        }
    }

    Ok(())
}
