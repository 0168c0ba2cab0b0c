use std::sync::Arc;

use rmcp::model::{
    AnnotateAble, CallToolRequestParam, CallToolResult, Content, ErrorData as McpError,
    Implementation, ListResourceTemplatesResult, ListResourcesResult, ListToolsResult,
    PaginatedRequestParam, RawResource, RawResourceTemplate, ReadResourceRequestParam,
    ReadResourceResult, ResourceContents, ServerCapabilities, ServerInfo, Tool,
};
use rmcp::service::RequestContext;
use rmcp::{RoleServer, ServerHandler};
use serde_json::{json, Map, Value};

use crate::resources;
use crate::state::McpState;
use crate::tools;

fn schema(value: Value) -> Arc<Map<String, Value>> {
    match value {
        Value::Object(map) => Arc::new(map),
        _ => Arc::new(Map::new()),
    }
}

fn tool_list() -> Vec<Tool> {
    vec![
        Tool::new(
            "research_deep",
            "Full RAG pipeline: retrieve with the chosen strategy, synthesize an answer, \
             optionally attach sources and quality scores.",
            schema(json!({
                "type": "object",
                "properties": {
                    "question": {"type": "string"},
                    "strategy": {"type": "string", "default": "auto"},
                    "max_results": {"type": "integer", "default": 5},
                    "include_sources": {"type": "boolean", "default": true},
                    "enable_evaluation": {"type": "boolean", "default": true},
                },
                "required": ["question"],
            })),
        ),
        Tool::new(
            "evaluate_rag",
            "Evaluates a retrieval strategy against the configured golden dataset and \
             reports reference-free quality scores.",
            schema(json!({
                "type": "object",
                "properties": {
                    "strategy": {"type": "string", "default": "ensemble"},
                    "num_test_cases": {"type": "integer", "default": 10},
                    "output_format": {"type": "string", "enum": ["summary", "detailed", "json"], "default": "summary"},
                },
            })),
        ),
        Tool::new(
            "strategy_compare",
            "Runs several retrieval strategies against the same question concurrently and \
             ranks them by latency and result count.",
            schema(json!({
                "type": "object",
                "properties": {
                    "question": {"type": "string"},
                    "strategies": {"type": "array", "items": {"type": "string"}},
                    "max_results": {"type": "integer", "default": 5},
                },
                "required": ["question"],
            })),
        ),
    ]
}

fn arg_str<'a>(args: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

fn arg_usize(args: &Map<String, Value>, key: &str, default: usize) -> usize {
    args.get(key).and_then(Value::as_u64).map(|v| v as usize).unwrap_or(default)
}

fn arg_bool(args: &Map<String, Value>, key: &str, default: bool) -> bool {
    args.get(key).and_then(Value::as_bool).unwrap_or(default)
}

fn arg_string_vec(args: &Map<String, Value>, key: &str) -> Option<Vec<String>> {
    args.get(key)?.as_array().map(|items| {
        items.iter().filter_map(|v| v.as_str().map(str::to_owned)).collect()
    })
}

fn tool_result(value: Value) -> CallToolResult {
    let text = serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string());
    if value.get("error").is_some() {
        CallToolResult::error(vec![Content::text(text)])
    } else {
        CallToolResult::success(vec![Content::text(text)])
    }
}

/// Retrieval engine exposed over MCP: three composite tools and five
/// read-only resources, all operating on the same shared `McpState`.
/// Grounded on `mcp/server.py`'s `create_mcp_server` registration, adapted
/// to `rmcp`'s `ServerHandler` trait rather than FastMCP decorators.
#[derive(Clone)]
pub struct RetrievalMcpServer {
    state: McpState,
}

impl RetrievalMcpServer {
    pub fn new(state: McpState) -> Self {
        Self { state }
    }
}

impl ServerHandler for RetrievalMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            server_info: Implementation {
                name: "retrieval-mcp-server".to_owned(),
                version: env!("CARGO_PKG_VERSION").to_owned(),
            },
            capabilities: ServerCapabilities::builder().enable_tools().enable_resources().build(),
            instructions: Some(
                "Multi-strategy document retrieval over keyword, vector, hierarchical, \
                 multi-query, reranking, and ensemble strategies. Start with \
                 `strategies://info` to see what's available, or call `research_deep` directly."
                    .to_owned(),
            ),
            ..Default::default()
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult::with_all_items(tool_list()))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let empty = Map::new();
        let args = request.arguments.as_ref().unwrap_or(&empty);

        let result = match request.name.as_ref() {
            "research_deep" => {
                let Some(question) = arg_str(args, "question") else {
                    return Err(McpError::invalid_params("missing required argument `question`", None));
                };
                tools::research_deep::research_deep(
                    &self.state,
                    question,
                    arg_str(args, "strategy").unwrap_or("auto"),
                    arg_usize(args, "max_results", 5),
                    arg_bool(args, "include_sources", true),
                    arg_bool(args, "enable_evaluation", true),
                )
                .await
            }
            "evaluate_rag" => {
                tools::evaluate_rag::evaluate_rag(
                    &self.state,
                    arg_str(args, "strategy").unwrap_or("ensemble"),
                    arg_usize(args, "num_test_cases", 10),
                    arg_str(args, "output_format").unwrap_or("summary"),
                )
                .await
            }
            "strategy_compare" => {
                let Some(question) = arg_str(args, "question") else {
                    return Err(McpError::invalid_params("missing required argument `question`", None));
                };
                tools::strategy_compare::strategy_compare(
                    &self.state,
                    question,
                    arg_string_vec(args, "strategies"),
                    arg_usize(args, "max_results", 5),
                )
                .await
            }
            other => return Err(McpError::invalid_params(format!("unknown tool `{other}`"), None)),
        };

        Ok(tool_result(result))
    }

    async fn list_resource_templates(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourceTemplatesResult, McpError> {
        Ok(ListResourceTemplatesResult::with_all_items(vec![
            RawResourceTemplate {
                uri_template: "retriever://{strategy}/{query}".to_owned(),
                name: "retriever".to_owned(),
                description: Some("Raw top-10 documents for a strategy, no synthesis.".to_owned()),
                mime_type: Some("application/json".to_owned()),
            }
            .no_annotation(),
            RawResourceTemplate {
                uri_template: "collection://{name}/stats".to_owned(),
                name: "collection_stats".to_owned(),
                description: Some("Vector store and document store statistics.".to_owned()),
                mime_type: Some("application/json".to_owned()),
            }
            .no_annotation(),
            RawResourceTemplate {
                uri_template: "metrics://{strategy}".to_owned(),
                name: "performance_metrics".to_owned(),
                description: Some("Observed latency and result-count metrics for a strategy.".to_owned()),
                mime_type: Some("application/json".to_owned()),
            }
            .no_annotation(),
        ]))
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        Ok(ListResourcesResult::with_all_items(vec![
            RawResource {
                uri: "strategies://info".to_owned(),
                name: "strategies_info".to_owned(),
                description: Some("Static catalog of the six retrieval strategies.".to_owned()),
                mime_type: Some("application/json".to_owned()),
                size: None,
            }
            .no_annotation(),
            RawResource {
                uri: "cache://stats".to_owned(),
                name: "cache_stats".to_owned(),
                description: Some("Cache hit rate and derived tuning recommendations.".to_owned()),
                mime_type: Some("application/json".to_owned()),
                size: None,
            }
            .no_annotation(),
        ]))
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        let uri = request.uri.as_str();

        let body = if uri == "strategies://info" {
            resources::strategies_info::info()
        } else if uri == "cache://stats" {
            resources::cache_stats::stats(&self.state).await
        } else if let Some(rest) = uri.strip_prefix("metrics://") {
            let strategy = if rest.is_empty() { None } else { Some(rest) };
            resources::metrics::for_strategy(&self.state, strategy).await
        } else if let Some(rest) = uri.strip_prefix("collection://") {
            let name = rest.strip_suffix("/stats").unwrap_or(rest);
            resources::collection_stats::stats(&self.state, name).await
        } else if let Some(rest) = uri.strip_prefix("retriever://") {
            let Some((strategy, query)) = rest.split_once('/') else {
                return Err(McpError::invalid_params(
                    "expected retriever://{strategy}/{query}",
                    None,
                ));
            };
            resources::retriever::retrieve(&self.state, strategy, query).await
        } else {
            return Err(McpError::resource_not_found(format!("unknown resource `{uri}`"), None));
        };

        let text = serde_json::to_string_pretty(&body).unwrap_or_else(|_| body.to_string());
        Ok(ReadResourceResult {
            contents: vec![ResourceContents::text(text, request.uri)],
        })
    }
}
