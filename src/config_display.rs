//! The `config` tool and `GET /config` route: duploctl's environment
//! summary merged with what this server exposes.

use std::sync::Arc;

use axum::Json;
use axum::body::Body;
use axum::http::{Method, Request};
use axum::response::{IntoResponse, Response};
use rmcp::model::JsonObject;
use serde_json::{Map, Value};

use crate::ctx::{CustomRegistry, CustomRoute, CustomTool, Ctx, route_handler, tool_handler};

/// Copy of the environment map with `AvailableResources` set to the
/// filtered resources, `Tools` to the sorted tool names and `MCP` to the
/// server settings. The context itself is left untouched.
pub fn build_config(ctx: &Ctx) -> Map<String, Value> {
    let mut config = ctx.environment.clone();

    let mut tools = ctx.tools.clone();
    tools.sort();

    config.insert("AvailableResources".to_string(), Value::from(ctx.resources.clone()));
    config.insert("Tools".to_string(), Value::from(tools));
    config.insert(
        "MCP".to_string(),
        serde_json::to_value(&ctx.config).unwrap_or(Value::Null),
    );
    config
}

pub(crate) fn register(registry: &mut CustomRegistry) {
    registry
        .tool(
            CustomTool::new("config", tool_handler(config_tool))
                .description("Display current MCP server configuration."),
        )
        .route(CustomRoute::new(
            "/config",
            Method::GET,
            route_handler(config_route),
        ));
}

async fn config_tool(ctx: Arc<Ctx>, _args: JsonObject) -> crate::Result<Value> {
    Ok(Value::Object(build_config(&ctx)))
}

async fn config_route(ctx: Arc<Ctx>, _req: Request<Body>) -> Response {
    Json(Value::Object(build_config(&ctx))).into_response()
}
