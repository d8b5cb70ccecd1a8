//! DuploCloud MCP server.
//! Exposes duploctl resources and commands as MCP tools over STDIO or
//! Streamable HTTP, in expanded (one tool per command) or compact mode, with
//! resource/command filters and custom tools that receive a runtime context.

pub mod catalog;
pub mod compact;
pub mod config;
pub mod config_display;
pub mod ctx;
pub mod duplo;
pub mod error;
pub mod filter;
pub mod server;
pub mod toolbox;
pub mod tools;

pub use catalog::Catalog;
pub use catalog::discovery::{DiscoveryConfig, DiscoveryResult, discover_catalog};
pub use config::{McpSettings, ServerSettings, SettingsOverrides, ToolMode, Transport};
pub use ctx::{Ctx, CustomRegistry, CustomRoute, CustomTool, route_handler, tool_handler};
pub use duplo::{Dispatch, DuploClient, Invocation};
pub use error::{DuploMcpError, Result};
pub use filter::NameFilter;
pub use server::{DuploCloudMcp, DuploMcpServer};
pub use toolbox::ToolBox;
