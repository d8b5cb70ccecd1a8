//! Error types for DuploCloud MCP server operations.

use thiserror::Error;

/// Main error type for DuploCloud MCP operations
#[derive(Error, Debug)]
pub enum DuploMcpError {
    /// A resource or command filter failed to compile
    #[error("invalid filter pattern '{0}': {1}")]
    InvalidFilter(String, String),

    /// A server setting could not be resolved from flags or environment
    #[error("invalid setting '{0}': {1}")]
    InvalidSetting(String, String),

    /// A catalog file could not be read or parsed
    #[error("catalog error for '{0}': {1}")]
    Catalog(String, String),

    /// Resource is not present in the catalog
    #[error("unknown resource '{0}'")]
    UnknownResource(String),

    /// Command is not present on the resource
    #[error("unknown command '{1}' on resource '{0}'")]
    UnknownCommand(String, String),

    /// Tool arguments failed schema validation
    #[error("invalid arguments for tool '{0}': {1}")]
    InvalidArguments(String, String),

    /// Tool is not registered
    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    /// duploctl could not be spawned or its I/O failed
    #[error("dispatch failed for '{0}': {1}")]
    Dispatch(String, String),

    /// duploctl call timed out and was killed
    #[error("call timeout for '{0}'")]
    CallTimeout(String),

    /// --help parsing failed for a resource or command
    #[error("help parse failed for '{0}': {1}")]
    HelpParseFailed(String, String),

    /// --help command timed out
    #[error("help timeout for '{0}'")]
    HelpTimeout(String),

    /// MCP protocol-level failure (content encoding, unknown URIs)
    #[error("protocol error for '{0}': {1}")]
    Protocol(String, String),
}

/// Result type alias for DuploCloud MCP operations
pub type Result<T> = std::result::Result<T, DuploMcpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_filter_display() {
        let err = DuploMcpError::InvalidFilter("serv(".to_string(), "unclosed group".to_string());
        assert_eq!(
            err.to_string(),
            "invalid filter pattern 'serv(': unclosed group"
        );
    }

    #[test]
    fn test_unknown_command_display() {
        let err = DuploMcpError::UnknownCommand("tenant".to_string(), "explode".to_string());
        assert_eq!(
            err.to_string(),
            "unknown command 'explode' on resource 'tenant'"
        );
    }

    #[test]
    fn test_call_timeout_display() {
        let err = DuploMcpError::CallTimeout("tenant_list".to_string());
        assert_eq!(err.to_string(), "call timeout for 'tenant_list'");
    }
}
