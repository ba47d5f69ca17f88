use std::time::Duration;

use async_trait::async_trait;

use crate::ids::SessionId;

/// Context available to tools during execution.
#[derive(Clone, Debug)]
pub struct ToolContext {
    pub session_id: SessionId,
    pub tenant_id: i64,
    pub dataset_id: String,
}

/// Trait implemented by each workflow tool. Arguments arrive as a JSON object
/// and each tool deserializes its own parameter struct from them.
#[async_trait]
pub trait AgentTool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;

    async fn run(
        &self,
        args: serde_json::Value,
        ctx: &ToolContext,
    ) -> Result<serde_json::Value, ToolError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("timeout after {0:?}")]
    Timeout(Duration),
}
