use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, warn};

use scribe_core::state::ToolOutcome;
use scribe_core::tools::{AgentTool, ToolContext, ToolError};

pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Uniform wrapper around the workflow's side-effecting operations.
///
/// Every invocation is timed and comes back as a [`ToolOutcome`] envelope:
/// unknown names, tool errors, and timeouts all become failure envelopes, so
/// the runner treats every call alike and a collaborator fault can never
/// crash a run.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn AgentTool>>,
    tool_timeout: Duration,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub fn register(&mut self, tool: Arc<dyn AgentTool>) {
        debug!(tool = tool.name(), "tool registered");
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn AgentTool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Registered tool names, sorted for stable listings.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn count(&self) -> usize {
        self.tools.len()
    }

    /// Invoke a tool by name and time the call.
    pub async fn invoke(&self, name: &str, args: serde_json::Value, ctx: &ToolContext) -> ToolOutcome {
        let started = Instant::now();

        let Some(tool) = self.get(name) else {
            warn!(tool = name, "unknown tool requested");
            return ToolOutcome {
                tool: name.to_string(),
                success: false,
                result: None,
                error: Some(ToolError::UnknownTool(name.to_string()).to_string()),
                elapsed: started.elapsed(),
            };
        };

        let outcome = tokio::time::timeout(self.tool_timeout, tool.run(args, ctx)).await;
        let elapsed = started.elapsed();

        match outcome {
            Ok(Ok(value)) => {
                debug!(tool = name, elapsed_ms = elapsed.as_millis() as u64, "tool succeeded");
                ToolOutcome {
                    tool: name.to_string(),
                    success: true,
                    result: Some(value),
                    error: None,
                    elapsed,
                }
            }
            Ok(Err(e)) => {
                error!(tool = name, error = %e, "tool failed");
                ToolOutcome {
                    tool: name.to_string(),
                    success: false,
                    result: None,
                    error: Some(e.to_string()),
                    elapsed,
                }
            }
            Err(_) => {
                error!(tool = name, timeout = ?self.tool_timeout, "tool timed out");
                ToolOutcome {
                    tool: name.to_string(),
                    success: false,
                    result: None,
                    error: Some(ToolError::Timeout(self.tool_timeout).to_string()),
                    elapsed,
                }
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
