use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use scribe_core::state::ExecutionArtifact;
use scribe_core::tools::{AgentTool, ToolContext, ToolError};
use scribe_store::{DatasetCatalog, QueryExecutor, StoreError, DEFAULT_MAX_ROWS};

#[derive(Debug, Deserialize)]
struct ExecuteSqlArgs {
    sql: String,
    #[serde(default)]
    dataset_id: Option<String>,
}

/// Runs generated SQL against the dataset's database.
///
/// A SQLite-level rejection is a *successful* tool call producing a failed
/// artifact: the reflection step classifies the raw error text to decide
/// between retry and accept, so it must land on the state rather than in the
/// run-level error field.
pub struct ExecuteSqlTool {
    catalog: Arc<DatasetCatalog>,
    max_rows: usize,
}

impl ExecuteSqlTool {
    pub fn new(catalog: Arc<DatasetCatalog>) -> Self {
        Self {
            catalog,
            max_rows: DEFAULT_MAX_ROWS,
        }
    }

    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = max_rows;
        self
    }
}

#[async_trait]
impl AgentTool for ExecuteSqlTool {
    fn name(&self) -> &str {
        "execute_sql"
    }

    fn description(&self) -> &str {
        "Executes a read-only SQL query against the dataset"
    }

    async fn run(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let args: ExecuteSqlArgs =
            serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        let dataset_id = args.dataset_id.unwrap_or_else(|| ctx.dataset_id.clone());

        let dataset = self
            .catalog
            .get(Some(&dataset_id))
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
        let executor = QueryExecutor::new(dataset.db().clone()).with_max_rows(self.max_rows);

        let artifact = match executor.execute(&args.sql) {
            Ok(output) => {
                info!(
                    dataset = %dataset_id,
                    rows = output.row_count,
                    elapsed_ms = output.elapsed.as_millis() as u64,
                    "sql executed"
                );
                ExecutionArtifact::Succeeded(output)
            }
            Err(StoreError::Query(raw)) => {
                warn!(dataset = %dataset_id, error = %raw, "sql execution rejected");
                ExecutionArtifact::Failed { error: raw }
            }
            Err(e) => return Err(ToolError::ExecutionFailed(e.to_string())),
        };

        serde_json::to_value(&artifact).map_err(|e| ToolError::ExecutionFailed(e.to_string()))
    }
}
