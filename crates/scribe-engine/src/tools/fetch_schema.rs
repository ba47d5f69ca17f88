use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};

use scribe_core::tools::{AgentTool, ToolContext, ToolError};
use scribe_store::{describe_database, DatasetCatalog};

#[derive(Debug, Deserialize)]
struct FetchSchemaArgs {
    /// The resolved query, carried for traceability only.
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    dataset_id: Option<String>,
}

/// Introspects the live schema of the requested dataset, annotated with
/// data-availability guidance for the generation prompt.
pub struct FetchSchemaTool {
    catalog: Arc<DatasetCatalog>,
}

impl FetchSchemaTool {
    pub fn new(catalog: Arc<DatasetCatalog>) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl AgentTool for FetchSchemaTool {
    fn name(&self) -> &str {
        "fetch_schema"
    }

    fn description(&self) -> &str {
        "Retrieves the database schema with table and column details"
    }

    async fn run(&self, args: Value, ctx: &ToolContext) -> Result<Value, ToolError> {
        let args: FetchSchemaArgs =
            serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        let dataset_id = args.dataset_id.unwrap_or_else(|| ctx.dataset_id.clone());
        debug!(
            dataset = %dataset_id,
            query = args.query.as_deref().unwrap_or_default(),
            "fetching schema"
        );

        let dataset = self
            .catalog
            .get(Some(&dataset_id))
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
        let schema = describe_database(dataset.db())
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;

        info!(dataset = %dataset_id, chars = schema.len(), "schema fetched");
        Ok(Value::String(schema))
    }
}
