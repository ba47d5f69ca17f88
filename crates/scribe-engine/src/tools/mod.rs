pub mod execute_sql;
pub mod fetch_schema;
pub mod validate_results;

use std::sync::Arc;

use scribe_store::DatasetCatalog;

use crate::registry::ToolRegistry;

pub use execute_sql::ExecuteSqlTool;
pub use fetch_schema::FetchSchemaTool;
pub use validate_results::ValidateResultsTool;

/// Registry with the three workflow tools wired to the dataset catalog.
pub fn create_default_registry(catalog: Arc<DatasetCatalog>, max_rows: usize) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    // Schema introspection
    registry.register(Arc::new(FetchSchemaTool::new(catalog.clone())));

    // Execution
    registry.register(Arc::new(ExecuteSqlTool::new(catalog).with_max_rows(max_rows)));

    // Result checks
    registry.register(Arc::new(ValidateResultsTool));

    registry
}
