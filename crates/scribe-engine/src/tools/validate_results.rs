use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use scribe_core::state::{ExecutionArtifact, ResultCheck};
use scribe_core::tools::{AgentTool, ToolContext, ToolError};

/// The runner also passes `query` and `sql` for log context; only the
/// serialized execution artifact is inspected.
#[derive(Debug, Deserialize)]
struct ValidateResultsArgs {
    results: Value,
}

/// Sanity-checks an execution artifact: did it produce rows, and did the
/// database reject it. Issues are advisory; `is_valid` stays true so the
/// reflection step owns the retry decision.
pub struct ValidateResultsTool;

#[async_trait]
impl AgentTool for ValidateResultsTool {
    fn name(&self) -> &str {
        "validate_results"
    }

    fn description(&self) -> &str {
        "Checks query results for emptiness and execution errors"
    }

    async fn run(&self, args: Value, _ctx: &ToolContext) -> Result<Value, ToolError> {
        let args: ValidateResultsArgs =
            serde_json::from_value(args).map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        let artifact: ExecutionArtifact = serde_json::from_value(args.results)
            .map_err(|e| ToolError::InvalidArguments(format!("results: {e}")))?;

        let mut issues = Vec::new();
        let has_results = !artifact.rows().is_empty();
        if !has_results {
            issues.push("No results returned".to_string());
        }
        if let Some(error) = artifact.error() {
            issues.push(format!("Execution error: {error}"));
        }

        let check = ResultCheck {
            is_valid: true,
            has_results,
            row_count: artifact.row_count(),
            issues,
        };
        info!(has_results, row_count = check.row_count, issues = check.issues.len(), "results validated");

        serde_json::to_value(&check).map_err(|e| ToolError::ExecutionFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use serde_json::json;

    use scribe_core::state::QueryOutput;

    use crate::testutil::ctx;

    fn args_for(artifact: &ExecutionArtifact) -> Value {
        json!({
            "query": "top products",
            "sql": "SELECT ...",
            "results": serde_json::to_value(artifact).unwrap(),
        })
    }

    fn succeeded(rows: Vec<Value>) -> ExecutionArtifact {
        ExecutionArtifact::Succeeded(QueryOutput {
            row_count: rows.len(),
            rows,
            columns: vec!["product".to_string()],
            elapsed: Duration::from_millis(2),
        })
    }

    #[tokio::test]
    async fn rows_pass_with_no_issues() {
        let artifact = succeeded(vec![json!({"product": "Laptop"})]);
        let result = ValidateResultsTool.run(args_for(&artifact), &ctx()).await.unwrap();
        let check: ResultCheck = serde_json::from_value(result).unwrap();

        assert!(check.is_valid);
        assert!(check.has_results);
        assert_eq!(check.row_count, 1);
        assert!(check.issues.is_empty());
    }

    #[tokio::test]
    async fn empty_result_flags_issue_but_stays_valid() {
        let artifact = succeeded(Vec::new());
        let result = ValidateResultsTool.run(args_for(&artifact), &ctx()).await.unwrap();
        let check: ResultCheck = serde_json::from_value(result).unwrap();

        assert!(check.is_valid);
        assert!(!check.has_results);
        assert_eq!(check.issues, vec!["No results returned"]);
    }

    #[tokio::test]
    async fn failed_execution_reports_both_issues() {
        let artifact = ExecutionArtifact::Failed {
            error: "no such column: price".to_string(),
        };
        let result = ValidateResultsTool.run(args_for(&artifact), &ctx()).await.unwrap();
        let check: ResultCheck = serde_json::from_value(result).unwrap();

        assert_eq!(check.row_count, 0);
        assert_eq!(
            check.issues,
            vec!["No results returned", "Execution error: no such column: price"]
        );
    }

    #[tokio::test]
    async fn missing_results_field_is_invalid_arguments() {
        let err = ValidateResultsTool
            .run(json!({"query": "q"}), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
