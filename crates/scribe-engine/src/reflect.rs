use tracing::{info, warn};

use scribe_core::state::{Reflection, WorkflowState};

/// Error fragments that mark generated SQL as structurally wrong and worth
/// regenerating rather than surfacing to the user.
pub const CRITICAL_KEYWORDS: [&str; 7] = [
    "syntax error",
    "parse error",
    "invalid sql",
    "unknown column",
    "unknown table",
    "no such table",
    "no such column",
];

/// Judge the execution and validation artifacts. Critical execution errors
/// request a refinement round; everything else — including empty-but-clean
/// result sets — is accepted as-is.
pub fn reflect(state: &WorkflowState) -> Reflection {
    let mut should_refine = false;
    let mut issues = Vec::new();

    if let Some(error) = state.execution.as_ref().and_then(|e| e.error()) {
        let lowered = error.to_lowercase();
        if CRITICAL_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
            should_refine = true;
            issues.push(format!("Critical SQL error: {lowered}"));
            warn!(error = %lowered, "critical execution error, requesting refinement");
        } else {
            issues.push(format!("Non-critical error: {lowered}"));
            info!(error = %lowered, "non-critical execution error, accepting");
        }
    }

    if let Some(validation) = &state.validation {
        if !validation.has_results {
            issues.push("Query returned no results".to_string());
        }
    }

    let reasoning = if should_refine {
        "SQL has critical errors requiring retry"
    } else {
        "SQL quality acceptable"
    };

    Reflection {
        is_acceptable: !should_refine,
        should_refine,
        issues,
        reasoning: reasoning.to_string(),
    }
}

/// Store the verdict and, when a refinement is both wanted and affordable,
/// clear the artifacts the retry regenerates. Returns whether a refinement
/// round was started.
pub fn apply_reflection(state: &mut WorkflowState, reflection: Reflection) -> bool {
    let refine = reflection.should_refine && state.iteration < state.max_iterations;
    state.reflection = Some(reflection);

    if refine {
        info!(
            iteration = state.iteration,
            max_iterations = state.max_iterations,
            "clearing artifacts for sql refinement"
        );
        state.clear_for_retry();
    }
    refine
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use scribe_core::ids::SessionId;
    use scribe_core::state::{ExecutionArtifact, QueryOutput, QueryRequest, ResultCheck};

    fn state() -> WorkflowState {
        let request = QueryRequest::new("revenue by region", SessionId::new(), 5)
            .with_max_iterations(10);
        WorkflowState::new(&request, "revenue by region".to_string())
    }

    fn with_failure(error: &str) -> WorkflowState {
        let mut state = state();
        state.execution = Some(ExecutionArtifact::Failed { error: error.to_string() });
        state
    }

    #[test]
    fn critical_errors_request_refinement() {
        for raw in ["no such table: orders", "near \"SELEC\": SYNTAX ERROR", "unknown column x"] {
            let verdict = reflect(&with_failure(raw));
            assert!(verdict.should_refine, "expected refine for: {raw}");
            assert!(!verdict.is_acceptable);
            assert_eq!(verdict.reasoning, "SQL has critical errors requiring retry");
            assert!(verdict.issues[0].starts_with("Critical SQL error:"));
        }
    }

    #[test]
    fn non_critical_errors_are_accepted() {
        let verdict = reflect(&with_failure("database is locked"));
        assert!(!verdict.should_refine);
        assert!(verdict.is_acceptable);
        assert_eq!(verdict.issues, vec!["Non-critical error: database is locked"]);
        assert_eq!(verdict.reasoning, "SQL quality acceptable");
    }

    #[test]
    fn clean_execution_is_acceptable_with_no_issues() {
        let mut state = state();
        state.execution = Some(ExecutionArtifact::Succeeded(QueryOutput {
            rows: vec![serde_json::json!({"region": "South"})],
            columns: vec!["region".to_string()],
            row_count: 1,
            elapsed: Duration::from_millis(1),
        }));
        state.validation = Some(ResultCheck {
            is_valid: true,
            has_results: true,
            row_count: 1,
            issues: Vec::new(),
        });

        let verdict = reflect(&state);
        assert!(verdict.is_acceptable);
        assert!(verdict.issues.is_empty());
    }

    #[test]
    fn empty_results_noted_but_not_refined() {
        let mut state = state();
        state.validation = Some(ResultCheck {
            is_valid: true,
            has_results: false,
            row_count: 0,
            issues: vec!["No results returned".to_string()],
        });

        let verdict = reflect(&state);
        assert!(!verdict.should_refine);
        assert_eq!(verdict.issues, vec!["Query returned no results"]);
    }

    #[test]
    fn apply_clears_artifacts_when_budget_allows() {
        let mut state = state();
        state.sql = Some("SELECT bad".into());
        state.execution = Some(ExecutionArtifact::Failed { error: "syntax error".into() });
        state.validation = Some(ResultCheck {
            is_valid: true,
            has_results: false,
            row_count: 0,
            issues: Vec::new(),
        });
        state.iteration = 5;

        let verdict = reflect(&state);
        assert!(apply_reflection(&mut state, verdict));
        assert!(state.sql.is_none());
        assert!(state.execution.is_none());
        assert!(state.validation.is_none());
        assert!(state.reflection.is_some());
    }

    #[test]
    fn apply_keeps_artifacts_at_budget_edge() {
        let mut state = state();
        state.max_iterations = 5;
        state.iteration = 5;
        state.sql = Some("SELECT bad".into());
        state.execution = Some(ExecutionArtifact::Failed { error: "syntax error".into() });

        let verdict = reflect(&state);
        assert!(verdict.should_refine);
        assert!(!apply_reflection(&mut state, verdict));
        assert!(state.sql.is_some(), "no budget left, artifacts must survive");
        assert!(state.reflection.is_some());
    }

    #[test]
    fn acceptable_verdict_never_clears() {
        let mut state = state();
        state.sql = Some("SELECT 1".into());
        state.iteration = 1;

        let verdict = reflect(&state);
        assert!(!apply_reflection(&mut state, verdict));
        assert!(state.sql.is_some());
    }

    #[test]
    fn keyword_match_is_case_insensitive() {
        let verdict = reflect(&with_failure("NO SUCH COLUMN: Price"));
        assert!(verdict.should_refine);
        assert_eq!(verdict.issues, vec!["Critical SQL error: no such column: price"]);
    }
}
