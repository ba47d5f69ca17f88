use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{RunId, SessionId};

/// Bumped whenever the serialized shape of [`WorkflowState`] changes.
pub const STATE_VERSION: u32 = 1;

/// Default retry budget when the caller does not specify one.
pub const DEFAULT_MAX_ITERATIONS: u32 = 3;

/// The action the planner has selected for the next step of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NextAction {
    FetchSchema,
    GenerateSql,
    ExecuteSql,
    ValidateResults,
    Reflect,
    Explain,
    Complete,
}

impl NextAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FetchSchema => "fetch_schema",
            Self::GenerateSql => "generate_sql",
            Self::ExecuteSql => "execute_sql",
            Self::ValidateResults => "validate_results",
            Self::Reflect => "reflect",
            Self::Explain => "explain",
            Self::Complete => "complete",
        }
    }
}

/// One turn's worth of input to the engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueryRequest {
    pub utterance: String,
    pub session_id: SessionId,
    pub tenant_id: i64,
    pub dataset_id: String,
    pub max_iterations: u32,
}

impl QueryRequest {
    pub fn new(utterance: impl Into<String>, session_id: SessionId, tenant_id: i64) -> Self {
        Self {
            utterance: utterance.into(),
            session_id,
            tenant_id,
            dataset_id: "sales".to_string(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_dataset(mut self, dataset_id: impl Into<String>) -> Self {
        self.dataset_id = dataset_id.into();
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }
}

/// Rows produced by a successful execution. Rows are JSON objects keyed by
/// column name so heterogeneous result sets survive serialization.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueryOutput {
    pub rows: Vec<Value>,
    pub columns: Vec<String>,
    pub row_count: usize,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
}

/// Outcome of the execute step. A failed execution is still an artifact — the
/// reflection step classifies the error text to decide retry vs accept, so the
/// failure has to land in state rather than only in the run-level error field.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionArtifact {
    Succeeded(QueryOutput),
    Failed { error: String },
}

impl ExecutionArtifact {
    pub fn succeeded(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }

    pub fn rows(&self) -> &[Value] {
        match self {
            Self::Succeeded(output) => &output.rows,
            Self::Failed { .. } => &[],
        }
    }

    pub fn row_count(&self) -> usize {
        match self {
            Self::Succeeded(output) => output.row_count,
            Self::Failed { .. } => 0,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Succeeded(_) => None,
            Self::Failed { error } => Some(error),
        }
    }

    pub fn output(&self) -> Option<&QueryOutput> {
        match self {
            Self::Succeeded(output) => Some(output),
            Self::Failed { .. } => None,
        }
    }
}

/// One named security check inside a [`ValidationReport`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SecurityCheck {
    pub name: String,
    pub passed: bool,
    pub message: String,
}

/// Non-fatal observation from the security validator.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ValidationWarning {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}

/// Result of running the tenant-isolation validator over generated SQL.
/// `passed` holds iff every check passed; warnings never affect it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ValidationReport {
    pub passed: bool,
    pub checks: Vec<SecurityCheck>,
    pub warnings: Vec<ValidationWarning>,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
}

impl ValidationReport {
    pub fn failed_check_names(&self) -> Vec<&str> {
        self.checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| c.name.as_str())
            .collect()
    }
}

/// Sanity check over execution results (the validate step of the loop).
/// Distinct from security validation, which runs inline at generation time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResultCheck {
    pub is_valid: bool,
    pub has_results: bool,
    pub row_count: usize,
    pub issues: Vec<String>,
}

/// Verdict of the reflection step.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Reflection {
    pub is_acceptable: bool,
    pub should_refine: bool,
    pub issues: Vec<String>,
    pub reasoning: String,
}

/// Envelope recorded for every tool invocation, success or failure.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub tool: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
}

/// What the query resolver made of a follow-up fragment.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResolutionInfo {
    pub resolved_query: String,
    pub confidence: f64,
    pub is_followup: bool,
    pub interpretation: String,
    #[serde(default)]
    pub entities_inherited: Value,
}

/// Semantic entities pulled out of generated SQL, kept with each session turn
/// so later follow-ups can inherit them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEntities {
    pub dimensions: Vec<String>,
    pub metrics: Vec<String>,
    pub filters: Vec<Value>,
    pub time_period: String,
    pub grouping: Vec<String>,
    pub limit: Option<u32>,
}

impl Default for ExtractedEntities {
    fn default() -> Self {
        Self {
            dimensions: Vec::new(),
            metrics: Vec::new(),
            filters: Vec::new(),
            time_period: "all time".to_string(),
            grouping: Vec::new(),
            limit: None,
        }
    }
}

/// One completed exchange stored in session history.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Turn {
    pub utterance: String,
    pub resolved_query: String,
    pub sql: String,
    pub results_summary: String,
    pub key_entities: ExtractedEntities,
    pub timestamp: DateTime<Utc>,
    pub is_followup: bool,
}

/// Full per-invocation state of the workflow. Built fresh for every run and
/// never shared across runs; the session store is the only cross-run state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkflowState {
    pub version: u32,
    pub run_id: RunId,
    pub session_id: SessionId,
    pub utterance: String,
    pub resolved_query: String,
    pub tenant_id: i64,
    pub dataset_id: String,

    pub iteration: u32,
    pub max_iterations: u32,

    // Artifacts accumulated by the plan -> act loop
    pub schema: Option<String>,
    pub sql: Option<String>,
    pub execution: Option<ExecutionArtifact>,
    pub validation: Option<ResultCheck>,
    pub security: Option<ValidationReport>,
    pub reflection: Option<Reflection>,
    pub explanation: Option<String>,

    pub clarification_needed: bool,
    pub clarification_questions: Vec<String>,
    pub skip_clarification: bool,

    pub is_followup: bool,
    pub resolution: Option<ResolutionInfo>,

    pub tool_calls: Vec<ToolOutcome>,
    pub next_action: NextAction,
    pub is_complete: bool,
    pub error: Option<String>,
}

impl WorkflowState {
    pub fn new(request: &QueryRequest, resolved_query: String) -> Self {
        let skip_clarification = request.utterance.contains("Additional context:");
        Self {
            version: STATE_VERSION,
            run_id: RunId::new(),
            session_id: request.session_id.clone(),
            utterance: request.utterance.clone(),
            resolved_query,
            tenant_id: request.tenant_id,
            dataset_id: request.dataset_id.clone(),
            iteration: 0,
            max_iterations: request.max_iterations,
            schema: None,
            sql: None,
            execution: None,
            validation: None,
            security: None,
            reflection: None,
            explanation: None,
            clarification_needed: false,
            clarification_questions: Vec::new(),
            skip_clarification,
            is_followup: false,
            resolution: None,
            tool_calls: Vec::new(),
            next_action: NextAction::FetchSchema,
            is_complete: false,
            error: None,
        }
    }

    /// Reset the artifacts a refinement round regenerates. The reflection
    /// verdict survives, which bounds every run to a single refine cycle.
    pub fn clear_for_retry(&mut self) {
        self.sql = None;
        self.execution = None;
        self.validation = None;
    }

    pub fn record_tool_call(&mut self, outcome: ToolOutcome) {
        self.tool_calls.push(outcome);
    }
}

/// Condensed resolver info echoed back to the caller.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResolutionSummary {
    pub interpreted_as: String,
    pub confidence: f64,
    pub interpretation: String,
}

/// Wall-clock timings for the major phases of a run, in milliseconds.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct Timings {
    pub resolution_ms: u64,
    pub generation_ms: u64,
    pub validation_ms: u64,
    pub execution_ms: u64,
    pub total_ms: u64,
}

/// The engine's reply for one turn.
///
/// `success` is false only for clarification requests and fatal errors;
/// a budget-exhausted run with partial artifacts still reports success.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AgentReply {
    pub success: bool,
    pub session_id: SessionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<QueryOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ResultCheck>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_validation: Option<ValidationReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reflection: Option<Reflection>,
    pub iterations: u32,
    pub tool_calls: usize,
    pub needs_clarification: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub questions: Vec<String>,
    pub is_followup: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution: Option<ResolutionSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timings: Timings,
}

impl AgentReply {
    /// Collapse a finished run into the caller-facing reply.
    pub fn from_state(state: &WorkflowState, timings: Timings) -> Self {
        if state.clarification_needed {
            return Self {
                success: false,
                session_id: state.session_id.clone(),
                sql: None,
                explanation: None,
                results: None,
                validation: None,
                security_validation: None,
                reflection: None,
                iterations: state.iteration,
                tool_calls: state.tool_calls.len(),
                needs_clarification: true,
                questions: state.clarification_questions.clone(),
                is_followup: state.is_followup,
                resolution: None,
                error: None,
                timings,
            };
        }

        let resolution = state.resolution.as_ref().filter(|_| state.is_followup).map(|r| {
            ResolutionSummary {
                interpreted_as: r.resolved_query.clone(),
                confidence: r.confidence,
                interpretation: r.interpretation.clone(),
            }
        });

        Self {
            success: state.error.is_none(),
            session_id: state.session_id.clone(),
            sql: state.sql.clone(),
            explanation: state.explanation.clone(),
            results: state.execution.as_ref().and_then(|e| e.output().cloned()),
            validation: state.validation.clone(),
            security_validation: state.security.clone(),
            reflection: state.reflection.clone(),
            iterations: state.iteration,
            tool_calls: state.tool_calls.len(),
            needs_clarification: false,
            questions: Vec::new(),
            is_followup: state.is_followup,
            resolution,
            error: state.error.clone(),
            timings,
        }
    }
}

/// Serde helper for Duration as milliseconds.
pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> QueryRequest {
        QueryRequest::new("Top products by revenue", SessionId::from_raw("s1"), 5)
    }

    #[test]
    fn next_action_serde_is_snake_case() {
        let json = serde_json::to_string(&NextAction::FetchSchema).unwrap();
        assert_eq!(json, r#""fetch_schema""#);
        let json = serde_json::to_string(&NextAction::ValidateResults).unwrap();
        assert_eq!(json, r#""validate_results""#);
        let parsed: NextAction = serde_json::from_str(r#""complete""#).unwrap();
        assert_eq!(parsed, NextAction::Complete);
    }

    #[test]
    fn request_defaults() {
        let req = request();
        assert_eq!(req.dataset_id, "sales");
        assert_eq!(req.max_iterations, DEFAULT_MAX_ITERATIONS);

        let req = request().with_dataset("market_size").with_max_iterations(8);
        assert_eq!(req.dataset_id, "market_size");
        assert_eq!(req.max_iterations, 8);
    }

    #[test]
    fn fresh_state_has_no_artifacts() {
        let state = WorkflowState::new(&request(), "Top products by revenue".into());
        assert_eq!(state.version, STATE_VERSION);
        assert_eq!(state.iteration, 0);
        assert!(state.schema.is_none());
        assert!(state.sql.is_none());
        assert!(state.execution.is_none());
        assert!(!state.is_complete);
        assert!(!state.skip_clarification);
    }

    #[test]
    fn additional_context_marker_skips_clarification() {
        let mut req = request();
        req.utterance = "Top products. Additional context: region = South".into();
        let state = WorkflowState::new(&req, req.utterance.clone());
        assert!(state.skip_clarification);
    }

    #[test]
    fn clear_for_retry_resets_only_regenerated_artifacts() {
        let mut state = WorkflowState::new(&request(), "q".into());
        state.schema = Some("CREATE TABLE sales (...)".into());
        state.sql = Some("SELECT 1".into());
        state.execution = Some(ExecutionArtifact::Failed { error: "no such column: x".into() });
        state.validation = Some(ResultCheck {
            is_valid: true,
            has_results: false,
            row_count: 0,
            issues: vec![],
        });
        state.reflection = Some(Reflection {
            is_acceptable: false,
            should_refine: true,
            issues: vec![],
            reasoning: "retry".into(),
        });

        state.clear_for_retry();

        assert!(state.sql.is_none());
        assert!(state.execution.is_none());
        assert!(state.validation.is_none());
        // Schema and reflection survive the reset
        assert!(state.schema.is_some());
        assert!(state.reflection.is_some());
    }

    #[test]
    fn execution_artifact_accessors() {
        let ok = ExecutionArtifact::Succeeded(QueryOutput {
            rows: vec![serde_json::json!({"region": "South"})],
            columns: vec!["region".into()],
            row_count: 1,
            elapsed: Duration::from_millis(12),
        });
        assert!(ok.succeeded());
        assert_eq!(ok.row_count(), 1);
        assert!(ok.error().is_none());

        let failed = ExecutionArtifact::Failed { error: "syntax error near FROM".into() };
        assert!(!failed.succeeded());
        assert_eq!(failed.row_count(), 0);
        assert!(failed.rows().is_empty());
        assert_eq!(failed.error(), Some("syntax error near FROM"));
    }

    #[test]
    fn execution_artifact_serde_is_tagged() {
        let failed = ExecutionArtifact::Failed { error: "boom".into() };
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"], "boom");
    }

    #[test]
    fn validation_report_failed_names() {
        let report = ValidationReport {
            passed: false,
            checks: vec![
                SecurityCheck { name: "Tenant Filter".into(), passed: false, message: "m".into() },
                SecurityCheck { name: "Single Tenant".into(), passed: true, message: "m".into() },
                SecurityCheck { name: "Read-Only".into(), passed: false, message: "m".into() },
            ],
            warnings: vec![],
            elapsed: Duration::from_millis(1),
        };
        assert_eq!(report.failed_check_names(), vec!["Tenant Filter", "Read-Only"]);
    }

    #[test]
    fn reply_for_clarification_has_questions_and_no_sql() {
        let mut state = WorkflowState::new(&request(), "south".into());
        state.clarification_needed = true;
        state.clarification_questions = vec!["What data would you like to see?".into()];

        let reply = AgentReply::from_state(&state, Timings::default());
        assert!(!reply.success);
        assert!(reply.needs_clarification);
        assert_eq!(reply.questions.len(), 1);
        assert!(reply.sql.is_none());
    }

    #[test]
    fn reply_success_tracks_fatal_error() {
        let mut state = WorkflowState::new(&request(), "q".into());
        state.sql = Some("SELECT 1".into());
        let reply = AgentReply::from_state(&state, Timings::default());
        assert!(reply.success);

        state.error = Some("Security validation failed: Tenant Filter".into());
        let reply = AgentReply::from_state(&state, Timings::default());
        assert!(!reply.success);
        assert_eq!(reply.error.as_deref(), Some("Security validation failed: Tenant Filter"));
    }

    #[test]
    fn reply_surfaces_results_only_on_successful_execution() {
        let mut state = WorkflowState::new(&request(), "q".into());
        state.execution = Some(ExecutionArtifact::Failed { error: "no such table: x".into() });
        let reply = AgentReply::from_state(&state, Timings::default());
        assert!(reply.results.is_none());

        state.execution = Some(ExecutionArtifact::Succeeded(QueryOutput {
            rows: vec![],
            columns: vec![],
            row_count: 0,
            elapsed: Duration::from_millis(1),
        }));
        let reply = AgentReply::from_state(&state, Timings::default());
        assert!(reply.results.is_some());
    }

    #[test]
    fn reply_resolution_only_for_followups() {
        let mut state = WorkflowState::new(&request(), "by region".into());
        state.resolution = Some(ResolutionInfo {
            resolved_query: "Show sales in 2023 by region".into(),
            confidence: 0.92,
            is_followup: true,
            interpretation: "inherits previous query".into(),
            entities_inherited: serde_json::json!({}),
        });

        // Not marked as follow-up: resolution stays internal
        let reply = AgentReply::from_state(&state, Timings::default());
        assert!(reply.resolution.is_none());

        state.is_followup = true;
        let reply = AgentReply::from_state(&state, Timings::default());
        let summary = reply.resolution.unwrap();
        assert_eq!(summary.interpreted_as, "Show sales in 2023 by region");
        assert!((summary.confidence - 0.92).abs() < f64::EPSILON);
    }

    #[test]
    fn workflow_state_serde_roundtrip() {
        let mut state = WorkflowState::new(&request(), "q".into());
        state.sql = Some("SELECT 1".into());
        state.tool_calls.push(ToolOutcome {
            tool: "fetch_schema".into(),
            success: true,
            result: Some(serde_json::json!("CREATE TABLE t (x)")),
            error: None,
            elapsed: Duration::from_millis(7),
        });

        let json = serde_json::to_string(&state).unwrap();
        let parsed: WorkflowState = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.version, STATE_VERSION);
        assert_eq!(parsed.sql.as_deref(), Some("SELECT 1"));
        assert_eq!(parsed.tool_calls.len(), 1);
        assert_eq!(parsed.tool_calls[0].elapsed, Duration::from_millis(7));
    }

    #[test]
    fn extracted_entities_default_time_period() {
        let entities = ExtractedEntities::default();
        assert_eq!(entities.time_period, "all time");
        assert!(entities.limit.is_none());
    }
}
