//! The orchestrator: drives one request through the plan/act loop and turns
//! the finished run state into a caller-facing reply.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{info, instrument, warn};

use scribe_core::provider::{CompletionRequest, LlmClient};
use scribe_core::security::{SqlGuard, CHECK_TENANT_FILTER};
use scribe_core::state::{
    AgentReply, ExecutionArtifact, NextAction, QueryRequest, ResultCheck, Timings, Turn,
    WorkflowState,
};
use scribe_core::tools::ToolContext;
use scribe_llm::extract::extract_sql;
use scribe_llm::prompts::{
    explanation_prompt, generation_system_prompt, generation_user_prompt, EXPLANATION_SYSTEM,
};
use scribe_store::{friendly_message, Dataset, DatasetCatalog, SessionStore, DEFAULT_MAX_ROWS};
use scribe_telemetry::MetricsRecorder;

use crate::error::EngineError;
use crate::language::{
    detect_ambiguity, detect_followup, resolve_query, summarize_results, EntityExtractor,
    VocabularyCache,
};
use crate::planner::plan;
use crate::reflect::{apply_reflection, reflect};
use crate::registry::{ToolRegistry, DEFAULT_TOOL_TIMEOUT};
use crate::tools::create_default_registry;

const GENERATION_MAX_TOKENS: u32 = 1000;
const EXPLANATION_MAX_TOKENS: u32 = 300;
const EXPLANATION_TEMPERATURE: f64 = 0.7;

/// Resolver output below this confidence is logged but still used.
const LOW_RESOLUTION_CONFIDENCE: f64 = 0.8;

/// Model calls slower than this get a warning with their latency.
const SLOW_MODEL_CALL: Duration = Duration::from_secs(2);

const EMPTY_RESULTS_EXPLANATION: &str =
    "The query returned no results. This might indicate that no data matches the specified criteria.";

/// Knobs for the tool layer; model parameters are fixed per call site.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Row cap applied to every executed query.
    pub max_rows: usize,
    /// Wall-clock budget for a single tool invocation.
    pub tool_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_rows: DEFAULT_MAX_ROWS,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }
}

/// One engine serves every dataset and session; a [`run`](Engine::run) is a
/// single user turn. Runs against the same session are serialized on the
/// session lock, runs against different sessions proceed concurrently.
pub struct Engine {
    llm: Arc<dyn LlmClient>,
    catalog: Arc<DatasetCatalog>,
    sessions: Arc<SessionStore>,
    registry: ToolRegistry,
    guards: HashMap<String, Arc<SqlGuard>>,
    vocabularies: VocabularyCache,
    metrics: Option<Arc<MetricsRecorder>>,
}

impl Engine {
    /// Compiles one [`SqlGuard`] per dataset up front so a malformed tenancy
    /// config fails at startup instead of mid-run.
    pub fn new(
        llm: Arc<dyn LlmClient>,
        catalog: Arc<DatasetCatalog>,
        sessions: Arc<SessionStore>,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        let mut guards = HashMap::new();
        for id in catalog.ids() {
            let dataset = catalog.get(Some(&id))?;
            let guard = SqlGuard::new(dataset.config().tenancy.clone()).map_err(|source| {
                EngineError::InvalidTenancy { dataset: id.clone(), source }
            })?;
            guards.insert(id, Arc::new(guard));
        }

        let registry = create_default_registry(Arc::clone(&catalog), config.max_rows)
            .with_tool_timeout(config.tool_timeout);

        Ok(Self {
            llm,
            catalog,
            sessions,
            registry,
            guards,
            vocabularies: VocabularyCache::new(),
            metrics: None,
        })
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRecorder>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn catalog(&self) -> &Arc<DatasetCatalog> {
        &self.catalog
    }

    pub fn provider_name(&self) -> &str {
        self.llm.name()
    }

    pub fn provider_model(&self) -> &str {
        self.llm.model()
    }

    /// Run one user turn to completion.
    ///
    /// Workflow faults (bad SQL, failed tools, model errors) land on the run
    /// state and come back inside the reply; only an unknown dataset aborts
    /// with an error before the workflow starts.
    #[instrument(skip_all, fields(session = %request.session_id, dataset = %request.dataset_id))]
    pub async fn run(&self, request: QueryRequest) -> Result<AgentReply, EngineError> {
        let run_started = Instant::now();
        let mut timings = Timings::default();

        let dataset = self.catalog.get(Some(&request.dataset_id))?;
        let guard = self
            .guards
            .get(&request.dataset_id)
            .cloned()
            .ok_or_else(|| {
                scribe_store::StoreError::NotFound(format!(
                    "guard for dataset '{}'",
                    request.dataset_id
                ))
            })?;
        let vocabulary = self.vocabularies.get(&dataset);

        // Hold the session lock for the whole run so concurrent turns on one
        // session cannot interleave their history reads and writes.
        let session = self.sessions.entry(&request.session_id);
        let mut session = session.lock().await;
        session.touch();

        info!(utterance = %request.utterance, "run started");

        let signal = detect_followup(&request.utterance, session.history(), &vocabulary);
        let resolution = if signal.is_followup {
            let started = Instant::now();
            let info =
                resolve_query(self.llm.as_ref(), &request.utterance, session.history()).await;
            self.count_llm_request();
            timings.resolution_ms = started.elapsed().as_millis() as u64;
            if info.confidence < LOW_RESOLUTION_CONFIDENCE {
                warn!(confidence = info.confidence, "low resolution confidence");
            }
            Some(info)
        } else {
            None
        };
        let resolved_query = resolution
            .as_ref()
            .map(|r| r.resolved_query.clone())
            .unwrap_or_else(|| request.utterance.clone());

        let mut state = WorkflowState::new(&request, resolved_query);
        state.is_followup = signal.is_followup;
        state.resolution = resolution;

        // Ambiguity is only checked on the opening turn; later turns lean on
        // accumulated context instead of bouncing back to the user.
        if session.history().is_empty() && !state.skip_clarification {
            let questions = detect_ambiguity(&state.resolved_query, &vocabulary);
            if !questions.is_empty() {
                info!(questions = questions.len(), "ambiguous first turn, asking for clarification");
                state.clarification_needed = true;
                state.clarification_questions = questions;
                state.is_complete = true;
            }
        }

        let ctx = ToolContext {
            session_id: request.session_id.clone(),
            tenant_id: request.tenant_id,
            dataset_id: request.dataset_id.clone(),
        };

        while !state.is_complete {
            match plan(&mut state) {
                NextAction::Complete => break,
                NextAction::GenerateSql => {
                    self.generate_sql(&mut state, &dataset, &guard, &mut timings).await
                }
                NextAction::Reflect => {
                    let verdict = reflect(&state);
                    apply_reflection(&mut state, verdict);
                }
                NextAction::Explain => self.explain(&mut state).await,
                action => self.dispatch_tool(action, &mut state, &ctx, &mut timings).await,
            }
        }

        // A run that kept a failed execution ends as an error, phrased for
        // the caller rather than in SQLite's words.
        if state.error.is_none() {
            if let Some(raw) = state.execution.as_ref().and_then(|e| e.error()) {
                state.error = Some(friendly_message(raw));
            }
        }

        let security_passed = state.security.as_ref().is_some_and(|report| report.passed);
        if let Some(sql) = state.sql.clone() {
            if !state.clarification_needed && security_passed {
                let tenant_column = guard.config().filter_column.clone();
                let key_entities = EntityExtractor::new(&tenant_column)
                    .map(|extractor| extractor.extract(&sql))
                    .unwrap_or_default();
                session.push_turn(Turn {
                    utterance: request.utterance.clone(),
                    resolved_query: state.resolved_query.clone(),
                    sql,
                    results_summary: summarize_results(state.execution.as_ref(), &tenant_column),
                    key_entities,
                    timestamp: Utc::now(),
                    is_followup: state.is_followup,
                });
            }
        }

        timings.total_ms = run_started.elapsed().as_millis() as u64;
        let reply = AgentReply::from_state(&state, timings);

        if let Some(metrics) = &self.metrics {
            let outcome = if reply.needs_clarification {
                "clarification"
            } else if reply.success {
                "success"
            } else {
                "error"
            };
            metrics.counter_inc(
                "queries.total",
                &[("dataset", &request.dataset_id), ("outcome", outcome)],
                1,
            );
            metrics.histogram_observe(
                "query.duration_ms",
                &[("dataset", &request.dataset_id)],
                reply.timings.total_ms as f64,
            );
            metrics.gauge_set("sessions.active", &[], self.sessions.len() as f64);
        }

        info!(
            success = reply.success,
            iterations = reply.iterations,
            tool_calls = reply.tool_calls,
            elapsed_ms = reply.timings.total_ms,
            "run finished"
        );
        Ok(reply)
    }

    /// Generate SQL from the resolved query and vet it before it can run.
    ///
    /// A missing tenant filter (and nothing else) is repaired by injection;
    /// any other violation ends the run with the failed checks on the state.
    async fn generate_sql(
        &self,
        state: &mut WorkflowState,
        dataset: &Dataset,
        guard: &SqlGuard,
        timings: &mut Timings,
    ) {
        let Some(schema) = state.schema.as_deref() else {
            state.error = Some("SQL generation failed: schema not loaded".to_string());
            state.is_complete = true;
            return;
        };

        let tenant_column = &guard.config().filter_column;
        let request = CompletionRequest::new(
            generation_system_prompt(schema, &dataset.config().name, tenant_column, state.tenant_id),
            generation_user_prompt(&state.resolved_query, tenant_column, state.tenant_id),
        )
        .with_max_tokens(GENERATION_MAX_TOKENS);

        let started = Instant::now();
        let completion = self.llm.complete(&request).await;
        self.count_llm_request();
        let elapsed = started.elapsed();
        timings.generation_ms += elapsed.as_millis() as u64;
        if elapsed > SLOW_MODEL_CALL {
            warn!(elapsed_ms = elapsed.as_millis() as u64, "slow sql generation");
        }

        let raw = match completion {
            Ok(completion) => completion.text,
            Err(e) => {
                // Without SQL there is nothing left to act on.
                state.error = Some(format!("SQL generation failed: {e}"));
                state.is_complete = true;
                return;
            }
        };

        let mut sql = extract_sql(&raw);
        info!(sql = %sql, "sql generated");

        let validation_started = Instant::now();
        let mut report = guard.validate(&sql, state.tenant_id);
        if report.failed_check_names() == [CHECK_TENANT_FILTER] {
            let repaired = guard.repair_sql(&sql, state.tenant_id);
            let repaired_report = guard.validate(&repaired, state.tenant_id);
            if repaired_report.passed {
                warn!(sql = %repaired, "injected missing tenant filter into generated sql");
                sql = repaired;
                report = repaired_report;
            }
        }
        timings.validation_ms += validation_started.elapsed().as_millis() as u64;

        if !report.passed {
            let failed = report.failed_check_names().join(", ");
            warn!(checks = %failed, "generated sql failed security validation");
            state.error = Some(format!("Security validation failed: {failed}"));
            state.sql = Some(sql);
            state.security = Some(report);
            state.is_complete = true;
            return;
        }

        state.sql = Some(sql);
        state.security = Some(report);
    }

    /// Invoke the tool behind a planner action and fold the outcome back
    /// into the state. Tool faults are recorded, never propagated.
    async fn dispatch_tool(
        &self,
        action: NextAction,
        state: &mut WorkflowState,
        ctx: &ToolContext,
        timings: &mut Timings,
    ) {
        let (tool, args) = match action {
            NextAction::FetchSchema => (
                "fetch_schema",
                json!({ "query": state.resolved_query, "dataset_id": state.dataset_id }),
            ),
            NextAction::ExecuteSql => (
                "execute_sql",
                json!({ "sql": state.sql, "dataset_id": state.dataset_id }),
            ),
            NextAction::ValidateResults => (
                "validate_results",
                json!({
                    "query": state.resolved_query,
                    "sql": state.sql,
                    "results": state.execution,
                }),
            ),
            // The planner routes only tool actions here.
            _ => return,
        };

        let outcome = self.registry.invoke(tool, args, ctx).await;
        if action == NextAction::ExecuteSql {
            timings.execution_ms += outcome.elapsed.as_millis() as u64;
        }
        if let Some(metrics) = &self.metrics {
            metrics.histogram_observe(
                "tool.duration_ms",
                &[("tool", tool)],
                outcome.elapsed.as_millis() as f64,
            );
        }

        if outcome.success {
            // A successful step supersedes any error a cleared retry left
            // behind; the outcome log keeps the record of the failure.
            state.error = None;
            let payload = outcome.result.clone().unwrap_or(Value::Null);
            let decoded = match action {
                NextAction::FetchSchema => {
                    serde_json::from_value::<String>(payload).map(|schema| {
                        state.schema = Some(schema);
                    })
                }
                NextAction::ExecuteSql => {
                    serde_json::from_value::<ExecutionArtifact>(payload).map(|artifact| {
                        state.execution = Some(artifact);
                    })
                }
                NextAction::ValidateResults => {
                    serde_json::from_value::<ResultCheck>(payload).map(|check| {
                        state.validation = Some(check);
                    })
                }
                _ => Ok(()),
            };
            if let Err(e) = decoded {
                state.error = Some(format!("Tool {tool}: {e}"));
            }
        } else {
            let error = outcome
                .error
                .clone()
                .unwrap_or_else(|| "unknown error".to_string());
            state.error = Some(format!("Tool {tool}: {error}"));
        }

        state.record_tool_call(outcome);
    }

    /// Narrate the result set. Empty or failed executions get a canned line
    /// without spending a model call; a model fault degrades to a row count.
    async fn explain(&self, state: &mut WorkflowState) {
        let Some(output) = state
            .execution
            .as_ref()
            .and_then(|e| e.output())
            .filter(|o| !o.rows.is_empty())
        else {
            state.explanation = Some(EMPTY_RESULTS_EXPLANATION.to_string());
            return;
        };

        let row_count = output.row_count;
        let request = CompletionRequest::new(
            EXPLANATION_SYSTEM,
            explanation_prompt(
                &state.resolved_query,
                state.sql.as_deref().unwrap_or_default(),
                output,
            ),
        )
        .with_max_tokens(EXPLANATION_MAX_TOKENS)
        .with_temperature(EXPLANATION_TEMPERATURE);

        let started = Instant::now();
        let completion = self.llm.complete(&request).await;
        self.count_llm_request();
        let elapsed = started.elapsed();
        if elapsed > SLOW_MODEL_CALL {
            warn!(elapsed_ms = elapsed.as_millis() as u64, "slow explanation");
        }

        state.explanation = Some(match completion {
            Ok(completion) => completion.text.trim().to_string(),
            Err(e) => {
                warn!(error = %e, "explanation failed, falling back to row count");
                format!("Found {row_count} result(s) for your query.")
            }
        });
    }

    fn count_llm_request(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.counter_inc("llm.requests.total", &[("provider", self.llm.name())], 1);
        }
    }
}
