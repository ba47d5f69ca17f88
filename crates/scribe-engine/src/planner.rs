use tracing::{debug, warn};

use scribe_core::state::{NextAction, WorkflowState};

/// Select the next step from the artifacts accumulated so far.
///
/// Every call charges one iteration against the budget; once the incremented
/// counter exceeds it the run completes immediately with whatever artifacts
/// exist, so a truncated run is a partial result rather than an error.
pub fn plan(state: &mut WorkflowState) -> NextAction {
    state.iteration += 1;

    if state.iteration > state.max_iterations {
        warn!(
            iteration = state.iteration,
            max_iterations = state.max_iterations,
            "iteration budget exceeded, completing with partial artifacts"
        );
        state.is_complete = true;
        state.next_action = NextAction::Complete;
        return NextAction::Complete;
    }

    let action = if state.schema.is_none() {
        NextAction::FetchSchema
    } else if state.sql.is_none() {
        NextAction::GenerateSql
    } else if state.execution.is_none() {
        NextAction::ExecuteSql
    } else if state.validation.is_none() {
        NextAction::ValidateResults
    } else if state.reflection.is_none() {
        NextAction::Reflect
    } else if state.explanation.is_none() && state.execution.is_some() {
        NextAction::Explain
    } else {
        state.is_complete = true;
        NextAction::Complete
    };

    debug!(iteration = state.iteration, action = action.as_str(), "planned next step");
    state.next_action = action;
    action
}
