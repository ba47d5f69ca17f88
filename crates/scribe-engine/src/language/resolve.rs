use std::time::{Duration, Instant};

use serde_json::json;
use tracing::{info, warn};

use scribe_core::provider::{CompletionRequest, LlmClient};
use scribe_core::state::{ResolutionInfo, Turn};
use scribe_llm::extract::{looks_like_sql, parse_resolution};
use scribe_llm::prompts::{context_block, resolution_prompt, RESOLUTION_SYSTEM};

/// Budget for the one extra model round-trip resolution costs per turn.
pub const RESOLUTION_TIMEOUT: Duration = Duration::from_secs(10);

const RESOLUTION_MAX_TOKENS: u32 = 500;
const RESOLUTION_TEMPERATURE: f64 = 0.3;
const SLOW_RESOLUTION: Duration = Duration::from_secs(2);

/// Turns in the context window shown to the resolver.
const CONTEXT_TURNS: usize = 3;

/// Expand a follow-up fragment into a standalone query using recent turns as
/// context. Every failure mode keeps the turn alive: model errors and
/// timeouts fall back to the original utterance, and SQL-shaped output falls
/// back to concatenating the previous resolved query with the fragment.
pub async fn resolve_query(
    client: &dyn LlmClient,
    utterance: &str,
    history: &[Turn],
) -> ResolutionInfo {
    if history.is_empty() {
        return ResolutionInfo {
            resolved_query: utterance.to_string(),
            confidence: 1.0,
            is_followup: false,
            interpretation: "First query in session".to_string(),
            entities_inherited: json!({}),
        };
    }

    let started = Instant::now();
    let recent = &history[history.len().saturating_sub(CONTEXT_TURNS)..];
    let request = CompletionRequest::new(
        RESOLUTION_SYSTEM,
        resolution_prompt(&context_block(recent), utterance),
    )
    .with_max_tokens(RESOLUTION_MAX_TOKENS)
    .with_temperature(RESOLUTION_TEMPERATURE);

    let outcome = tokio::time::timeout(RESOLUTION_TIMEOUT, client.complete(&request)).await;
    let elapsed = started.elapsed();
    if elapsed > SLOW_RESOLUTION {
        warn!(elapsed_ms = elapsed.as_millis() as u64, "slow query resolution");
    }

    let mut info = match outcome {
        Ok(Ok(completion)) => parse_resolution(&completion.text, utterance),
        Ok(Err(e)) => {
            warn!(error = %e, "query resolution failed, using original query");
            fallback(utterance, format!("Resolution failed ({e}), using original query"))
        }
        Err(_) => {
            warn!(timeout = ?RESOLUTION_TIMEOUT, "query resolution timed out, using original query");
            fallback(
                utterance,
                "Resolution failed (timed out), using original query".to_string(),
            )
        }
    };

    // A resolver that answers with SQL skipped a step; fall back to the
    // previous query plus the new fragment so generation still has language
    // to work with.
    if looks_like_sql(&info.resolved_query) {
        warn!(rejected = %info.resolved_query, "resolver produced SQL, concatenating with previous query");
        info.resolved_query = match history.last() {
            Some(previous) => format!("{} {}", previous.resolved_query, utterance),
            None => utterance.to_string(),
        };
        info.confidence = info.confidence.min(0.5);
        info.interpretation =
            "Resolver returned SQL; expanded by appending to the previous query".to_string();
    }

    info!(
        resolved = %info.resolved_query,
        confidence = info.confidence,
        elapsed_ms = elapsed.as_millis() as u64,
        "query resolved"
    );
    info
}

fn fallback(utterance: &str, interpretation: String) -> ResolutionInfo {
    ResolutionInfo {
        resolved_query: utterance.to_string(),
        confidence: 0.5,
        is_followup: false,
        interpretation,
        entities_inherited: json!({}),
    }
}
