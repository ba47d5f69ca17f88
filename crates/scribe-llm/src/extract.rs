//! Salvage helpers for model replies that ignore output-format instructions.

use serde_json::{json, Value};
use tracing::warn;

use scribe_core::state::ResolutionInfo;

/// Pull the SQL text out of a generation reply, dropping markdown fences the
/// model sometimes adds despite being told not to. A language tag stranded on
/// its own leading line ("sql", "SQL") is dropped too.
pub fn extract_sql(raw: &str) -> String {
    let mut sql = raw.trim().to_string();
    if sql.starts_with("```") {
        sql = sql
            .lines()
            .filter(|line| !matches!(line.trim(), "```" | "```sql" | "```SQL"))
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string();
    }
    match sql.strip_prefix("sql\n").or_else(|| sql.strip_prefix("SQL\n")) {
        Some(rest) => rest.trim().to_string(),
        None => sql,
    }
}

/// Strip a surrounding markdown code fence (and an optional `json` language
/// tag) from a reply, returning the inner text.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }
    let mut parts = trimmed.splitn(3, "```");
    parts.next(); // leading empty segment before the opening fence
    let inner = parts.next().unwrap_or("");
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.trim()
}

/// Parse the resolver's JSON reply, tolerating fenced output and missing
/// fields. A reply that is not valid JSON falls back to the original query at
/// half confidence rather than failing the turn.
pub fn parse_resolution(raw: &str, original: &str) -> ResolutionInfo {
    let cleaned = strip_code_fences(raw);
    match serde_json::from_str::<Value>(cleaned) {
        Ok(value) => ResolutionInfo {
            resolved_query: value
                .get("resolved_query")
                .and_then(Value::as_str)
                .unwrap_or(original)
                .to_string(),
            confidence: value.get("confidence").and_then(Value::as_f64).unwrap_or(0.5),
            is_followup: value
                .get("is_followup")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            interpretation: value
                .get("interpretation")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            entities_inherited: value
                .get("entities_inherited")
                .cloned()
                .unwrap_or_else(|| json!({})),
        },
        Err(e) => {
            warn!(error = %e, "resolver reply was not valid JSON, keeping original query");
            ResolutionInfo {
                resolved_query: original.to_string(),
                confidence: 0.5,
                is_followup: false,
                interpretation: "Resolution failed (JSON parse error), using original query"
                    .to_string(),
                entities_inherited: json!({}),
            }
        }
    }
}

/// Heuristic check for a resolver reply that is SQL rather than natural
/// language. The resolver is supposed to answer with a rephrased question;
/// when it answers with a query instead, downstream generation would be fed
/// SQL as its "natural language" input.
pub fn looks_like_sql(text: &str) -> bool {
    let upper = text.to_uppercase();
    let has_select = upper.contains("SELECT");
    let has_clause = upper.contains("FROM")
        || upper.contains("WHERE")
        || upper.contains("JOIN")
        || upper.contains("LIMIT");
    (has_select && has_clause) || upper.contains("GROUP BY") || upper.contains("ORDER BY")
}
