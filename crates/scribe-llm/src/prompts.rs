//! Prompt builders for the workflow's three model calls: SQL generation,
//! follow-up resolution, and result explanation.

use serde_json::Value;

use scribe_core::state::{QueryOutput, Turn};

pub const RESOLUTION_SYSTEM: &str =
    "You are a precise query resolution assistant. Always respond in valid JSON.";

pub const EXPLANATION_SYSTEM: &str =
    "You are a data insights analyst. Transform query results into clear, actionable insights.";

/// System prompt for SQL generation. The schema text comes from live
/// introspection of the dataset, and the tenant filter rule is spelled out
/// twice on purpose — generation is the first line of isolation enforcement,
/// validation the second.
pub fn generation_system_prompt(
    schema: &str,
    dataset_name: &str,
    filter_column: &str,
    tenant_id: i64,
) -> String {
    format!(
        r#"You are an expert SQL query generator for SQLite databases.
You specialize in {dataset_name} data analysis.

DATABASE SCHEMA:
{schema}

CRITICAL RULES:
1. ALWAYS include "WHERE {filter_column} = {tenant_id}" in your queries to enforce data isolation
2. Use ONLY the tables and columns defined in the schema above
3. Generate valid SQLite syntax
4. Return ONLY the SQL query without explanations
5. Use proper JOINs when querying across multiple tables
6. Always filter by the provided {filter_column} in WHERE clauses

Generate clean, efficient SQL queries based on the user's natural language input."#
    )
}

pub fn generation_user_prompt(resolved_query: &str, filter_column: &str, tenant_id: i64) -> String {
    format!(
        "Client Context: {filter_column} = {tenant_id}\n\nNatural Language Query: {resolved_query}\n\nGenerate the SQL query:"
    )
}

/// Render recent session turns as numbered context lines for the resolver,
/// including the entities each turn's SQL was found to touch.
pub fn context_block(history: &[Turn]) -> String {
    let mut lines = Vec::new();
    for (i, turn) in history.iter().enumerate() {
        lines.push(format!("{}. Query: \"{}\"", i + 1, turn.utterance));
        lines.push(format!("   Resolved to: \"{}\"", turn.resolved_query));

        let entities = &turn.key_entities;
        lines.push(format!("   Dimensions: {:?}", entities.dimensions));
        lines.push(format!("   Metrics: {:?}", entities.metrics));
        lines.push(format!("   Time period: {}", entities.time_period));
        if !entities.filters.is_empty() {
            lines.push(format!("   Filters: {:?}", entities.filters));
        }
        if let Some(limit) = entities.limit {
            lines.push(format!("   Limit: {limit}"));
        }
    }
    lines.join("\n")
}

pub fn resolution_prompt(context: &str, user_query: &str) -> String {
    format!(
        r#"You are a query resolution assistant for a text-to-SQL analytics system.

Previous conversation context:
{context}

New user query: "{user_query}"

Your task: Resolve this query into a complete, standalone natural language query that can be converted to SQL.

If it's a follow-up:
- Inherit relevant context from previous queries
- Resolve pronouns (it, that, them) to specific entities
- Expand implicit references (Q4 → "in Q4 2024", by region → "grouped by region")
- Keep the user's intent but make it standalone

If it's NOT a follow-up:
- Return the query unchanged

Respond in JSON format:
{{
    "resolved_query": "complete standalone query",
    "confidence": 0.95,
    "is_followup": true,
    "interpretation": "User wants to see same data but for Q4",
    "entities_inherited": {{"time_period": "Q4", "metrics": ["revenue"], "dimensions": ["product"]}}
}}"#
    )
}

pub fn explanation_prompt(user_query: &str, sql: &str, output: &QueryOutput) -> String {
    format!(
        r#"Analyze these query results and provide a clear explanation in 2-4 sentences.

User's Question: {user_query}

Generated SQL: {sql}

Results ({row_count} total rows, showing sample):
Columns: {columns}

Data Sample:
{sample}

Provide explanation that:
1. Directly answers the user's question
2. Highlights key findings (top values, trends, patterns)
3. Notes interesting comparisons or anomalies
4. Uses plain English for business stakeholders

Write as if explaining to a non-technical business user."#,
        row_count = output.row_count,
        columns = output.columns.join(", "),
        sample = data_sample(output),
    )
}

/// Rows for the explanation prompt: at most 10, values pipe-joined in column
/// order, missing or null cells shown as N/A.
fn data_sample(output: &QueryOutput) -> String {
    if output.rows.is_empty() {
        return "No data".to_string();
    }
    output
        .rows
        .iter()
        .take(10)
        .map(|row| {
            output
                .columns
                .iter()
                .map(|col| cell_text(row.get(col)))
                .collect::<Vec<_>>()
                .join(" | ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn cell_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "N/A".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
