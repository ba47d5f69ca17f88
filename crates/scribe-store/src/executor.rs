use std::time::Instant;

use serde_json::{Map, Value};
use tracing::debug;

use scribe_core::QueryOutput;

use crate::database::Database;
use crate::error::StoreError;

pub const DEFAULT_MAX_ROWS: usize = 100;

/// Runs validated SQL against one dataset's database and shapes rows as JSON
/// objects keyed by column name.
pub struct QueryExecutor {
    db: Database,
    max_rows: usize,
}

impl QueryExecutor {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            max_rows: DEFAULT_MAX_ROWS,
        }
    }

    pub fn with_max_rows(mut self, max_rows: usize) -> Self {
        self.max_rows = max_rows;
        self
    }

    /// Execute a query, capping the result at `max_rows`. Errors carry the
    /// raw SQLite message (`StoreError::Query`) for downstream classification.
    pub fn execute(&self, sql: &str) -> Result<QueryOutput, StoreError> {
        let started = Instant::now();
        let output = self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(sql)
                .map_err(|e| StoreError::Query(e.to_string()))?;
            let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();

            let mut rows = stmt
                .query([])
                .map_err(|e| StoreError::Query(e.to_string()))?;
            let mut collected: Vec<Value> = Vec::new();
            while collected.len() < self.max_rows {
                match rows.next().map_err(|e| StoreError::Query(e.to_string()))? {
                    Some(row) => {
                        let mut object = Map::with_capacity(columns.len());
                        for (idx, name) in columns.iter().enumerate() {
                            object.insert(name.clone(), column_value(row, idx));
                        }
                        collected.push(Value::Object(object));
                    }
                    None => break,
                }
            }

            let row_count = collected.len();
            Ok(QueryOutput {
                rows: collected,
                columns,
                row_count,
                elapsed: started.elapsed(),
            })
        })?;

        debug!(
            rows = output.row_count,
            elapsed_ms = output.elapsed.as_millis() as u64,
            "query executed"
        );
        Ok(output)
    }
}

fn column_value(row: &rusqlite::Row<'_>, idx: usize) -> Value {
    use rusqlite::types::ValueRef;
    match row.get_ref(idx) {
        Ok(ValueRef::Null) => Value::Null,
        Ok(ValueRef::Integer(i)) => Value::from(i),
        Ok(ValueRef::Real(f)) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Ok(ValueRef::Text(t)) => Value::String(String::from_utf8_lossy(t).into_owned()),
        Ok(ValueRef::Blob(b)) => Value::String(format!("<blob {} bytes>", b.len())),
        Err(_) => Value::Null,
    }
}

/// User-facing rewrite of a raw SQLite error. The raw text still travels in
/// the execution artifact; only the reply surface uses this form.
pub fn friendly_message(raw: &str) -> String {
    let lower = raw.to_lowercase();
    if lower.contains("no such table") {
        "Database table not found. Please check your query.".to_string()
    } else if lower.contains("no such column") {
        "Column not found in database. Please check your query.".to_string()
    } else if lower.contains("syntax error") {
        "SQL syntax error. Please try rephrasing your query.".to_string()
    } else {
        format!("Query execution failed: {raw}")
    }
}
