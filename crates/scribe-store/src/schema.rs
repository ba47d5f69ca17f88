use std::collections::BTreeMap;

use rusqlite::Connection;
use tracing::debug;

use crate::database::Database;
use crate::error::StoreError;

/// Render the live schema for prompting: CREATE TABLE statements (ordered by
/// table name) followed by a data-availability block, so the model anchors
/// time filters to what the data actually covers instead of the current date.
pub fn describe_database(db: &Database) -> Result<String, StoreError> {
    db.with_conn(|conn| {
        let mut stmt = conn
            .prepare("SELECT name, sql FROM sqlite_master WHERE type='table' ORDER BY name")?;
        let tables: Vec<(String, Option<String>)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<_, _>>()?;

        let statements: Vec<String> = tables
            .iter()
            .filter_map(|(_, sql)| sql.as_ref().map(|s| format!("{s};")))
            .collect();

        let mut guidance = vec!["\n-- DATA AVAILABILITY & GUIDANCE:".to_string()];

        if tables.iter().any(|(name, _)| name.contains("dim_time")) {
            if let Some((min, max)) =
                year_range(conn, "SELECT MIN(year), MAX(year) FROM dim_time WHERE is_forecast = 0")?
            {
                guidance.push(format!("-- Actual data years: {min} to {max}"));
            }
            if let Some((min, max)) =
                year_range(conn, "SELECT MIN(year), MAX(year) FROM dim_time WHERE is_forecast = 1")?
            {
                guidance.push(format!("-- Forecast years: {min} to {max}"));
            }
        }

        for (name, _) in tables.iter().filter(|(name, _)| name.contains("fact_")) {
            // Not every fact table has a year column; skip the ones that don't.
            let sql = format!("SELECT MIN(year), MAX(year) FROM \"{name}\"");
            if let Some((min, max)) = year_range(conn, &sql).ok().flatten() {
                guidance.push(format!("-- {name} data: {min} to {max}"));
            }
        }

        guidance.push(
            "-- IMPORTANT: For 'last N years' queries, use fact table's MAX(year) - N, not current date!"
                .to_string(),
        );
        guidance.push(
            "--   Example: year >= (SELECT MAX(year) - 1 FROM fact_market_size WHERE is_forecast = 0)"
                .to_string(),
        );

        let schema = format!("{}\n{}", statements.join("\n\n"), guidance.join("\n"));
        debug!(tables = tables.len(), chars = schema.len(), "schema described");
        Ok(schema)
    })
}

/// Name and declared type of one column, as reported by `PRAGMA table_info`.
#[derive(Clone, Debug)]
pub struct ColumnInfo {
    pub name: String,
    pub decl_type: String,
}

/// Every table with its columns, ordered by table name. Feeds the
/// schema-derived vocabulary used by the language heuristics.
pub fn table_columns(db: &Database) -> Result<Vec<(String, Vec<ColumnInfo>)>, StoreError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")?;
        let tables: Vec<String> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<_, _>>()?;

        let mut out = Vec::with_capacity(tables.len());
        for table in tables {
            let mut info = conn.prepare(&format!("PRAGMA table_info(\"{table}\")"))?;
            let columns: Vec<ColumnInfo> = info
                .query_map([], |row| {
                    Ok(ColumnInfo {
                        name: row.get(1)?,
                        decl_type: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    })
                })?
                .collect::<Result<_, _>>()?;
            out.push((table, columns));
        }
        Ok(out)
    })
}

/// Row count per table, ordered by table name. Served from the health
/// endpoint so a connected-but-empty database is visible.
pub fn table_counts(db: &Database) -> Result<BTreeMap<String, i64>, StoreError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")?;
        let tables: Vec<String> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<_, _>>()?;

        let mut out = BTreeMap::new();
        for table in tables {
            let count: i64 =
                conn.query_row(&format!("SELECT COUNT(*) FROM \"{table}\""), [], |row| {
                    row.get(0)
                })?;
            out.insert(table, count);
        }
        Ok(out)
    })
}

fn year_range(conn: &Connection, sql: &str) -> Result<Option<(i64, i64)>, StoreError> {
    let (min, max): (Option<i64>, Option<i64>) =
        conn.query_row(sql, [], |row| Ok((row.get(0)?, row.get(1)?)))?;
    match (min, max) {
        (Some(min), Some(max)) => Ok(Some((min, max))),
        _ => Ok(None),
    }
}
