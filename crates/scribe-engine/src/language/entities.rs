use regex::Regex;
use serde_json::json;
use tracing::debug;

use scribe_core::state::ExtractedEntities;

/// Dimension names worth remembering across turns, checked as substrings of
/// the generated SQL.
const DIMENSION_KEYWORDS: [&str; 6] =
    ["product", "region", "category", "client", "customer", "segment"];

/// Regex-level digest of a generated SQL statement, kept in session history
/// so the resolver can tell follow-ups what the previous turn touched. This
/// is deliberately not a SQL parser; it only needs to be right often enough
/// to make context expansion useful.
pub struct EntityExtractor {
    tenant_column: String,
    metric_re: Regex,
    where_re: Regex,
    tenant_re: Regex,
    category_re: Regex,
    date_re: Regex,
    group_re: Regex,
    group_col_re: Regex,
    limit_re: Regex,
}

impl EntityExtractor {
    pub fn new(tenant_column: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            tenant_column: tenant_column.to_string(),
            metric_re: Regex::new(r"(?i)(SUM|COUNT|AVG|MAX|MIN)\s*\(\s*(?:\w+\.)?(\w+)\s*\)")?,
            where_re: Regex::new(r"(?is)WHERE\s+(.+?)(?:GROUP BY|ORDER BY|LIMIT|$)")?,
            tenant_re: Regex::new(&format!(
                r"(?i)\b{}\s*=\s*(\d+)",
                regex::escape(tenant_column)
            ))?,
            category_re: Regex::new(r#"(?i)category\s*=\s*['"]([^'"]+)['"]"#)?,
            date_re: Regex::new(
                r#"(?i)date\s*>=\s*['"]([\d-]+)['"].*?date\s*<=\s*['"]([\d-]+)['"]"#,
            )?,
            group_re: Regex::new(r"(?i)GROUP BY\s+([\w., ]+?)\s*(?:HAVING|ORDER BY|LIMIT|$)")?,
            group_col_re: Regex::new(r"(?:\w+\.)?(\w+)")?,
            limit_re: Regex::new(r"(?i)LIMIT\s+(\d+)")?,
        })
    }

    pub fn extract(&self, sql: &str) -> ExtractedEntities {
        let mut entities = ExtractedEntities::default();
        if sql.is_empty() {
            return entities;
        }

        let sql_lower = sql.to_lowercase();
        for keyword in DIMENSION_KEYWORDS {
            if sql_lower.contains(keyword) {
                entities.dimensions.push(keyword.to_string());
            }
        }

        for caps in self.metric_re.captures_iter(sql) {
            if let Some(field) = caps.get(2) {
                let field = field.as_str().to_lowercase();
                if field != "id" && !entities.metrics.contains(&field) {
                    entities.metrics.push(field);
                }
            }
        }

        if let Some(where_clause) = self
            .where_re
            .captures(sql)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
        {
            if let Some(caps) = self.tenant_re.captures(where_clause) {
                if let Some(id) = caps.get(1).and_then(|m| m.as_str().parse::<i64>().ok()) {
                    entities.filters.push(json!({ &self.tenant_column: id }));
                }
            }
            if let Some(caps) = self.category_re.captures(where_clause) {
                if let Some(value) = caps.get(1) {
                    entities.filters.push(json!({ "category": value.as_str() }));
                }
            }
            entities.time_period = self.time_period(where_clause);
        }

        if let Some(group_clause) = self
            .group_re
            .captures(sql)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
        {
            entities.grouping = self
                .group_col_re
                .captures_iter(group_clause)
                .filter_map(|caps| caps.get(1))
                .map(|m| m.as_str().to_string())
                .filter(|col| !col.eq_ignore_ascii_case("as"))
                .collect();
        }

        if let Some(caps) = self.limit_re.captures(sql) {
            entities.limit = caps.get(1).and_then(|m| m.as_str().parse().ok());
        }

        debug!(
            dimensions = entities.dimensions.len(),
            metrics = entities.metrics.len(),
            filters = entities.filters.len(),
            "entities extracted from sql"
        );
        entities
    }

    /// Read a time period out of the WHERE clause: an explicit date range
    /// (folded to a quarter when it lines up with one), with relative
    /// date-function offsets taking precedence.
    fn time_period(&self, where_clause: &str) -> String {
        let mut period = "all time".to_string();

        if where_clause.to_lowercase().contains("date >=") {
            if let Some(caps) = self.date_re.captures(where_clause) {
                if let (Some(start), Some(end)) = (caps.get(1), caps.get(2)) {
                    period = infer_period(start.as_str(), end.as_str());
                }
            }
        }

        if where_clause.contains("'-6 months'") || where_clause.contains("'-6 month'") {
            period = "last 6 months".to_string();
        } else if where_clause.contains("'-1 year'") || where_clause.contains("'-12 month'") {
            period = "last year".to_string();
        } else if where_clause.contains("'-1 month'") {
            period = "last month".to_string();
        }
        period
    }
}

fn infer_period(start: &str, end: &str) -> String {
    let year = &start[..start.len().min(4)];
    if start.contains("10-01") && end.contains("12-31") {
        format!("Q4 {year}")
    } else if start.contains("07-01") && end.contains("09-30") {
        format!("Q3 {year}")
    } else if start.contains("04-01") && end.contains("06-30") {
        format!("Q2 {year}")
    } else if start.contains("01-01") && end.contains("03-31") {
        format!("Q1 {year}")
    } else {
        format!("{start} to {end}")
    }
}
