use std::collections::BTreeSet;
use std::time::Instant;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::state::{SecurityCheck, ValidationReport, ValidationWarning};

pub const CHECK_TENANT_FILTER: &str = "Tenant Filter";
pub const CHECK_SINGLE_TENANT: &str = "Single Tenant";
pub const CHECK_READ_ONLY: &str = "Read-Only";

const DESTRUCTIVE_KEYWORDS: [&str; 9] = [
    "DROP", "DELETE", "UPDATE", "INSERT", "ALTER", "TRUNCATE", "CREATE", "GRANT", "REVOKE",
];

/// How tenant rows are scoped in a dataset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationMethod {
    /// The tenant comparison must sit inside a WHERE/AND predicate.
    #[default]
    RowLevel,
    /// The comparison may appear anywhere, e.g. reached through join clauses.
    Hierarchy,
}

/// Per-dataset tenancy rules the validator enforces.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TenancyConfig {
    pub filter_column: String,
    #[serde(default)]
    pub method: IsolationMethod,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Default for TenancyConfig {
    fn default() -> Self {
        Self {
            filter_column: "client_id".to_string(),
            method: IsolationMethod::RowLevel,
            enabled: true,
        }
    }
}

/// Regex/string-pattern validator gating every generated query before
/// execution. A deliberate approximation, not a SQL parser: the warnings
/// surface the seams (subqueries, UNION) a parser would close.
pub struct SqlGuard {
    config: TenancyConfig,
    filter_eq: Regex,
    filter_in: Regex,
    where_token: Regex,
    and_token: Regex,
    trailing_clause: Regex,
}

impl SqlGuard {
    pub fn new(config: TenancyConfig) -> Result<Self, regex::Error> {
        let col = regex::escape(&config.filter_column);
        Ok(Self {
            filter_eq: Regex::new(&format!(r"(?i)\b{col}\s*=\s*(\d+)"))?,
            filter_in: Regex::new(&format!(r"(?i)\b{col}\s+in\s*\([^)]*\)"))?,
            where_token: Regex::new(r"(?i)\bwhere\b")?,
            and_token: Regex::new(r"(?i)\band\b")?,
            trailing_clause: Regex::new(r"(?i)\b(group\s+by|order\s+by|limit)\b")?,
            config,
        })
    }

    pub fn config(&self) -> &TenancyConfig {
        &self.config
    }

    /// Run all checks against `sql` for the expected tenant. Overall `passed`
    /// holds iff every check passed; warnings are informational only.
    pub fn validate(&self, sql: &str, tenant_id: i64) -> ValidationReport {
        let started = Instant::now();
        let normalized = sql.split_whitespace().collect::<Vec<_>>().join(" ");
        let upper = normalized.to_uppercase();

        let mut checks = Vec::new();

        if self.config.enabled {
            let matches = self.tenant_comparisons(&normalized);
            checks.push(self.check_tenant_filter(&normalized, &matches, tenant_id));
            checks.push(self.check_single_tenant(&normalized, &matches, tenant_id));
        }
        checks.push(self.check_read_only(&upper));

        let passed = checks.iter().all(|c| c.passed);
        let warnings = self.collect_warnings(&upper);

        if !passed {
            let failed: Vec<&str> =
                checks.iter().filter(|c| !c.passed).map(|c| c.name.as_str()).collect();
            warn!(tenant_id, failed = ?failed, "sql validation failed");
        }

        ValidationReport { passed, checks, warnings, elapsed: started.elapsed() }
    }

    /// Textual safety net for SQL missing the tenant filter: inject a WHERE
    /// clause, or fold the filter into an existing one. Logged at warn so the
    /// persisted log sink records the upstream prompting defect. Callers must
    /// re-validate the repaired SQL before accepting it.
    pub fn repair_sql(&self, sql: &str, tenant_id: i64) -> String {
        let col = &self.config.filter_column;
        warn!(
            tenant_id,
            filter_column = %col,
            "auto-repairing generated SQL missing tenant filter"
        );

        let trimmed = sql.trim_end();
        let (body, semicolon) = match trimmed.strip_suffix(';') {
            Some(b) => (b.trim_end(), ";"),
            None => (trimmed, ""),
        };

        if let Some(m) = self.where_token.find(body) {
            // Existing WHERE: parenthesize its predicate and append the filter.
            let pred_start = m.end();
            let pred_end = self
                .trailing_clause
                .find(&body[pred_start..])
                .map(|t| pred_start + t.start())
                .unwrap_or(body.len());
            let predicate = body[pred_start..pred_end].trim();
            let head = &body[..m.end()];
            let tail = body[pred_end..].trim();
            let mut repaired = format!("{head} ({predicate}) AND {col} = {tenant_id}");
            if !tail.is_empty() {
                repaired.push(' ');
                repaired.push_str(tail);
            }
            repaired.push_str(semicolon);
            return repaired;
        }

        let clause = format!("WHERE {col} = {tenant_id}");
        match self.trailing_clause.find(body) {
            Some(t) => {
                let head = body[..t.start()].trim_end();
                format!("{head} {clause} {}{semicolon}", &body[t.start()..])
            }
            None => format!("{body} {clause}{semicolon}"),
        }
    }

    /// All `<column> = <literal>` comparisons with their byte spans.
    fn tenant_comparisons(&self, sql: &str) -> Vec<(usize, usize, i64)> {
        self.filter_eq
            .captures_iter(sql)
            .filter_map(|c| {
                let m = c.get(0)?;
                let id = c.get(1)?.as_str().parse::<i64>().ok()?;
                Some((m.start(), m.end(), id))
            })
            .collect()
    }

    fn in_scope(&self, sql: &str, start: usize, end: usize) -> bool {
        match self.config.method {
            IsolationMethod::Hierarchy => true,
            IsolationMethod::RowLevel => {
                let before = &sql[..start];
                let after = &sql[end..];
                self.where_token.is_match(before)
                    || self.and_token.is_match(before)
                    || self.where_token.is_match(after)
            }
        }
    }

    fn check_tenant_filter(
        &self,
        sql: &str,
        matches: &[(usize, usize, i64)],
        tenant_id: i64,
    ) -> SecurityCheck {
        let col = &self.config.filter_column;
        let found = matches
            .iter()
            .any(|&(start, end, id)| id == tenant_id && self.in_scope(sql, start, end));

        if found {
            SecurityCheck {
                name: CHECK_TENANT_FILTER.to_string(),
                passed: true,
                message: format!("Query correctly filters by {col} = {tenant_id}"),
            }
        } else {
            SecurityCheck {
                name: CHECK_TENANT_FILTER.to_string(),
                passed: false,
                message: format!("Missing WHERE {col} = {tenant_id} filter"),
            }
        }
    }

    fn check_single_tenant(
        &self,
        sql: &str,
        matches: &[(usize, usize, i64)],
        tenant_id: i64,
    ) -> SecurityCheck {
        let col = &self.config.filter_column;
        let name = CHECK_SINGLE_TENANT.to_string();
        let ids: Vec<i64> = matches.iter().map(|&(_, _, id)| id).collect();
        let distinct: BTreeSet<i64> = ids.iter().copied().collect();

        if self.filter_in.is_match(sql) {
            SecurityCheck {
                name,
                passed: false,
                message: format!("Query uses IN clause on {col} - data isolation violated"),
            }
        } else if distinct.len() > 1 {
            SecurityCheck {
                name,
                passed: false,
                message: format!("Query references multiple tenant ids: {distinct:?}"),
            }
        } else if ids.first().is_some_and(|&first| first != tenant_id) {
            SecurityCheck {
                name,
                passed: false,
                message: format!(
                    "Query filters by {col} = {} but expected {tenant_id}",
                    ids[0]
                ),
            }
        } else {
            SecurityCheck {
                name,
                passed: true,
                message: "Query correctly references only one tenant".to_string(),
            }
        }
    }

    fn check_read_only(&self, upper: &str) -> SecurityCheck {
        let tokens: BTreeSet<&str> = upper
            .split(|c: char| !c.is_ascii_alphanumeric() && c != '_')
            .filter(|t| !t.is_empty())
            .collect();
        let found = DESTRUCTIVE_KEYWORDS.iter().find(|kw| tokens.contains(**kw));

        match found {
            Some(kw) => SecurityCheck {
                name: CHECK_READ_ONLY.to_string(),
                passed: false,
                message: format!("Destructive keyword detected: {kw}. Only SELECT queries allowed."),
            },
            None => SecurityCheck {
                name: CHECK_READ_ONLY.to_string(),
                passed: true,
                message: "Query is read-only (SELECT only)".to_string(),
            },
        }
    }

    fn collect_warnings(&self, upper: &str) -> Vec<ValidationWarning> {
        let col = &self.config.filter_column;
        let mut warnings = Vec::new();

        let where_count = upper.matches("WHERE").count();
        if where_count > 1 {
            warnings.push(ValidationWarning {
                kind: "MULTIPLE_WHERE".to_string(),
                message: format!(
                    "Multiple WHERE clauses detected ({where_count}) - verify JOIN logic includes {col} filtering"
                ),
            });
        }

        if upper.matches("SELECT").count() > 1 {
            warnings.push(ValidationWarning {
                kind: "SUBQUERY".to_string(),
                message: format!("Subquery detected - ensure all subqueries filter by {col}"),
            });
        }

        if upper.contains("UNION") {
            warnings.push(ValidationWarning {
                kind: "UNION".to_string(),
                message: format!("UNION detected - verify both queries filter by {col}"),
            });
        }

        warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard() -> SqlGuard {
        SqlGuard::new(TenancyConfig::default()).unwrap()
    }

    fn hierarchy_guard() -> SqlGuard {
        SqlGuard::new(TenancyConfig {
            filter_column: "client_id".into(),
            method: IsolationMethod::Hierarchy,
            enabled: true,
        })
        .unwrap()
    }

    fn check(report: &ValidationReport, name: &str) -> bool {
        report.checks.iter().find(|c| c.name == name).map(|c| c.passed).unwrap()
    }

    // --- Tenant filter ---

    #[test]
    fn valid_select_with_filter_passes() {
        let report = guard().validate("SELECT * FROM products WHERE client_id = 5", 5);
        assert!(report.passed);
        assert!(check(&report, CHECK_TENANT_FILTER));
        assert!(check(&report, CHECK_SINGLE_TENANT));
        assert!(check(&report, CHECK_READ_ONLY));
    }

    #[test]
    fn valid_join_with_aliased_filter_passes() {
        let sql = "SELECT p.product_name, SUM(s.revenue) FROM sales s \
                   JOIN products p ON s.product_id = p.product_id \
                   WHERE s.client_id = 5 GROUP BY p.product_name";
        let report = guard().validate(sql, 5);
        assert!(report.passed, "failed checks: {:?}", report.failed_check_names());
    }

    #[test]
    fn missing_filter_fails() {
        let report = guard().validate("SELECT * FROM products", 5);
        assert!(!report.passed);
        assert!(!check(&report, CHECK_TENANT_FILTER));
        assert_eq!(report.failed_check_names(), vec![CHECK_TENANT_FILTER]);
    }

    #[test]
    fn filter_after_and_passes() {
        let sql = "SELECT * FROM sales WHERE region = 'South' AND client_id = 5";
        let report = guard().validate(sql, 5);
        assert!(report.passed);
    }

    #[test]
    fn filter_in_subquery_before_outer_where_passes() {
        let sql = "SELECT * FROM (SELECT * FROM sales WHERE client_id = 5) WHERE revenue > 10";
        let report = guard().validate(sql, 5);
        assert!(check(&report, CHECK_TENANT_FILTER));
    }

    #[test]
    fn multiline_sql_is_normalized_before_matching() {
        let sql = "SELECT *\nFROM sales\nWHERE\n  client_id\n  =\n  5";
        let report = guard().validate(sql, 5);
        assert!(report.passed);
    }

    // --- Single tenant ---

    #[test]
    fn wrong_tenant_fails_both_filter_checks() {
        let report = guard().validate("SELECT * FROM products WHERE client_id = 3", 5);
        assert!(!report.passed);
        assert!(!check(&report, CHECK_TENANT_FILTER));
        assert!(!check(&report, CHECK_SINGLE_TENANT));
    }

    #[test]
    fn in_clause_fails_single_tenant() {
        let report = guard().validate("SELECT * FROM products WHERE client_id IN (1,2,3)", 1);
        assert!(!report.passed);
        assert!(!check(&report, CHECK_SINGLE_TENANT));
    }

    #[test]
    fn two_distinct_tenants_fail() {
        let sql = "SELECT * FROM sales WHERE client_id = 5 OR client_id = 6";
        let report = guard().validate(sql, 5);
        assert!(!check(&report, CHECK_SINGLE_TENANT));
        let msg = &report.checks.iter().find(|c| c.name == CHECK_SINGLE_TENANT).unwrap().message;
        assert!(msg.contains("multiple tenant ids"), "got: {msg}");
    }

    #[test]
    fn repeated_same_tenant_is_fine() {
        let sql = "SELECT * FROM sales s JOIN products p ON s.client_id = p.client_id \
                   WHERE s.client_id = 5 AND p.client_id = 5";
        let report = guard().validate(sql, 5);
        assert!(report.passed, "failed checks: {:?}", report.failed_check_names());
    }

    // --- Read-only ---

    #[test]
    fn destructive_statements_fail() {
        for sql in [
            "DELETE FROM products WHERE client_id = 5",
            "UPDATE products SET price = 100 WHERE client_id = 5",
            "DROP TABLE products",
            "INSERT INTO products VALUES (1)",
            "TRUNCATE TABLE sales",
        ] {
            let report = guard().validate(sql, 5);
            assert!(!check(&report, CHECK_READ_ONLY), "should fail read-only: {sql}");
        }
    }

    #[test]
    fn keyword_inside_identifier_is_not_destructive() {
        let sql = "SELECT updated_at, created_by FROM sales WHERE client_id = 5";
        let report = guard().validate(sql, 5);
        assert!(check(&report, CHECK_READ_ONLY));
    }

    // --- Warnings ---

    #[test]
    fn subquery_warns_but_does_not_fail() {
        let sql = "SELECT * FROM sales WHERE client_id = 5 \
                   AND revenue > (SELECT AVG(revenue) FROM sales WHERE client_id = 5)";
        let report = guard().validate(sql, 5);
        assert!(report.passed);
        assert!(report.warnings.iter().any(|w| w.kind == "SUBQUERY"));
        assert!(report.warnings.iter().any(|w| w.kind == "MULTIPLE_WHERE"));
    }

    #[test]
    fn union_warns() {
        let sql = "SELECT region FROM sales WHERE client_id = 5 \
                   UNION SELECT region FROM sales WHERE client_id = 5";
        let report = guard().validate(sql, 5);
        assert!(report.warnings.iter().any(|w| w.kind == "UNION"));
    }

    // --- Isolation methods ---

    #[test]
    fn row_level_rejects_filter_outside_predicates() {
        let sql = "SELECT * FROM sales s JOIN clients c ON c.client_id = 7";
        let report = guard().validate(sql, 7);
        assert!(!check(&report, CHECK_TENANT_FILTER));
    }

    #[test]
    fn hierarchy_accepts_filter_anywhere() {
        let sql = "SELECT * FROM sales s JOIN clients c ON c.client_id = 7";
        let report = hierarchy_guard().validate(sql, 7);
        assert!(check(&report, CHECK_TENANT_FILTER));
    }

    #[test]
    fn disabled_tenancy_only_checks_read_only() {
        let guard = SqlGuard::new(TenancyConfig {
            filter_column: "client_id".into(),
            method: IsolationMethod::RowLevel,
            enabled: false,
        })
        .unwrap();
        let report = guard.validate("SELECT * FROM reference_data", 5);
        assert!(report.passed);
        assert_eq!(report.checks.len(), 1);
        assert_eq!(report.checks[0].name, CHECK_READ_ONLY);
    }

    #[test]
    fn custom_filter_column() {
        let guard = SqlGuard::new(TenancyConfig {
            filter_column: "tenant_id".into(),
            method: IsolationMethod::RowLevel,
            enabled: true,
        })
        .unwrap();
        let report = guard.validate("SELECT * FROM events WHERE tenant_id = 9", 9);
        assert!(report.passed);
        let report = guard.validate("SELECT * FROM events WHERE client_id = 9", 9);
        assert!(!report.passed);
    }

    // --- Repair ---

    #[test]
    fn repair_appends_where_when_missing() {
        let guard = guard();
        let repaired = guard.repair_sql("SELECT * FROM products", 5);
        assert_eq!(repaired, "SELECT * FROM products WHERE client_id = 5");
        assert!(guard.validate(&repaired, 5).passed);
    }

    #[test]
    fn repair_injects_before_trailing_group_by() {
        let guard = guard();
        let repaired =
            guard.repair_sql("SELECT region, SUM(revenue) FROM sales GROUP BY region", 5);
        assert_eq!(
            repaired,
            "SELECT region, SUM(revenue) FROM sales WHERE client_id = 5 GROUP BY region"
        );
        assert!(guard.validate(&repaired, 5).passed);
    }

    #[test]
    fn repair_folds_into_existing_where() {
        let guard = guard();
        let repaired = guard.repair_sql("SELECT * FROM sales WHERE region = 'South'", 5);
        assert_eq!(repaired, "SELECT * FROM sales WHERE (region = 'South') AND client_id = 5");
        assert!(guard.validate(&repaired, 5).passed);
    }

    #[test]
    fn repair_parenthesizes_or_predicates() {
        let guard = guard();
        let repaired =
            guard.repair_sql("SELECT * FROM sales WHERE region = 'South' OR region = 'North'", 5);
        assert_eq!(
            repaired,
            "SELECT * FROM sales WHERE (region = 'South' OR region = 'North') AND client_id = 5"
        );
        assert!(guard.validate(&repaired, 5).passed);
    }

    #[test]
    fn repair_keeps_clauses_after_where() {
        let guard = guard();
        let repaired = guard
            .repair_sql("SELECT * FROM sales WHERE revenue > 10 ORDER BY revenue DESC LIMIT 5", 5);
        assert_eq!(
            repaired,
            "SELECT * FROM sales WHERE (revenue > 10) AND client_id = 5 ORDER BY revenue DESC LIMIT 5"
        );
        assert!(guard.validate(&repaired, 5).passed);
    }

    #[test]
    fn repair_preserves_trailing_semicolon() {
        let guard = guard();
        let repaired = guard.repair_sql("SELECT * FROM products;", 5);
        assert_eq!(repaired, "SELECT * FROM products WHERE client_id = 5;");
    }
}
