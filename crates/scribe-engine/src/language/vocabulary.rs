use std::collections::BTreeSet;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{info, warn};

use scribe_store::{table_columns, Dataset};

/// SQLite declared types treated as numeric when mining metric words.
const NUMERIC_TYPES: [&str; 6] = ["INTEGER", "REAL", "NUMERIC", "DECIMAL", "FLOAT", "DOUBLE"];

/// Unit/key suffixes stripped from column names before tokenizing.
const COLUMN_SUFFIXES: [&str; 7] = ["_id", "_usd", "_m", "_k", "_pct", "_percent", "_flag"];

/// Words users say that mean "the data" regardless of schema.
const GENERIC_ENTITIES: [&str; 4] = ["data", "records", "report", "reports"];

/// Keyword sets the language heuristics match against, derived once per
/// dataset from its live schema rather than hard-coded:
/// table-name tokens become entity words (with naive plural forms), numeric
/// column tokens become metric words, and column tokens of the configured
/// dimension tables become dimension words.
#[derive(Clone, Debug, PartialEq)]
pub struct Vocabulary {
    pub entities: Vec<String>,
    pub metrics: Vec<String>,
    pub dimensions: Vec<String>,
}

impl Vocabulary {
    pub fn has_entity(&self, text: &str) -> bool {
        self.entities.iter().any(|w| text.contains(w.as_str()))
    }

    pub fn has_metric(&self, text: &str) -> bool {
        self.metrics.iter().any(|w| text.contains(w.as_str()))
    }

    /// Like [`Self::has_metric`], but ignores metric words that are also
    /// entity words. Key columns ("product_id") put their entity token into
    /// the metric set, and mentioning an entity is not the same as naming a
    /// measure.
    pub fn has_measure(&self, text: &str) -> bool {
        self.metrics
            .iter()
            .filter(|w| !self.entities.contains(w))
            .any(|w| text.contains(w.as_str()))
    }

    /// Minimal generic sets for when schema introspection fails.
    pub fn fallback() -> Self {
        let words = |items: &[&str]| items.iter().map(|w| w.to_string()).collect();
        Self {
            entities: words(&["data", "records", "metric", "metrics"]),
            metrics: words(&["value", "count", "total", "amount"]),
            dimensions: words(&["category", "type", "group"]),
        }
    }
}

/// Derive the vocabulary from a dataset's schema. Introspection failures
/// degrade to [`Vocabulary::fallback`] so a broken database file never
/// blocks query handling.
pub fn extract_vocabulary(dataset: &Dataset) -> Vocabulary {
    let config = dataset.config();
    let tables = match table_columns(dataset.db()) {
        Ok(tables) => tables,
        Err(e) => {
            warn!(dataset = %config.id, error = %e, "schema introspection failed, using fallback vocabulary");
            return Vocabulary::fallback();
        }
    };

    let mut entities = BTreeSet::new();
    let mut metrics = BTreeSet::new();
    let mut dimensions = BTreeSet::new();

    for (table, columns) in &tables {
        entity_words(table, &mut entities);

        let is_dimension_table = config
            .dimension_tables
            .iter()
            .any(|t| t.eq_ignore_ascii_case(table));

        for column in columns {
            if is_numeric_type(&column.decl_type) {
                column_words(&column.name, &mut metrics);
            }
            if is_dimension_table {
                column_words(&column.name, &mut dimensions);
            }
        }
    }

    // Configured key dimensions count even when their table is missing from
    // the live schema.
    for columns in config.key_dimensions.values() {
        for column in columns {
            column_words(column, &mut dimensions);
        }
    }

    for generic in GENERIC_ENTITIES {
        entities.insert(generic.to_string());
    }

    info!(
        dataset = %config.id,
        entities = entities.len(),
        metrics = metrics.len(),
        dimensions = dimensions.len(),
        "vocabulary extracted"
    );

    Vocabulary {
        entities: entities.into_iter().collect(),
        metrics: metrics.into_iter().collect(),
        dimensions: dimensions.into_iter().collect(),
    }
}

fn is_numeric_type(decl_type: &str) -> bool {
    let upper = decl_type.to_uppercase();
    NUMERIC_TYPES.iter().any(|t| upper.contains(t))
}

/// Table name -> entity words: strip the fact/dimension prefix, split on
/// underscores, keep words longer than two characters, and add naive
/// singular and plural forms ("products" -> "product", "category" ->
/// "categories").
fn entity_words(table: &str, out: &mut BTreeSet<String>) {
    let lowered = table.to_lowercase();
    let name = lowered
        .strip_prefix("fact_")
        .or_else(|| lowered.strip_prefix("dim_"))
        .unwrap_or(&lowered);

    for word in name.split('_') {
        if word.len() <= 2 {
            continue;
        }
        out.insert(word.to_string());
        if let Some(stem) = word.strip_suffix("ies").filter(|s| s.len() > 1) {
            out.insert(format!("{stem}y"));
        } else if word.ends_with('s') {
            if let Some(stem) = word.strip_suffix('s').filter(|s| !s.ends_with('s')) {
                out.insert(stem.to_string());
            }
        } else {
            out.insert(format!("{word}s"));
            if word.ends_with('y') && word.len() > 3 {
                out.insert(format!("{}ies", &word[..word.len() - 1]));
            }
        }
    }
}

/// Column name -> vocabulary words: strip one unit/key suffix, split on
/// underscores, keep words longer than two characters, and expand the common
/// abbreviation synonyms ("qty" -> quantity/volume, "value" -> revenue/...).
fn column_words(column: &str, out: &mut BTreeSet<String>) {
    let lowered = column.to_lowercase();
    let base = COLUMN_SUFFIXES
        .iter()
        .find_map(|s| lowered.strip_suffix(s))
        .unwrap_or(&lowered);

    let words: Vec<&str> = base.split('_').filter(|part| part.len() > 2).collect();
    for word in &words {
        for synonym in synonyms(word) {
            out.insert(synonym.to_string());
        }
        out.insert(word.to_string());
    }
}

fn synonyms(word: &str) -> &'static [&'static str] {
    match word {
        "value" => &["revenue", "sales", "amount"],
        "qty" => &["quantity", "volume"],
        "amt" => &["amount"],
        "sold" => &["sales"],
        "count" => &["total", "number"],
        _ => &[],
    }
}

/// Process-wide vocabulary cache, keyed by dataset id plus database path so
/// tests reusing an id against different files stay isolated.
pub struct VocabularyCache {
    cache: DashMap<String, Arc<Vocabulary>>,
}

impl VocabularyCache {
    pub fn new() -> Self {
        Self { cache: DashMap::new() }
    }

    pub fn get(&self, dataset: &Dataset) -> Arc<Vocabulary> {
        let key = format!("{}:{}", dataset.config().id, dataset.db().path().display());
        if let Some(found) = self.cache.get(&key) {
            return found.clone();
        }
        let vocabulary = Arc::new(extract_vocabulary(dataset));
        self.cache.entry(key).or_insert(vocabulary).clone()
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

impl Default for VocabularyCache {
    fn default() -> Self {
        Self::new()
    }
}
