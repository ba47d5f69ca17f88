//! Shared fixtures: an engine over a temp-file sales catalog, driven by a
//! scripted mock model.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use scribe_core::ids::RunId;
use scribe_core::TenancyConfig;
use scribe_engine::{Engine, EngineConfig};
use scribe_llm::{MockLlm, MockReply};
use scribe_store::{
    DatasetCatalog, DatasetConfig, SchemaKind, SessionStore, SessionStoreConfig,
};

use crate::server::AppState;

fn sales_config(dir: &Path) -> DatasetConfig {
    let mut key_dimensions = BTreeMap::new();
    key_dimensions.insert(
        "products".to_string(),
        vec!["product_name".to_string(), "category".to_string()],
    );

    DatasetConfig {
        id: "sales".to_string(),
        name: "Sales Transactions".to_string(),
        description: "Transactional sales data".to_string(),
        db_path: dir.join("sales.db"),
        schema_type: SchemaKind::Transactional,
        fact_tables: vec!["sales".to_string()],
        dimension_tables: vec!["products".to_string(), "regions".to_string()],
        key_dimensions,
        metrics: vec!["revenue".to_string(), "quantity".to_string()],
        time_field: Some("date".to_string()),
        tenancy: TenancyConfig::default(),
        sample_queries: Vec::new(),
    }
}

/// Application state backed by a seeded sales dataset and the given
/// scripted replies.
pub(crate) fn test_state(replies: Vec<MockReply>) -> (AppState, Arc<MockLlm>) {
    let dir = std::env::temp_dir().join(format!("scribe-server-{}", RunId::new()));
    std::fs::create_dir_all(&dir).unwrap();

    let catalog = DatasetCatalog::open(vec![sales_config(&dir)]).unwrap();
    let dataset = catalog.get(Some("sales")).unwrap();
    dataset
        .db()
        .with_conn(|conn| {
            conn.execute_batch(
                "CREATE TABLE sales (
                     sale_id INTEGER PRIMARY KEY,
                     client_id INTEGER,
                     product TEXT,
                     region TEXT,
                     revenue REAL,
                     quantity_sold INTEGER,
                     date TEXT
                 );
                 CREATE TABLE products (
                     product_id INTEGER PRIMARY KEY,
                     product_name TEXT,
                     category TEXT,
                     price REAL
                 );
                 CREATE TABLE regions (
                     region_id INTEGER PRIMARY KEY,
                     region TEXT
                 );
                 INSERT INTO sales VALUES
                     (1, 5, 'Laptop', 'South', 1200.0, 3, '2024-10-05'),
                     (2, 5, 'Monitor', 'North', 450.0, 5, '2024-11-12'),
                     (3, 5, 'Desk', 'South', 800.0, 2, '2024-12-01'),
                     (4, 7, 'Laptop', 'East', 2400.0, 6, '2024-10-20');
                 INSERT INTO products VALUES
                     (1, 'Laptop', 'Electronics', 1200.0),
                     (2, 'Monitor', 'Electronics', 450.0),
                     (3, 'Desk', 'Furniture', 800.0);
                 INSERT INTO regions VALUES
                     (1, 'South'), (2, 'North'), (3, 'East'), (4, 'West');",
            )?;
            Ok(())
        })
        .unwrap();

    let sessions = Arc::new(SessionStore::new(SessionStoreConfig::default()));
    let mock = Arc::new(MockLlm::new(replies));
    let engine = Engine::new(
        mock.clone(),
        Arc::new(catalog),
        sessions,
        EngineConfig::default(),
    )
    .unwrap();

    let state = AppState {
        engine: Arc::new(engine),
        metrics: None,
    };
    (state, mock)
}
