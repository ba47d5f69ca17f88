//! Shared fixtures: a temp-file catalog seeded with sales rows for two
//! tenants, plus tool-context helpers.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use scribe_core::ids::{RunId, SessionId};
use scribe_core::security::TenancyConfig;
use scribe_core::tools::ToolContext;
use scribe_store::{DatasetCatalog, DatasetConfig, SchemaKind};

pub(crate) const TEST_TENANT: i64 = 5;

pub(crate) fn ctx() -> ToolContext {
    ToolContext {
        session_id: SessionId::new(),
        tenant_id: TEST_TENANT,
        dataset_id: "sales".to_string(),
    }
}

fn sales_config(dir: &std::path::Path) -> DatasetConfig {
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

/// One transactional sales dataset with rows for tenants 5 and 7.
pub(crate) fn temp_catalog() -> (PathBuf, Arc<DatasetCatalog>) {
    let dir = std::env::temp_dir().join(format!("scribe-engine-{}", RunId::new()));
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

    (dir, Arc::new(catalog))
}
