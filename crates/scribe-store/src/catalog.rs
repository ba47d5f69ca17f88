use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use scribe_core::{IsolationMethod, TenancyConfig};

use crate::database::Database;
use crate::error::StoreError;

pub const DEFAULT_DATASET: &str = "sales";

/// Broad shape of a dataset's schema.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaKind {
    Transactional,
    Dimensional,
}

/// Static description of one queryable dataset.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatasetConfig {
    pub id: String,
    pub name: String,
    pub description: String,
    pub db_path: PathBuf,
    pub schema_type: SchemaKind,
    pub fact_tables: Vec<String>,
    pub dimension_tables: Vec<String>,
    /// Descriptive columns per dimension table, used to enrich the
    /// clarification vocabulary.
    #[serde(default)]
    pub key_dimensions: BTreeMap<String, Vec<String>>,
    pub metrics: Vec<String>,
    pub time_field: Option<String>,
    #[serde(default)]
    pub tenancy: TenancyConfig,
    #[serde(default)]
    pub sample_queries: Vec<String>,
}

/// Summary served from the dataset listing endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub id: String,
    pub name: String,
    pub description: String,
    pub schema_type: SchemaKind,
    pub fact_tables: Vec<String>,
    pub sample_queries: Vec<String>,
}

/// A dataset with its database handle, opened once at catalog load.
#[derive(Debug)]
pub struct Dataset {
    config: DatasetConfig,
    db: Database,
}

impl Dataset {
    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn summary(&self) -> DatasetSummary {
        DatasetSummary {
            id: self.config.id.clone(),
            name: self.config.name.clone(),
            description: self.config.description.clone(),
            schema_type: self.config.schema_type,
            fact_tables: self.config.fact_tables.clone(),
            sample_queries: self.config.sample_queries.iter().take(3).cloned().collect(),
        }
    }
}

/// All datasets the service can query. The first configured dataset is the
/// default for requests that do not name one.
pub struct DatasetCatalog {
    datasets: HashMap<String, Arc<Dataset>>,
    order: Vec<String>,
}

impl DatasetCatalog {
    /// Open every configured dataset's database.
    pub fn open(configs: Vec<DatasetConfig>) -> Result<Self, StoreError> {
        if configs.is_empty() {
            return Err(StoreError::NotFound("no datasets configured".to_string()));
        }

        let mut datasets = HashMap::new();
        let mut order = Vec::new();
        for config in configs {
            let db = Database::open(&config.db_path)?;
            info!(dataset = %config.id, path = %config.db_path.display(), "dataset opened");
            order.push(config.id.clone());
            datasets.insert(config.id.clone(), Arc::new(Dataset { config, db }));
        }

        Ok(Self { datasets, order })
    }

    /// Look up a dataset; `None` resolves to the default.
    pub fn get(&self, dataset_id: Option<&str>) -> Result<Arc<Dataset>, StoreError> {
        let id = dataset_id.unwrap_or_else(|| self.default_id());
        self.datasets.get(id).cloned().ok_or_else(|| {
            StoreError::NotFound(format!(
                "Dataset '{id}' not found. Available: {:?}",
                self.ids()
            ))
        })
    }

    pub fn default_id(&self) -> &str {
        &self.order[0]
    }

    pub fn contains(&self, dataset_id: &str) -> bool {
        self.datasets.contains_key(dataset_id)
    }

    /// Dataset ids in configuration order.
    pub fn ids(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Summaries in configuration order, sample queries truncated to three.
    pub fn list(&self) -> Vec<DatasetSummary> {
        self.order
            .iter()
            .filter_map(|id| self.datasets.get(id))
            .map(|ds| ds.summary())
            .collect()
    }
}

/// The stock catalog: transactional sales data plus dimensional market-size
/// analytics, both isolated on `client_id`.
pub fn builtin_configs(data_dir: &Path) -> Vec<DatasetConfig> {
    vec![
        DatasetConfig {
            id: "sales".to_string(),
            name: "Sales Transactions".to_string(),
            description: "Transaction-level sales data with products, regions, and clients"
                .to_string(),
            db_path: data_dir.join("sales.db"),
            schema_type: SchemaKind::Transactional,
            fact_tables: vec!["sales".to_string()],
            dimension_tables: vec![
                "products".to_string(),
                "regions".to_string(),
                "clients".to_string(),
                "customer_segments".to_string(),
            ],
            key_dimensions: BTreeMap::from([
                (
                    "products".to_string(),
                    vec!["product_name".into(), "category".into(), "price".into(), "brand".into()],
                ),
                ("regions".to_string(), vec!["region".into()]),
                (
                    "clients".to_string(),
                    vec!["client_name".into(), "industry".into(), "region".into()],
                ),
                (
                    "customer_segments".to_string(),
                    vec!["segment_name".into(), "description".into()],
                ),
            ]),
            metrics: vec!["revenue".to_string(), "quantity".to_string(), "profit_margin".to_string()],
            time_field: Some("date".to_string()),
            tenancy: TenancyConfig {
                filter_column: "client_id".to_string(),
                method: IsolationMethod::RowLevel,
                enabled: true,
            },
            sample_queries: vec![
                "Top 5 products by revenue".to_string(),
                "Sales by region for client Walmart".to_string(),
                "Revenue trends for Q4 2024".to_string(),
                "Products in Electronics category".to_string(),
            ],
        },
        DatasetConfig {
            id: "market_size".to_string(),
            name: "Market Size Analytics".to_string(),
            description:
                "Market size data (value & volume) with forecasts across geographies and segments"
                    .to_string(),
            db_path: data_dir.join("market_size.db"),
            schema_type: SchemaKind::Dimensional,
            fact_tables: vec!["fact_market_size".to_string(), "fact_forecasts".to_string()],
            dimension_tables: vec![
                "dim_markets".to_string(),
                "dim_geography".to_string(),
                "dim_time".to_string(),
                "dim_currency".to_string(),
                "dim_segment_types".to_string(),
                "dim_segment_values".to_string(),
            ],
            key_dimensions: BTreeMap::from([
                (
                    "dim_markets".to_string(),
                    vec!["market_name".into(), "naics_code".into()],
                ),
                (
                    "dim_geography".to_string(),
                    vec!["country".into(), "region".into(), "country_code".into()],
                ),
                (
                    "dim_time".to_string(),
                    vec!["year".into(), "quarter".into(), "year_quarter".into()],
                ),
                (
                    "dim_currency".to_string(),
                    vec!["currency_code".into(), "currency_type".into()],
                ),
                ("dim_segment_types".to_string(), vec!["segment_name".into()]),
                (
                    "dim_segment_values".to_string(),
                    vec!["value_name".into(), "description".into()],
                ),
            ]),
            metrics: vec![
                "market_value_usd_m".to_string(),
                "market_volume_units".to_string(),
                "forecast_value_usd_m".to_string(),
                "cagr".to_string(),
            ],
            time_field: Some("year".to_string()),
            tenancy: TenancyConfig {
                filter_column: "client_id".to_string(),
                method: IsolationMethod::Hierarchy,
                enabled: true,
            },
            sample_queries: vec![
                "Top 5 markets by value globally in 2023".to_string(),
                "Electric vehicles market size trends from 2020 to 2024".to_string(),
                "Compare EV market value across USA, China, Germany".to_string(),
                "Forecast for automotive market in 2025".to_string(),
                "Show market volume by region".to_string(),
            ],
        },
    ]
}

/// Load dataset configs from a JSON file. Relative db paths resolve against
/// the config file's directory.
pub fn load_configs(path: &Path) -> Result<Vec<DatasetConfig>, StoreError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| StoreError::Io(format!("read {}: {e}", path.display())))?;
    let mut configs: Vec<DatasetConfig> = serde_json::from_str(&raw)?;

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    for config in &mut configs {
        if config.db_path.is_relative() {
            config.db_path = base.join(&config.db_path);
        }
    }
    Ok(configs)
}
