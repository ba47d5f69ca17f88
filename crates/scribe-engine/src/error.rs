use scribe_store::StoreError;

/// Failures that abort a run before the workflow can produce a reply.
///
/// Deliberately small: generation, execution, and validation faults inside
/// the workflow land on the run state instead, so the caller still receives
/// a reply carrying whatever artifacts exist.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("invalid tenancy config for dataset '{dataset}': {source}")]
    InvalidTenancy {
        dataset: String,
        #[source]
        source: regex::Error,
    },
}
