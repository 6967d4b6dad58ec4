use thiserror::Error;

pub mod app_config;
pub mod audit;
pub mod categories;
pub mod channel;
pub mod config;
pub mod pricing;
pub mod products;

pub use app_config::{AppConfig, Environment};
pub use audit::{record as record_audit, AuditSink, FileAuditLog, MemoryAuditLog};
pub use categories::{
    normalize_category_name, CategoryCandidate, PlatformCategoryNode, ROOT_PARENT_ID,
};
pub use channel::{Channel, SyncStatus};
pub use config::{load_app_config, load_app_config_from_env};
pub use pricing::{effective_price, PriceAdjustment, PriceChange};
pub use products::{
    link_summary, ChannelLink, ChannelState, ChannelStates, MasterProduct, ProductCandidate,
    NEW_RECORD_MESSAGE,
};

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown channel: {0}")]
    UnknownChannel(String),

    #[error("unknown sync status: {0}")]
    UnknownSyncStatus(String),

    #[error("product candidate has an empty barcode")]
    EmptyBarcode,

    #[error("invalid price expression: {0}")]
    InvalidPriceExpression(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for environment variable {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}
