use connectors::error::WarehouseError;
use engine_config::error::SettingsError;
use engine_core::error::LoadError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Failed to read input file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Invalid loader settings: {0}")]
    Settings(#[from] SettingsError),

    #[error("Load failed [{code}]: {0}", code = .0.code())]
    Load(#[from] LoadError),

    #[error("Warehouse error: {0}")]
    Warehouse(#[from] WarehouseError),

    #[error("Failed to serialize data to JSON: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    #[error("No warehouse_url in the loader settings")]
    MissingWarehouseUrl,

    #[error("Unexpected error: {0}")]
    Unexpected(String),

    #[error("Shutdown requested")]
    ShutdownRequested,
}
