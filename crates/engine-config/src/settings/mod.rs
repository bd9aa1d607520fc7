pub mod builder;
pub mod validated;

pub use builder::{LoaderSettingsBuilder, RetrySettings};
pub use validated::LoaderSettings;

pub const DEFAULT_ID_COLUMN: &str = "id";
pub const DEFAULT_FILE_PREFIX: &str = "redload/unnamed";
