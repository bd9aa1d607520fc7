pub mod cleanup;
pub mod copy;
pub mod credentials;
pub mod manifest;
pub mod mode;
pub mod task;

pub use cleanup::CleanupPolicy;
pub use copy::{ColumnMapping, CopyFormat, CopyOptions, Encoding};
pub use credentials::CopyCredentials;
pub use manifest::{Manifest, ManifestEntry, ManifestRef};
pub use mode::LoadMode;
pub use task::{RunState, TaskHandle, UploadState};
