//! Asset write operations

pub mod delete;
pub mod delete_batch;
pub mod update;
pub mod upload;
pub mod upload_batch;

pub use delete_batch::DeleteBatchCommand;
pub use update::{UpdateAssetCommand, UpdateAssetError};
pub use upload::UploadOutcome;
pub use upload_batch::{BatchUploadItem, UploadBatchCommand};
