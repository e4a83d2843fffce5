//! Domain models shared by the stores, the feature slices and the upload worker

pub mod asset;

pub use asset::{AssetRecord, AssetUpdate, NewAssetRecord, UploadStatus};
