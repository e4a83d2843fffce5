//! Asset read operations

pub mod get;
pub mod list;
pub mod status;

pub use get::AssetContent;
pub use list::{ListAssetsQuery, MAX_LIST_LIMIT};
