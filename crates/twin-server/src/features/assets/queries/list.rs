//! List the assets of one collection that the caller may see

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::{is_visible, Caller};
use crate::error::{AppError, AppResult};
use crate::features::assets::{types::AssetView, AssetManager};

/// Upper bound on `limit`.
pub const MAX_LIST_LIMIT: i64 = 1000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListAssetsQuery {
    /// Inclusive lower bound on the creation date (RFC 3339)
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    /// Inclusive upper bound on the creation date (RFC 3339)
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub limit: Option<i64>,
}

impl ListAssetsQuery {
    pub fn validate(&self) -> AppResult<Option<i64>> {
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err(AppError::BadRequest(
                    "start_date must not be after end_date".to_string(),
                ));
            }
        }

        match self.limit {
            Some(limit) if limit < 1 => {
                Err(AppError::BadRequest("limit must be at least 1".to_string()))
            },
            Some(limit) => Ok(Some(limit.min(MAX_LIST_LIMIT))),
            None => Ok(None),
        }
    }
}

#[tracing::instrument(skip(manager, caller), fields(manager = %manager.name()))]
pub async fn handle(
    manager: &AssetManager,
    caller: &Caller,
    query: ListAssetsQuery,
) -> AppResult<Vec<AssetView>> {
    let limit = query.validate()?;

    let records = manager
        .metadata()
        .get_by_date_range(manager.name(), query.start_date, query.end_date, limit)
        .await?;

    let total = records.len();
    let visible: Vec<AssetView> = records
        .into_iter()
        .filter(|record| is_visible(caller, record))
        .map(|record| manager.format(record))
        .collect();

    tracing::debug!(total, visible = visible.len(), "Assets listed");
    Ok(visible)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_limit_clamped() {
        let query = ListAssetsQuery {
            limit: Some(50_000),
            ..Default::default()
        };
        assert_eq!(query.validate().unwrap(), Some(MAX_LIST_LIMIT));
    }

    #[test]
    fn test_invalid_ranges() {
        let zero = ListAssetsQuery {
            limit: Some(0),
            ..Default::default()
        };
        assert!(zero.validate().is_err());

        let now = Utc::now();
        let inverted = ListAssetsQuery {
            start_date: Some(now),
            end_date: Some(now - Duration::days(1)),
            limit: None,
        };
        assert!(inverted.validate().is_err());
    }
}
