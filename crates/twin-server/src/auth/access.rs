//! Per-record access rules
//!
//! | caller    | read public | read private   | write                    |
//! |-----------|-------------|----------------|--------------------------|
//! | anonymous | yes         | no (401)       | no (401)                 |
//! | user      | yes         | owner (403)    | owner or ownerless (403) |
//! | admin     | yes         | yes            | yes                      |

use thiserror::Error;

use super::Caller;
use crate::error::AppError;
use crate::models::AssetRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Write,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AccessDenied {
    #[error("Authentication required")]
    Unauthenticated,

    #[error("This asset is private")]
    Private,

    #[error("You can only modify your own assets")]
    NotOwner,
}

impl From<AccessDenied> for AppError {
    fn from(err: AccessDenied) -> Self {
        match err {
            AccessDenied::Unauthenticated => AppError::Unauthorized(err.to_string()),
            AccessDenied::Private | AccessDenied::NotOwner => AppError::Forbidden(err.to_string()),
        }
    }
}

/// Decide whether `caller` may perform `operation` on `record`.
pub fn authorize(
    caller: &Caller,
    record: &AssetRecord,
    operation: Operation,
) -> Result<(), AccessDenied> {
    if operation == Operation::Read && record.is_public {
        return Ok(());
    }

    let user = match caller {
        Caller::Anonymous => return Err(AccessDenied::Unauthenticated),
        Caller::User(user) => user,
    };

    if user.is_admin || record.owner_id == Some(user.id) {
        return Ok(());
    }

    if operation == Operation::Write && record.is_ownerless() {
        return Ok(());
    }

    Err(match operation {
        Operation::Read => AccessDenied::Private,
        Operation::Write => AccessDenied::NotOwner,
    })
}

/// List filter: what `caller` may see.
pub fn is_visible(caller: &Caller, record: &AssetRecord) -> bool {
    authorize(caller, record, Operation::Read).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthenticatedUser;
    use crate::models::NewAssetRecord;
    use chrono::Utc;

    fn record(owner_id: Option<i64>, is_public: bool) -> AssetRecord {
        NewAssetRecord {
            name: "assets".to_string(),
            content_type: "image/png".to_string(),
            filename: "a.png".to_string(),
            description: "d".to_string(),
            source: "https://example.com".to_string(),
            owner_id,
            is_public,
            url: "assets/a.png".to_string(),
            tileset_url: None,
            upload_status: None,
            upload_job_id: None,
            upload_error: None,
            file_count: None,
            date: Utc::now(),
        }
        .into_record(1)
    }

    fn user(id: i64, is_admin: bool) -> Caller {
        Caller::User(AuthenticatedUser {
            id,
            subject: format!("user-{}", id),
            roles: Vec::new(),
            is_admin,
        })
    }

    #[test]
    fn test_public_read_needs_no_identity() {
        assert!(authorize(&Caller::Anonymous, &record(Some(1), true), Operation::Read).is_ok());
    }

    #[test]
    fn test_anonymous_cannot_write_or_read_private() {
        assert_eq!(
            authorize(&Caller::Anonymous, &record(Some(1), true), Operation::Write),
            Err(AccessDenied::Unauthenticated)
        );
        assert_eq!(
            authorize(&Caller::Anonymous, &record(Some(1), false), Operation::Read),
            Err(AccessDenied::Unauthenticated)
        );
    }

    #[test]
    fn test_owner_and_admin() {
        let private = record(Some(1), false);
        assert!(authorize(&user(1, false), &private, Operation::Write).is_ok());
        assert!(authorize(&user(2, true), &private, Operation::Write).is_ok());
        assert_eq!(
            authorize(&user(2, false), &private, Operation::Read),
            Err(AccessDenied::Private)
        );
        assert_eq!(
            authorize(&user(2, false), &record(Some(1), true), Operation::Write),
            Err(AccessDenied::NotOwner)
        );
    }

    #[test]
    fn test_ownerless_records_are_writable_but_stay_private() {
        let legacy = record(None, false);
        assert!(authorize(&user(9, false), &legacy, Operation::Write).is_ok());
        assert_eq!(
            authorize(&user(9, false), &legacy, Operation::Read),
            Err(AccessDenied::Private)
        );
        assert!(!is_visible(&user(9, false), &legacy));
        assert!(is_visible(&user(1, true), &legacy));
        assert!(!is_visible(&Caller::Anonymous, &legacy));
        assert!(is_visible(&user(9, false), &record(None, true)));
    }

    #[test]
    fn test_error_mapping() {
        assert!(matches!(
            AppError::from(AccessDenied::Unauthenticated),
            AppError::Unauthorized(_)
        ));
        assert!(matches!(AppError::from(AccessDenied::NotOwner), AppError::Forbidden(_)));
    }
}
