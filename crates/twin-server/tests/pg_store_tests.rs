//! PostgreSQL adapter tests
//!
//! Run against the database in `DATABASE_URL`; skipped when it is unset.
//! Every test works in its own collection name so runs do not interfere.

use chrono::{Duration, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};

use twin_server::auth::Identity;
use twin_server::db::{self, MetadataStore, PgMetadataStore, PgUserStore, UserStore};
use twin_server::models::{AssetUpdate, UploadStatus};

mod common;
use common::record;

async fn test_pool() -> Option<PgPool> {
    let url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("DATABASE_URL not set, skipping PostgreSQL test");
            return None;
        },
    };

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await
        .expect("Failed to connect to PostgreSQL");
    db::run_migrations(&pool).await.expect("Failed to run migrations");
    Some(pool)
}

fn collection() -> String {
    format!("test-{}", uuid::Uuid::new_v4())
}

#[tokio::test]
async fn test_save_get_update_delete() {
    let Some(pool) = test_pool().await else { return };
    let store = PgMetadataStore::new(pool);
    let name = collection();

    let saved = store.save(record(&name, None, true)).await.unwrap();
    assert_eq!(saved.name, name);
    assert_eq!(saved.upload_status, Some(UploadStatus::Completed));

    let fetched = store.get_by_id(saved.id, &name).await.unwrap().unwrap();
    assert_eq!(fetched.description, "Seeded");

    // wrong collection reads as absent
    assert!(store.get_by_id(saved.id, "other").await.unwrap().is_none());

    let update = AssetUpdate {
        description: Some("Changed".to_string()),
        is_public: Some(false),
        ..AssetUpdate::default()
    };
    let updated = store.update_by_id(&name, saved.id, update).await.unwrap();
    assert_eq!(updated.description, "Changed");
    assert!(!updated.is_public);
    assert_eq!(updated.source, "https://example.com/seed");

    assert!(!store.delete(saved.id, "other").await.unwrap());
    assert!(store.delete(saved.id, &name).await.unwrap());
    assert!(store.get_by_id(saved.id, &name).await.unwrap().is_none());
}

#[tokio::test]
async fn test_date_range_is_newest_first() {
    let Some(pool) = test_pool().await else { return };
    let store = PgMetadataStore::new(pool);
    let name = collection();
    let now = Utc::now();

    for days in [3, 1, 2] {
        let mut new = record(&name, None, true);
        new.date = now - Duration::days(days);
        store.save(new).await.unwrap();
    }

    let all = store.get_by_date_range(&name, None, None, None).await.unwrap();
    assert_eq!(all.len(), 3);
    assert!(all.windows(2).all(|w| w[0].date >= w[1].date));

    let recent = store
        .get_by_date_range(&name, Some(now - Duration::hours(36)), None, None)
        .await
        .unwrap();
    assert_eq!(recent.len(), 1);

    let limited = store.get_by_date_range(&name, None, None, Some(2)).await.unwrap();
    assert_eq!(limited.len(), 2);
}

#[tokio::test]
async fn test_find_or_create_is_stable() {
    let Some(pool) = test_pool().await else { return };
    let users = PgUserStore::new(pool);
    let subject = format!("user-{}", uuid::Uuid::new_v4());

    let first = users
        .find_or_create(&Identity::new(subject.clone(), vec!["viewer".to_string()]))
        .await
        .unwrap();
    let second = users
        .find_or_create(&Identity::new(subject, vec!["admin".to_string()]))
        .await
        .unwrap();

    assert_eq!(first, second);
}
