mod common;

use common::{sample_users, seeded};
use futures_util::{StreamExt, TryStreamExt};
use query_chain::DbError;
use query_chain::models::Record;
use query_chain::stream::{
    batch_processing, compute_average_age, stream_table_in_batches, stream_user_ages,
    stream_users, stream_users_in_batches,
};

#[tokio::test]
async fn test_stream_users_yields_all_rows() {
    let db = seeded(&sample_users()).await;
    let rows: Vec<Record> = stream_users(db.ctx.connector())
        .try_collect()
        .await
        .unwrap();

    assert_eq!(rows.len(), 5);
    assert_eq!(rows[4]["name"], "Eve");
}

#[tokio::test]
async fn test_stream_users_in_batches_matches_unbatched() {
    let users: Vec<(String, String, i64)> = (0..23)
        .map(|i| (format!("user{i}"), format!("user{i}@example.com"), 18 + i))
        .collect();
    let users: Vec<(&str, &str, i64)> = users
        .iter()
        .map(|(n, e, a)| (n.as_str(), e.as_str(), *a))
        .collect();
    let db = seeded(&users).await;

    let batched: Vec<Record> = stream_users_in_batches(db.ctx.connector(), 5)
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    let unbatched: Vec<Record> = stream_users(db.ctx.connector())
        .try_collect()
        .await
        .unwrap();

    assert_eq!(batched.len(), 23);
    assert_eq!(batched, unbatched);
}

#[tokio::test]
async fn test_abandoned_stream_releases_database() {
    let db = seeded(&sample_users()).await;

    let mut rows = stream_users_in_batches(db.ctx.connector(), 2).unwrap();
    assert!(rows.next().await.is_some());
    rows.close().await;

    let mut rows = stream_users(db.ctx.connector());
    assert!(rows.next().await.is_some());
    drop(rows);

    // Writes still go through once the streams are gone
    assert_eq!(db.ctx.update_user_email(3, "c@example.com").await.unwrap(), 1);
}

#[tokio::test]
async fn test_batch_size_beyond_sql_range_is_rejected() {
    let db = seeded(&sample_users()).await;
    let err = stream_users_in_batches(db.ctx.connector(), usize::MAX).unwrap_err();
    assert!(matches!(err, DbError::InvalidInput { .. }));
}

#[tokio::test]
async fn test_largest_batch_size_reads_table_once() {
    let db = seeded(&sample_users()).await;
    let rows: Vec<Record> = stream_users_in_batches(db.ctx.connector(), i64::MAX as usize)
        .unwrap()
        .take(20)
        .try_collect()
        .await
        .unwrap();

    let names: Vec<&str> = rows.iter().filter_map(|r| r["name"].as_str()).collect();
    assert_eq!(names, vec!["Alice", "Bob", "Carol", "Dan", "Eve"]);
}

#[tokio::test]
async fn test_stream_over_missing_table_yields_error() {
    let db = seeded(&[]).await;
    let result: Result<Vec<Record>, _> = stream_table_in_batches(db.ctx.connector(), "accounts", 10)
        .unwrap()
        .try_collect()
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_stream_user_ages() {
    let db = seeded(&sample_users()).await;
    let ages: Vec<f64> = stream_user_ages(db.ctx.connector())
        .try_collect()
        .await
        .unwrap();
    assert_eq!(ages, vec![31.0, 45.0, 22.0, 52.0, 25.0]);
}

#[tokio::test]
async fn test_compute_average_age() {
    let db = seeded(&sample_users()).await;
    let average = compute_average_age(db.ctx.connector()).await.unwrap();
    assert_eq!(average, Some(35.0));

    let empty = seeded(&[]).await;
    assert_eq!(compute_average_age(empty.ctx.connector()).await.unwrap(), None);
}

#[tokio::test]
async fn test_batch_processing_selects_older_users() {
    let db = seeded(&sample_users()).await;
    let users = batch_processing(db.ctx.connector(), 2, 25.0).await.unwrap();

    let names: Vec<&str> = users.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, vec!["Alice", "Bob", "Dan"]);
}
