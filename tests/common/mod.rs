use query_chain::db::{Connection, Connector, SqlxConnector};
use query_chain::models::{ConnectionConfig, QueryParam};
use query_chain::{AppContext, Retry};
use std::time::Duration;
use tempfile::TempDir;

/// A SQLite database file in its own temporary directory, seeded with `users`.
pub struct TestDb {
    pub ctx: AppContext<SqlxConnector>,
    // Dropped last: removes the database file
    _dir: TempDir,
}

pub async fn seeded(users: &[(&str, &str, i64)]) -> TestDb {
    let dir = tempfile::tempdir().unwrap();
    let config = ConnectionConfig::sqlite(dir.path().join("users.db"));
    let connector = SqlxConnector::new(config);

    let mut conn = connector.connect().await.unwrap();
    conn.execute(
        "CREATE TABLE users (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT CHECK (email LIKE '%@%'),
            age INTEGER NOT NULL
        )",
        &[],
    )
    .await
    .unwrap();
    for (name, email, age) in users {
        conn.execute(
            "INSERT INTO users (name, email, age) VALUES (?, ?, ?)",
            &[
                QueryParam::from(*name),
                QueryParam::from(*email),
                QueryParam::Int(*age),
            ],
        )
        .await
        .unwrap();
    }
    conn.close().await.unwrap();

    let ctx = AppContext::new(connector)
        .with_retry(Retry::new(2, Duration::from_millis(10)).unwrap());
    TestDb { ctx, _dir: dir }
}

pub fn sample_users() -> Vec<(&'static str, &'static str, i64)> {
    vec![
        ("Alice", "alice@example.com", 31),
        ("Bob", "bob@example.com", 45),
        ("Carol", "carol@example.com", 22),
        ("Dan", "dan@example.com", 52),
        ("Eve", "eve@example.com", 25),
    ]
}
