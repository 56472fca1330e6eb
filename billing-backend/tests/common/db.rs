//! Async TestDatabase helper for SeaORM backed by in-memory SQLite.

use billing_backend::config::AppConfig;
use billing_backend::db::connect_and_migrate;
use sea_orm::DatabaseConnection;

pub struct TestDatabase {
    pub connection: DatabaseConnection,
}

impl TestDatabase {
    /// マイグレーション適用済みの新しいインメモリDB（テストごとに独立）
    pub async fn new() -> Self {
        let config = AppConfig::for_testing();
        let connection = connect_and_migrate(&config)
            .await
            .expect("connect and migrate in-memory sqlite");

        Self { connection }
    }
}
