// migration/src/lib.rs
pub use sea_orm_migration::prelude::*;

// アカウント・バンドル関連マイグレーション
mod m20250801_000001_create_accounts_table;
mod m20250801_000002_create_bundles_table;

// サブスクリプション関連マイグレーション
mod m20250801_000003_create_subscriptions_table;
mod m20250801_000004_create_subscription_events_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            // 1. 基本テーブル作成（依存関係なし）
            Box::new(m20250801_000001_create_accounts_table::Migration),
            // 2. 依存テーブル作成（accountsテーブルに依存）
            Box::new(m20250801_000002_create_bundles_table::Migration),
            // 3. サブスクリプションとイベント
            Box::new(m20250801_000003_create_subscriptions_table::Migration),
            Box::new(m20250801_000004_create_subscription_events_table::Migration),
        ]
    }
}
