use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SubscriptionEvents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SubscriptionEvents::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(SubscriptionEvents::SubscriptionId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SubscriptionEvents::EventType)
                            .string_len(10)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SubscriptionEvents::ApiEventType)
                            .string_len(30)
                            .null(), // フェーズイベントの場合はnull
                    )
                    .col(
                        ColumnDef::new(SubscriptionEvents::PlanName)
                            .string_len(255)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SubscriptionEvents::PhaseName)
                            .string_len(255)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SubscriptionEvents::PriceListName)
                            .string_len(255)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(SubscriptionEvents::RequestedDate)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SubscriptionEvents::EffectiveDate)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SubscriptionEvents::TotalOrdering)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SubscriptionEvents::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(SubscriptionEvents::Notified)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(SubscriptionEvents::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_subscription_events_subscription_id")
                            .from(
                                SubscriptionEvents::Table,
                                SubscriptionEvents::SubscriptionId,
                            )
                            .to(Subscriptions::Table, Subscriptions::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // サブスクリプション単位のイベント取得用
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .table(SubscriptionEvents::Table)
                    .name("idx_subscription_events_subscription_id")
                    .col(SubscriptionEvents::SubscriptionId)
                    .to_owned(),
            )
            .await?;

        // 通知待ちイベントのポーリング用
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .table(SubscriptionEvents::Table)
                    .name("idx_subscription_events_active_notified")
                    .col(SubscriptionEvents::IsActive)
                    .col(SubscriptionEvents::Notified)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SubscriptionEvents::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum SubscriptionEvents {
    Table,
    Id,
    SubscriptionId,
    EventType,
    ApiEventType,
    PlanName,
    PhaseName,
    PriceListName,
    RequestedDate,
    EffectiveDate,
    TotalOrdering,
    IsActive,
    Notified,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Subscriptions {
    Table,
    Id,
}
