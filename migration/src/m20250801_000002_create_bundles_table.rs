use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Bundles::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Bundles::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Bundles::AccountId).uuid().not_null())
                    .col(ColumnDef::new(Bundles::ExternalKey).string_len(255).not_null())
                    .col(
                        ColumnDef::new(Bundles::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_bundles_account_id")
                            .from(Bundles::Table, Bundles::AccountId)
                            .to(Accounts::Table, Accounts::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // アカウント単位でのバンドル検索用
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .table(Bundles::Table)
                    .name("idx_bundles_account_id")
                    .col(Bundles::AccountId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .table(Bundles::Table)
                    .name("idx_bundles_external_key")
                    .col(Bundles::ExternalKey)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Bundles::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Bundles {
    Table,
    Id,
    AccountId,
    ExternalKey,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Accounts {
    Table,
    Id,
}
