use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ProviderAccess::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ProviderAccess::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ProviderAccess::ApiKeyId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProviderAccess::Provider)
                            .string_len(20)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProviderAccess::ProviderKey)
                            .string_len(512)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ProviderAccess::Status)
                            .string_len(20)
                            .not_null()
                            .default("active"),
                    )
                    .col(ColumnDef::new(ProviderAccess::LimitPeriod).string_len(10))
                    .col(ColumnDef::new(ProviderAccess::LimitCount).big_integer())
                    .col(
                        ColumnDef::new(ProviderAccess::UsedCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(ProviderAccess::LastResetAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(ProviderAccess::ApiScopes)
                            .json()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ProviderAccess::ExpireTime).timestamp_with_time_zone())
                    .col(ColumnDef::new(ProviderAccess::LastSeen).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_provider_access_key_provider")
                    .table(ProviderAccess::Table)
                    .col(ProviderAccess::ApiKeyId)
                    .col(ProviderAccess::Provider)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ProviderAccess::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ProviderAccess {
    Table,
    Id,
    ApiKeyId,
    Provider,
    ProviderKey,
    Status,
    LimitPeriod,
    LimitCount,
    UsedCount,
    LastResetAt,
    ApiScopes,
    ExpireTime,
    LastSeen,
}
