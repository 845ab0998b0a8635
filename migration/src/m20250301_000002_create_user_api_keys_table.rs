use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(UserApiKeys::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(UserApiKeys::Id)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(UserApiKeys::UserId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(ColumnDef::new(UserApiKeys::KeyName).string_len(128))
                    .col(
                        ColumnDef::new(UserApiKeys::KeyValue)
                            .string_len(512)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UserApiKeys::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(UserApiKeys::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_user_api_keys_user_id")
                    .table(UserApiKeys::Table)
                    .col(UserApiKeys::UserId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(UserApiKeys::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum UserApiKeys {
    Table,
    Id,
    UserId,
    KeyName,
    KeyValue,
    CreatedAt,
    UpdatedAt,
}
