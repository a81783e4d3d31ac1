use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(User::Table)
                    .if_not_exists()
                    .col(pk_auto(User::Id))
                    .col(string_uniq(User::Email))
                    .col(
                        timestamp_with_time_zone(User::CreatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .col(
                        timestamp_with_time_zone(User::UpdatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .col(timestamp_with_time_zone_null(User::LastSync))
                    .col(boolean(User::ReAuthRequired).default(false).not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(UserAccountAccess::Table)
                    .if_not_exists()
                    .col(pk_auto(UserAccountAccess::Id))
                    .col(string(UserAccountAccess::AccessToken).not_null())
                    .col(string(UserAccountAccess::RefreshToken).not_null())
                    .col(timestamp_with_time_zone(UserAccountAccess::ExpiresAt).not_null())
                    .col(json_binary(UserAccountAccess::Scopes).not_null())
                    .col(
                        timestamp_with_time_zone(UserAccountAccess::CreatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .col(
                        timestamp_with_time_zone(UserAccountAccess::UpdatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .col(integer_uniq(UserAccountAccess::UserId))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-user_account_access-user_id")
                            .from(UserAccountAccess::Table, UserAccountAccess::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(UserAccountAccess::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(User::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum User {
    Table,
    Id,
    Email,
    CreatedAt,
    UpdatedAt,
    LastSync,
    ReAuthRequired,
}

#[derive(DeriveIden)]
pub enum UserAccountAccess {
    Table,
    Id,
    AccessToken,
    RefreshToken,
    ExpiresAt,
    Scopes,
    CreatedAt,
    UpdatedAt,
    UserId,
}
