use sea_orm_migration::{prelude::*, schema::*};

use crate::m20250210_000001_create_users_table::User;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Activity::Table)
                    .if_not_exists()
                    .col(big_integer(Activity::Id).primary_key().auto_increment())
                    .col(integer(Activity::UserId).not_null())
                    .col(string(Activity::Kind).not_null())
                    .col(string(Activity::Stage).not_null())
                    .col(string(Activity::Status).not_null())
                    .col(json_binary(Activity::Details).not_null())
                    .col(
                        timestamp_with_time_zone(Activity::CreatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .col(
                        timestamp_with_time_zone(Activity::UpdatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-activity-user_id")
                            .from(Activity::Table, Activity::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx-activity-user_id-created_at")
                    .table(Activity::Table)
                    .col(Activity::UserId)
                    .col(Activity::CreatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx-activity-user_id-created_at")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(Activity::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Activity {
    Table,
    Id,
    UserId,
    Kind,
    Stage,
    Status,
    Details,
    CreatedAt,
    UpdatedAt,
}
