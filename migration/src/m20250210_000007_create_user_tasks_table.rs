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
                    .table(UserTask::Table)
                    .if_not_exists()
                    .col(big_integer(UserTask::Id).primary_key().auto_increment())
                    .col(integer(UserTask::UserId).not_null())
                    .col(string(UserTask::TaskType).not_null())
                    .col(text(UserTask::TaskDescription).not_null())
                    .col(string_null(UserTask::Deadline))
                    .col(json_binary(UserTask::Stakeholders).not_null())
                    .col(string_null(UserTask::RelatedMessageId))
                    .col(string(UserTask::CreationMethod).not_null())
                    .col(string(UserTask::Status).not_null())
                    .col(
                        timestamp_with_time_zone(UserTask::CreatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-user_task-user_id")
                            .from(UserTask::Table, UserTask::UserId)
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
                    .name("idx-user_task-user_id-related_message_id")
                    .table(UserTask::Table)
                    .col(UserTask::UserId)
                    .col(UserTask::RelatedMessageId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx-user_task-user_id-related_message_id")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(UserTask::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum UserTask {
    Table,
    Id,
    UserId,
    TaskType,
    TaskDescription,
    Deadline,
    Stakeholders,
    RelatedMessageId,
    CreationMethod,
    Status,
    CreatedAt,
}
