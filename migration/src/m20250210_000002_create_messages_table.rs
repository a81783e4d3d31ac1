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
                    .table(Message::Table)
                    .if_not_exists()
                    .col(string(Message::Id).not_null())
                    .col(integer(Message::UserId).not_null())
                    .col(string(Message::ThreadId).not_null())
                    .col(string(Message::Sender).not_null())
                    .col(string(Message::Subject).not_null())
                    .col(timestamp_with_time_zone_null(Message::ReceivedAt))
                    .col(text(Message::BodyText).not_null())
                    .col(text(Message::BodyHtml).not_null())
                    .col(string(Message::Snippet).not_null())
                    .col(json_binary(Message::Labels).not_null())
                    .col(boolean(Message::IsRead).not_null())
                    .col(boolean(Message::IsStarred).not_null())
                    .col(boolean(Message::IsArchived).not_null())
                    .col(string_null(Message::Priority))
                    .col(string_null(Message::Purpose))
                    .col(integer_null(Message::Urgency))
                    .col(boolean_null(Message::ResponseNeeded))
                    .col(integer_null(Message::EstimatedMinutes))
                    .col(text_null(Message::Summary))
                    .col(string_null(Message::SummaryType))
                    .col(json_binary_null(Message::Reasoning))
                    .col(json_binary(Message::Suggestions).not_null())
                    .col(boolean(Message::MeetingProcessed).default(false).not_null())
                    .col(timestamp_with_time_zone_null(Message::ReclassifiedAt))
                    .col(
                        timestamp_with_time_zone(Message::ProcessedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .name("pk-message")
                            .col(Message::Id)
                            .col(Message::UserId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-message-user_id")
                            .from(Message::Table, Message::UserId)
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
                    .name("idx-message-user_id-priority")
                    .table(Message::Table)
                    .col(Message::UserId)
                    .col(Message::Priority)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx-message-user_id-processed_at")
                    .table(Message::Table)
                    .col(Message::UserId)
                    .col(Message::ProcessedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx-message-user_id-processed_at")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(Index::drop().name("idx-message-user_id-priority").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Message::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Message {
    Table,
    Id,
    UserId,
    ThreadId,
    Sender,
    Subject,
    ReceivedAt,
    BodyText,
    BodyHtml,
    Snippet,
    Labels,
    IsRead,
    IsStarred,
    IsArchived,
    Priority,
    Purpose,
    Urgency,
    ResponseNeeded,
    EstimatedMinutes,
    Summary,
    SummaryType,
    Reasoning,
    Suggestions,
    MeetingProcessed,
    ReclassifiedAt,
    ProcessedAt,
}
