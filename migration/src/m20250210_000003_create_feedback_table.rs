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
                    .table(Feedback::Table)
                    .if_not_exists()
                    .col(pk_auto(Feedback::Id))
                    .col(string(Feedback::MessageId).not_null())
                    .col(integer(Feedback::UserId).not_null())
                    .col(string_null(Feedback::OriginalPriority))
                    .col(string_null(Feedback::CorrectedPriority))
                    .col(string_null(Feedback::OriginalPurpose))
                    .col(string_null(Feedback::CorrectedPurpose))
                    .col(string(Feedback::SenderKey).not_null())
                    .col(
                        timestamp_with_time_zone(Feedback::CreatedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-feedback-user_id")
                            .from(Feedback::Table, Feedback::UserId)
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
                    .name("idx-feedback-user_id-created_at")
                    .table(Feedback::Table)
                    .col(Feedback::UserId)
                    .col(Feedback::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx-feedback-user_id-sender_key")
                    .table(Feedback::Table)
                    .col(Feedback::UserId)
                    .col(Feedback::SenderKey)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx-feedback-user_id-sender_key")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx-feedback-user_id-created_at")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(Feedback::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Feedback {
    Table,
    Id,
    MessageId,
    UserId,
    OriginalPriority,
    CorrectedPriority,
    OriginalPurpose,
    CorrectedPurpose,
    SenderKey,
    CreatedAt,
}
