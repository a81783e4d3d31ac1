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
                    .table(ActionRequest::Table)
                    .if_not_exists()
                    .col(string(ActionRequest::Id).primary_key())
                    .col(integer(ActionRequest::UserId).not_null())
                    .col(string_null(ActionRequest::MessageId))
                    .col(string(ActionRequest::Action).not_null())
                    .col(json_binary(ActionRequest::Params).not_null())
                    .col(string(ActionRequest::Status).not_null())
                    .col(string_null(ActionRequest::ResultMessage))
                    .col(integer(ActionRequest::Attempts).default(0).not_null())
                    .col(
                        timestamp_with_time_zone(ActionRequest::RequestedAt)
                            .default(Expr::current_timestamp())
                            .not_null(),
                    )
                    .col(timestamp_with_time_zone_null(ActionRequest::ProcessedAt))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-action_request-user_id")
                            .from(ActionRequest::Table, ActionRequest::UserId)
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
                    .name("idx-action_request-status-requested_at")
                    .table(ActionRequest::Table)
                    .col(ActionRequest::Status)
                    .col(ActionRequest::RequestedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx-action_request-status-requested_at")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(ActionRequest::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum ActionRequest {
    Table,
    Id,
    UserId,
    MessageId,
    Action,
    Params,
    Status,
    ResultMessage,
    Attempts,
    RequestedAt,
    ProcessedAt,
}
