use anyhow::Context;
use chrono::Utc;

use crate::{db_core::prelude::*, error::AppResult};

pub struct UserCtrl;

#[derive(Debug, Clone, FromQueryResult)]
pub struct UserWithAccountAccess {
    pub id: i32,
    pub email: String,
    pub user_account_access_id: i32,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: chrono::DateTime<chrono::FixedOffset>,
    pub scopes: serde_json::Value,
}

impl UserWithAccountAccess {
    pub fn granted_scopes(&self) -> Vec<String> {
        serde_json::from_value(self.scopes.clone()).unwrap_or_default()
    }
}

impl UserCtrl {
    pub async fn get_by_id(conn: &DatabaseConnection, user_id: i32) -> AppResult<user::Model> {
        let user = User::find_by_id(user_id)
            .one(conn)
            .await
            .context("Error fetching user")?
            .context("User not found")?;

        Ok(user)
    }

    pub async fn get_with_account_access(
        conn: &DatabaseConnection,
        user_id: i32,
    ) -> AppResult<UserWithAccountAccess> {
        let user = User::find()
            .filter(user::Column::Id.eq(user_id))
            .join(JoinType::InnerJoin, user::Relation::UserAccountAccess.def())
            .column_as(user_account_access::Column::Id, "user_account_access_id")
            .column_as(user_account_access::Column::AccessToken, "access_token")
            .column_as(user_account_access::Column::RefreshToken, "refresh_token")
            .column_as(user_account_access::Column::ExpiresAt, "expires_at")
            .column_as(user_account_access::Column::Scopes, "scopes")
            .into_model::<UserWithAccountAccess>()
            .one(conn)
            .await
            .context("Error fetching user with account access")?
            .context("User not found")?;

        Ok(user)
    }

    pub async fn all_connected(conn: &DatabaseConnection) -> AppResult<Vec<UserWithAccountAccess>> {
        let users = User::find()
            .filter(user::Column::ReAuthRequired.eq(false))
            .join(JoinType::InnerJoin, user::Relation::UserAccountAccess.def())
            .column_as(user_account_access::Column::Id, "user_account_access_id")
            .column_as(user_account_access::Column::AccessToken, "access_token")
            .column_as(user_account_access::Column::RefreshToken, "refresh_token")
            .column_as(user_account_access::Column::ExpiresAt, "expires_at")
            .column_as(user_account_access::Column::Scopes, "scopes")
            .into_model::<UserWithAccountAccess>()
            .all(conn)
            .await
            .context("Error fetching connected users")?;

        Ok(users)
    }

    pub async fn upsert_from_oauth(
        conn: &DatabaseConnection,
        email: &str,
        access_token: String,
        refresh_token: String,
        expires_at: chrono::DateTime<Utc>,
        scopes: Vec<String>,
    ) -> AppResult<i32> {
        User::insert(user::ActiveModel {
            id: ActiveValue::NotSet,
            email: ActiveValue::Set(email.to_string()),
            re_auth_required: ActiveValue::Set(false),
            ..Default::default()
        })
        .on_conflict(
            OnConflict::column(user::Column::Email)
                .update_column(user::Column::ReAuthRequired)
                .to_owned(),
        )
        .exec(conn)
        .await?;

        let user = User::find()
            .filter(user::Column::Email.eq(email))
            .one(conn)
            .await?
            .context("User not found after upsert")?;

        UserAccountAccess::insert(user_account_access::ActiveModel {
            id: ActiveValue::NotSet,
            access_token: ActiveValue::Set(access_token),
            refresh_token: ActiveValue::Set(refresh_token),
            expires_at: ActiveValue::Set(expires_at.into()),
            scopes: ActiveValue::Set(serde_json::json!(scopes)),
            user_id: ActiveValue::Set(user.id),
            ..Default::default()
        })
        .on_conflict(
            OnConflict::column(user_account_access::Column::UserId)
                .update_columns([
                    user_account_access::Column::AccessToken,
                    user_account_access::Column::RefreshToken,
                    user_account_access::Column::ExpiresAt,
                    user_account_access::Column::Scopes,
                    user_account_access::Column::UpdatedAt,
                ])
                .to_owned(),
        )
        .exec(conn)
        .await?;

        Ok(user.id)
    }

    pub async fn update_access_token(
        conn: &DatabaseConnection,
        user_account_access_id: i32,
        access_token: String,
        expires_at: chrono::DateTime<Utc>,
    ) -> AppResult<()> {
        UserAccountAccess::update(user_account_access::ActiveModel {
            id: ActiveValue::Set(user_account_access_id),
            access_token: ActiveValue::Set(access_token),
            expires_at: ActiveValue::Set(expires_at.into()),
            updated_at: ActiveValue::Set(Utc::now().into()),
            ..Default::default()
        })
        .exec(conn)
        .await
        .context("Error updating access token")?;

        Ok(())
    }

    /// Invalidates the stored grant. The access row is deleted (not blanked)
    /// so a half-valid token can never be replayed.
    pub async fn mark_re_auth_required(conn: &DatabaseConnection, user_id: i32) -> AppResult<()> {
        UserAccountAccess::delete_many()
            .filter(user_account_access::Column::UserId.eq(user_id))
            .exec(conn)
            .await?;

        User::update(user::ActiveModel {
            id: ActiveValue::Set(user_id),
            re_auth_required: ActiveValue::Set(true),
            updated_at: ActiveValue::Set(Utc::now().into()),
            ..Default::default()
        })
        .exec(conn)
        .await
        .context("Error marking user for re-auth")?;

        Ok(())
    }

    pub async fn update_last_sync(conn: &DatabaseConnection, user_id: i32) -> anyhow::Result<()> {
        User::update(user::ActiveModel {
            id: ActiveValue::Set(user_id),
            last_sync: ActiveValue::Set(Some(Utc::now().into())),
            ..Default::default()
        })
        .exec(conn)
        .await
        .context("Error updating last sync time")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use sea_orm::DbBackend;

    use super::*;

    #[test]
    fn test_get_with_account_access_query() {
        let query = User::find()
            .filter(user::Column::Id.eq(1))
            .join(JoinType::InnerJoin, user::Relation::UserAccountAccess.def())
            .column_as(user_account_access::Column::Id, "user_account_access_id")
            .column_as(user_account_access::Column::AccessToken, "access_token")
            .build(DbBackend::Postgres)
            .to_string();

        assert!(query.contains("INNER JOIN \"user_account_access\""));
        assert!(query.contains("\"user\".\"id\" = 1"));
    }
}
