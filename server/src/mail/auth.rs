use chrono::{Duration, Utc};
use lib_email_clients::gmail::scopes_satisfy_required;
use lib_utils::crypt;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};

use crate::{
    error::{AppError, AppResult},
    model::user::{UserCtrl, UserWithAccountAccess},
    server_config::{cfg, GmailConfig},
    HttpClient,
};

#[derive(Debug, Serialize, Deserialize)]
pub struct GmailApiTokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub refresh_token: String,
    pub scope: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GmailApiRefreshTokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    pub scope: String,
}

pub async fn exchange_refresh_token(
    http_client: HttpClient,
    refresh_token: String,
) -> AppResult<GmailApiRefreshTokenResponse> {
    let GmailConfig {
        token_uri,
        client_id,
        client_secret,
        ..
    } = &cfg.gmail_config;

    let resp = http_client
        .post(token_uri)
        .form(&[
            ("client_id", client_id.as_str()),
            ("client_secret", client_secret.as_str()),
            ("refresh_token", refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ])
        .send()
        .await?;

    let status = resp.status();
    let body: serde_json::Value = resp.json().await?;

    if !status.is_success() {
        let error = body
            .get("error")
            .and_then(|e| e.as_str())
            .unwrap_or("unknown")
            .to_string();
        return Err(AppError::Unauthorized(error));
    }

    serde_json::from_value(body.clone()).map_err(|_| {
        tracing::error!("Failed to parse refresh response: {:?}", body);
        AppError::BadRequest(body.to_string())
    })
}

/// Yields a usable access token for the user, refreshing when expired.
///
/// Scope drift and refresh rejections both invalidate the stored grant:
/// the token row is deleted, the user is flagged for re-consent, and the
/// current run aborts with `ReAuthRequired`.
pub async fn access_token_for(
    conn: &DatabaseConnection,
    http_client: &HttpClient,
    user: &UserWithAccountAccess,
) -> AppResult<String> {
    if !scopes_satisfy_required(&user.granted_scopes()) {
        tracing::warn!(
            "Persisted scopes for {} no longer cover the required set",
            user.email
        );
        UserCtrl::mark_re_auth_required(conn, user.id).await?;
        return Err(AppError::ReAuthRequired(format!(
            "granted scopes for {} have drifted",
            user.email
        )));
    }

    let access_token = crypt::decrypt(&user.access_token)?;

    if user.expires_at > Utc::now() + Duration::seconds(30) {
        return Ok(access_token);
    }

    let refresh_token = crypt::decrypt(&user.refresh_token)?;
    let resp = match exchange_refresh_token(http_client.clone(), refresh_token).await {
        Ok(resp) => resp,
        Err(AppError::Unauthorized(reason)) => {
            tracing::warn!("Refresh token rejected for {}: {}", user.email, reason);
            UserCtrl::mark_re_auth_required(conn, user.id).await?;
            return Err(AppError::ReAuthRequired(reason));
        }
        Err(e) => return Err(e),
    };

    let granted = resp.scope.split(' ').map(str::to_string).collect::<Vec<_>>();
    if !scopes_satisfy_required(&granted) {
        UserCtrl::mark_re_auth_required(conn, user.id).await?;
        return Err(AppError::ReAuthRequired(format!(
            "refreshed grant for {} lost a required scope",
            user.email
        )));
    }

    let expires_at = Utc::now() + Duration::seconds(resp.expires_in as i64);
    UserCtrl::update_access_token(
        conn,
        user.user_account_access_id,
        crypt::encrypt(&resp.access_token)?,
        expires_at,
    )
    .await?;

    Ok(resp.access_token)
}
