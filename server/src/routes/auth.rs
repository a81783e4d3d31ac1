use anyhow::Context;
use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{Duration, Utc};
use lib_email_clients::gmail::scopes_satisfy_required;
use lib_utils::crypt;
use serde::Deserialize;
use serde_json::json;

use crate::{
    error::{AppError, AppJsonResult},
    mail::{GmailApiTokenResponse, GmailClient},
    model::{user::UserCtrl, user_profile::UserProfileCtrl},
    server_config::{cfg, GmailConfig},
    HttpClient, ServerState,
};

pub async fn handler_auth_gmail(
    State(http_client): State<HttpClient>,
) -> AppJsonResult<serde_json::Value> {
    let GmailConfig {
        auth_uri,
        client_id,
        redirect_uris,
        scopes,
        ..
    } = &cfg.gmail_config;

    let req = http_client
        .get(auth_uri)
        .query(&[
            ("client_id", client_id.as_str()),
            ("redirect_uri", redirect_uris[0].as_str()),
            ("response_type", "code"),
            ("scope", scopes.join(" ").as_str()),
            ("access_type", "offline"),
            ("prompt", "consent"),
        ])
        .build()?;

    Ok(Json(json!({
        "url": req.url().to_string()
    })))
}

#[derive(Deserialize, Debug)]
#[allow(dead_code)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub error: Option<String>,
    pub scope: Option<String>,
}

pub async fn handler_auth_gmail_callback(
    State(state): State<ServerState>,
    Query(query): Query<CallbackQuery>,
) -> AppJsonResult<serde_json::Value> {
    tracing::info!("Callback query: {:?}", query);
    if let Some(error) = query.error {
        return Err(AppError::Unauthorized(error));
    }
    let Some(code) = query.code.as_ref() else {
        return Err(AppError::BadRequest("Missing code".to_string()));
    };

    let GmailConfig {
        token_uri,
        client_id,
        client_secret,
        redirect_uris,
        ..
    } = &cfg.gmail_config;

    let resp = state
        .http_client
        .post(token_uri)
        .form(&[
            ("client_id", client_id.as_str()),
            ("client_secret", client_secret.as_str()),
            ("code", code.as_str()),
            ("redirect_uri", redirect_uris[0].as_str()),
            ("grant_type", "authorization_code"),
        ])
        .send()
        .await?;

    let resp: serde_json::Value = resp.json().await?;
    let resp: GmailApiTokenResponse = serde_json::from_value(resp.clone()).map_err(|_| {
        tracing::error!("Failed to parse token response: {:?}", resp);
        AppError::BadRequest(resp.to_string())
    })?;

    // Users can untick scopes on the consent screen; a grant that cannot
    // drive the agent is rejected up front instead of failing later.
    let granted: Vec<String> = resp.scope.split(' ').map(str::to_string).collect();
    if !scopes_satisfy_required(&granted) {
        return Err(AppError::Unauthorized(
            "The granted scopes do not cover mail modify + calendar events; please re-consent"
                .to_string(),
        ));
    }

    let email_client = GmailClient::new(state.http_client.clone(), resp.access_token.clone());
    let profile = email_client.get_profile().await?;
    let email = profile
        .email_address
        .context("Profile email not found. An email address is required")?;

    let user_id = UserCtrl::upsert_from_oauth(
        &state.conn,
        &email,
        crypt::encrypt(&resp.access_token)?,
        crypt::encrypt(&resp.refresh_token)?,
        Utc::now() + Duration::seconds(resp.expires_in as i64),
        granted,
    )
    .await?;

    // Materialize the profile so the first pipeline run has preferences.
    UserProfileCtrl::get_or_create(&state.conn, user_id).await?;

    Ok(Json(json!({
        "message": "Login success",
        "user_id": user_id,
    })))
}
