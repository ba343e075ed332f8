use async_trait::async_trait;
use serde_json::{json, Value};

use crate::auth::{generate_hash, verify_password, TokenKind};
use crate::database::Document;
use crate::dispatch::{Handler, HandlerResult, Reply, RequestContext};
use crate::error::ApiError;
use crate::filter::FilterData;

pub const REFRESH_TOKEN_DOCTYPE: &str = "Refresh Token";
const INVALID_CREDENTIALS: &str = "Invalid login credentials";
const INVALID_REFRESH_TOKEN: &str = "Invalid refresh token";
const API_KEY_LENGTH: usize = 15;

fn str_field<'a>(input: &'a Value, field: &str) -> &'a str {
    input.get(field).and_then(Value::as_str).unwrap_or_default()
}

/// `login`: password check, employee link, API key pair and JWTs.
pub struct Login;

#[async_trait]
impl Handler for Login {
    async fn handle(&self, ctx: &mut RequestContext, input: Value) -> HandlerResult {
        let usr = str_field(&input, "usr");
        let pwd = str_field(&input, "pwd");
        let services = ctx.services();
        let tx = ctx.tx()?;

        let mut user = tx
            .get("User", usr)
            .await?
            .ok_or_else(|| ApiError::authentication_failed(INVALID_CREDENTIALS))?;

        let hash = user.get_str("password_hash").unwrap_or_default();
        if hash.is_empty() || !verify_password(pwd, hash) {
            return Err(ApiError::authentication_failed(INVALID_CREDENTIALS));
        }

        if user.get("enabled").and_then(Value::as_i64).unwrap_or(1) == 0 {
            return Err(ApiError::authentication_failed("User disabled"));
        }

        let linked = tx
            .exists("Employee", &FilterData::new().where_eq("user_id", user.name.as_str()))
            .await?;
        if !linked {
            return Err(ApiError::authentication_failed("Please link Employee with this user"));
        }
        services.employees.invalidate(&user.name).await;

        let (api_key, api_secret) = match (user.get_str("api_key"), user.get_str("api_secret")) {
            (None, None) => {
                let key = generate_hash(API_KEY_LENGTH);
                let secret = generate_hash(API_KEY_LENGTH);
                user.set("api_key", key.clone());
                user.set("api_secret", secret.clone());
                user = tx.update(user).await?;
                tracing::info!("Generated API key for {}", user.name);
                (key, secret)
            }
            (key, secret) => (
                key.unwrap_or_default().to_string(),
                secret.unwrap_or_default().to_string(),
            ),
        };

        let access = services.tokens.issue(&user.name, TokenKind::Access)?;
        let refresh = services.tokens.issue(&user.name, TokenKind::Refresh)?;
        tx.insert(
            Document::named(REFRESH_TOKEN_DOCTYPE, refresh.claims.jti.clone())
                .with("user", user.name.clone())
                .with("status", "Active")
                .with("expires_at", refresh.claims.exp),
        )
        .await?;

        Ok(Reply::data(
            "Logged In",
            json!({
                "user": user.name,
                "full_name": user.get_str("full_name").unwrap_or(&user.name),
                "user_type": user.get_str("user_type").unwrap_or("System User"),
                "key_details": {
                    "api_key": api_key,
                    "api_secret": api_secret,
                },
                "access_token": access.token,
                "refresh_token": refresh.token,
                "token_type": "Bearer",
                "expires_in": access.expires_in,
            }),
        ))
    }
}

/// `get_access_token`: trade an active refresh token for a new access token.
pub struct GetAccessToken;

#[async_trait]
impl Handler for GetAccessToken {
    async fn handle(&self, ctx: &mut RequestContext, input: Value) -> HandlerResult {
        let services = ctx.services();
        let claims = services
            .tokens
            .verify(str_field(&input, "refresh_token"), TokenKind::Refresh)?;

        let stored = ctx
            .tx()?
            .get(REFRESH_TOKEN_DOCTYPE, &claims.jti)
            .await?
            .filter(|doc| doc.get_str("status") == Some("Active") && doc.get_str("user") == Some(claims.sub.as_str()))
            .ok_or_else(|| ApiError::authentication_failed(INVALID_REFRESH_TOKEN))?;

        let access = services.tokens.issue(&claims.sub, TokenKind::Access)?;
        tracing::debug!("Refreshed access token for {} via {}", claims.sub, stored.name);

        Ok(Reply::data(
            "Access token generated",
            json!({
                "access_token": access.token,
                "token_type": "Bearer",
                "expires_in": access.expires_in,
            }),
        ))
    }
}

/// `revoke_access_token`: mark one of the caller's refresh tokens revoked.
pub struct RevokeAccessToken;

#[async_trait]
impl Handler for RevokeAccessToken {
    async fn handle(&self, ctx: &mut RequestContext, input: Value) -> HandlerResult {
        let services = ctx.services();
        let claims = services
            .tokens
            .verify_allow_expired(str_field(&input, "token"), TokenKind::Refresh)?;

        if claims.sub != ctx.user() {
            return Err(ApiError::forbidden("Not permitted to revoke this token"));
        }

        let tx = ctx.tx()?;
        let mut doc = tx
            .get(REFRESH_TOKEN_DOCTYPE, &claims.jti)
            .await?
            .ok_or_else(|| ApiError::authentication_failed(INVALID_REFRESH_TOKEN))?;
        doc.set("status", "Revoked");
        tx.update(doc).await?;

        Ok(Reply::message("Token revoked successfully"))
    }
}
