use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::auth::{secrets_match, AuthMethod, Session, TokenKind, TokenService};
use crate::database::{DocumentStore, StoreTransaction};
use crate::filter::FilterData;
use crate::server::AppState;

/// Credentials carried by the `Authorization` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credentials {
    Bearer(String),
    ApiKey { key: String, secret: String },
}

/// Resolve the caller and store the [`Session`] in the request extensions.
/// Requests without valid credentials continue as Guest.
pub async fn session_middleware(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let services = state.dispatcher.services();
    let session = resolve_session(request.headers(), &services.tokens, state.dispatcher.store().as_ref()).await;
    request.extensions_mut().insert(session);
    next.run(request).await
}

pub async fn resolve_session(headers: &HeaderMap, tokens: &TokenService, store: &dyn DocumentStore) -> Session {
    let credentials = match extract_credentials(headers) {
        Ok(Some(credentials)) => credentials,
        Ok(None) => return Session::Guest,
        Err(reason) => {
            warn!("Ignoring Authorization header: {}", reason);
            return Session::Guest;
        }
    };

    match credentials {
        Credentials::Bearer(token) => match tokens.verify(&token, TokenKind::Access) {
            Ok(claims) => Session::user(claims.sub, AuthMethod::BearerToken),
            Err(err) => {
                warn!("Rejected bearer token: {}", err);
                Session::Guest
            }
        },
        Credentials::ApiKey { key, secret } => {
            let user = match store.begin().await {
                Ok(mut tx) => {
                    let user = user_for_api_key(tx.as_mut(), &key, &secret).await;
                    let _ = tx.rollback().await;
                    user
                }
                Err(err) => {
                    warn!("Could not open store for API key lookup: {}", err);
                    None
                }
            };
            match user {
                Some(user) => Session::user(user, AuthMethod::ApiKey),
                None => {
                    warn!("Rejected API key {}", key);
                    Session::Guest
                }
            }
        }
    }
}

/// `Ok(None)` when no header is present.
pub fn extract_credentials(headers: &HeaderMap) -> Result<Option<Credentials>, &'static str> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value.to_str().map_err(|_| "header is not valid ASCII")?.trim();

    if let Some(token) = value.strip_prefix("Bearer ") {
        let token = token.trim();
        if token.is_empty() {
            return Err("empty bearer token");
        }
        return Ok(Some(Credentials::Bearer(token.to_string())));
    }

    if let Some(pair) = value.strip_prefix("token ") {
        let (key, secret) = pair.trim().split_once(':').ok_or("expected token <api_key>:<api_secret>")?;
        if key.is_empty() || secret.is_empty() {
            return Err("empty API key or secret");
        }
        return Ok(Some(Credentials::ApiKey {
            key: key.to_string(),
            secret: secret.to_string(),
        }));
    }

    Err("unsupported authorization scheme")
}

async fn user_for_api_key(tx: &mut dyn StoreTransaction, key: &str, secret: &str) -> Option<String> {
    let filter = FilterData::new().where_eq("api_key", key).limit(1);
    let user = match tx.find("User", &filter).await {
        Ok(mut found) => found.pop()?,
        Err(err) => {
            warn!("API key lookup failed: {}", err);
            return None;
        }
    };
    let enabled = user.get("enabled").and_then(|v| v.as_i64()).unwrap_or(1) != 0;
    let matches = user.get_str("api_secret").map_or(false, |stored| secrets_match(secret, stored));
    (enabled && matches).then(|| user.name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::database::{Document, MemoryStore};
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn parses_both_schemes() {
        assert_eq!(extract_credentials(&HeaderMap::new()), Ok(None));
        assert_eq!(
            extract_credentials(&headers("Bearer abc.def")),
            Ok(Some(Credentials::Bearer("abc.def".into())))
        );
        assert_eq!(
            extract_credentials(&headers("token k1:s1")),
            Ok(Some(Credentials::ApiKey {
                key: "k1".into(),
                secret: "s1".into()
            }))
        );
        assert!(extract_credentials(&headers("Basic dXNlcg==")).is_err());
        assert!(extract_credentials(&headers("token nocolon")).is_err());
    }

    #[tokio::test]
    async fn resolves_users_and_falls_back_to_guest() {
        let config = AppConfig::development();
        let tokens = TokenService::new(&config.security);
        let store = MemoryStore::new();
        store
            .seed(vec![Document::named("User", "a@example.com")
                .with("api_key", "k1")
                .with("api_secret", "s1")
                .with("enabled", 1)])
            .await;

        let access = tokens.issue("a@example.com", TokenKind::Access).unwrap();
        let session = resolve_session(&headers(&format!("Bearer {}", access.token)), &tokens, &store).await;
        assert_eq!(session, Session::user("a@example.com", AuthMethod::BearerToken));

        let session = resolve_session(&headers("token k1:s1"), &tokens, &store).await;
        assert_eq!(session, Session::user("a@example.com", AuthMethod::ApiKey));

        assert!(resolve_session(&headers("token k1:wrong"), &tokens, &store).await.is_guest());
        assert!(resolve_session(&headers("token k1:s2"), &tokens, &store).await.is_guest());
        assert!(resolve_session(&headers("token k1:s"), &tokens, &store).await.is_guest());
        assert!(resolve_session(&headers("Bearer garbage"), &tokens, &store).await.is_guest());
        assert!(resolve_session(&HeaderMap::new(), &tokens, &store).await.is_guest());
        assert_eq!(store.open_transactions(), 0);
    }
}
