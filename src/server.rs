use axum::{
    extract::{DefaultBodyLimit, FromRequest, Multipart, Path, Query, Request, State},
    http::{header::CONTENT_TYPE, HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Json},
    routing::get,
    Extension, Form, Router,
};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::api::{normalize, ResponseEnvelope};
use crate::auth::Session;
use crate::config::AppConfig;
use crate::database::DocumentStore;
use crate::dispatch::{DispatchTable, Dispatcher, HttpMethod, RequestEnvelope, Services};
use crate::error::ApiError;
use crate::files::UploadedFile;
use crate::middleware::session_middleware;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub dispatcher: Arc<Dispatcher>,
}

impl AppState {
    pub fn new(config: Arc<AppConfig>, store: Arc<dyn DocumentStore>, table: DispatchTable) -> Self {
        let services = Arc::new(Services::new(config.clone()));
        Self {
            dispatcher: Arc::new(Dispatcher::new(Arc::new(table), store, services)),
            config,
        }
    }
}

pub fn app(state: AppState) -> Router {
    let mobile = get(mobile_api).post(mobile_api).put(mobile_api).delete(mobile_api);
    let body_limit = state
        .config
        .api
        .max_request_size_bytes
        .max(state.config.files.max_upload_bytes + 64 * 1024);

    let mut router = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/mobile/v2", mobile.clone())
        .route("/api/mobile/v2/:type", mobile)
        .layer(middleware::from_fn_with_state(state.clone(), session_middleware))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state.clone());

    if state.config.security.enable_cors {
        router = router.layer(cors_layer(&state.config.security.cors_origins));
    }
    if state.config.api.enable_request_logging {
        router = router.layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));
    }
    router
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// `/api/mobile/v2[/:type]`: decode the transport, then hand off to the dispatcher.
async fn mobile_api(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    path: Option<Path<String>>,
    Query(query): Query<HashMap<String, String>>,
    request: Request,
) -> ResponseEnvelope {
    let Ok(method) = HttpMethod::try_from(request.method()) else {
        return render(ApiError::MethodNotAllowed);
    };

    let mut query: Map<String, Value> = query.into_iter().map(|(k, v)| (k, Value::String(v))).collect();
    let query_type = take_type(&mut query);

    let decoded = if method == HttpMethod::Get {
        Ok((query, None))
    } else {
        decode_body(&state, request).await
    };
    let (payload, upload, body_type) = match decoded {
        Ok((mut source, upload)) => {
            let body_type = take_type(&mut source);
            (extract_payload(source), upload, body_type)
        }
        Err(err) => (Err(err), None, None),
    };

    let endpoint = path
        .map(|Path(name)| name)
        .or(query_type)
        .or(body_type)
        .unwrap_or_default();

    match payload {
        Ok(payload) => {
            state
                .dispatcher
                .handle(RequestEnvelope::new(endpoint, method, payload), session, upload)
                .await
        }
        Err(err) => state.dispatcher.reject(&endpoint, method, &session, err),
    }
}

fn render(err: ApiError) -> ResponseEnvelope {
    normalize(err.status_code(), err.to_string(), None)
}

fn take_type(source: &mut Map<String, Value>) -> Option<String> {
    match source.remove("type") {
        Some(Value::String(name)) if !name.is_empty() => Some(name),
        _ => None,
    }
}

/// The `data` key when present (an object or JSON text), otherwise the rest
/// of the request parameters.
pub fn extract_payload(mut source: Map<String, Value>) -> Result<Map<String, Value>, ApiError> {
    let invalid = || ApiError::invalid_field("data", "Input should be a valid dictionary");
    match source.remove("data") {
        None => Ok(source),
        Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map),
        Some(Value::String(text)) if text.trim().is_empty() => Ok(Map::new()),
        Some(Value::String(text)) => match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => Ok(map),
            _ => Err(invalid()),
        },
        Some(_) => Err(invalid()),
    }
}

async fn decode_body(
    state: &AppState,
    request: Request,
) -> Result<(Map<String, Value>, Option<UploadedFile>), ApiError> {
    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();

    if content_type.starts_with("multipart/form-data") {
        let multipart = Multipart::from_request(request, state)
            .await
            .map_err(|e| ApiError::invalid_field("body", e.body_text()))?;
        return decode_multipart(multipart).await;
    }

    if content_type.starts_with("application/x-www-form-urlencoded") {
        let Form(form) = Form::<HashMap<String, String>>::from_request(request, state)
            .await
            .map_err(|e| ApiError::invalid_field("body", e.body_text()))?;
        let map = form.into_iter().map(|(k, v)| (k, Value::String(v))).collect();
        return Ok((map, None));
    }

    let bytes = axum::body::to_bytes(request.into_body(), state.config.api.max_request_size_bytes)
        .await
        .map_err(|_| ApiError::invalid_field("body", "Request body too large"))?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok((Map::new(), None));
    }
    match serde_json::from_slice::<Value>(&bytes) {
        Ok(Value::Object(map)) => Ok((map, None)),
        Ok(_) => Err(ApiError::invalid_field("body", "Input should be a valid dictionary")),
        Err(_) => Err(ApiError::invalid_field("body", "Invalid JSON")),
    }
}

async fn decode_multipart(
    mut multipart: Multipart,
) -> Result<(Map<String, Value>, Option<UploadedFile>), ApiError> {
    let mut map = Map::new();
    let mut upload = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::invalid_field("body", e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let file_name = field.file_name().unwrap_or("upload").to_string();
            let content_type = field.content_type().map(str::to_string);
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::invalid_field("file", e.body_text()))?;
            upload = Some(UploadedFile {
                file_name,
                content_type,
                bytes,
            });
        } else {
            let text = field
                .text()
                .await
                .map_err(|e| ApiError::invalid_field(name.clone(), e.body_text()))?;
            map.insert(name, Value::String(text));
        }
    }

    Ok((map, upload))
}

async fn root(State(state): State<AppState>) -> Json<Value> {
    let endpoints: Vec<Value> = state
        .dispatcher
        .table()
        .iter()
        .map(|d| {
            json!({
                "name": d.name,
                "methods": d.methods,
                "allow_guest": d.allow_guest,
                "schema": d.schema.as_ref().map(|s| s.name()),
            })
        })
        .collect();

    Json(json!({
        "name": "ESS Mobile API",
        "version": env!("CARGO_PKG_VERSION"),
        "environment": state.config.environment,
        "store": state.dispatcher.store().backend(),
        "routes": {
            "mobile": "/api/mobile/v2?type=<endpoint> or /api/mobile/v2/<endpoint>",
            "health": "/health",
        },
        "endpoints": endpoints,
    }))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let now = chrono::Utc::now();
    let store = state.dispatcher.store();

    match store.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "timestamp": now,
                "store": store.backend(),
            })),
        ),
        Err(e) => {
            tracing::warn!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "degraded",
                    "timestamp": now,
                    "store": store.backend(),
                    "error": e.to_string(),
                })),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn payload_prefers_data_key() {
        assert_eq!(
            extract_payload(map(json!({"data": {"usr": "a"}, "other": 1}))).unwrap(),
            map(json!({"usr": "a"}))
        );
        assert_eq!(
            extract_payload(map(json!({"data": "{\"usr\": \"a\"}"}))).unwrap(),
            map(json!({"usr": "a"}))
        );
        assert_eq!(extract_payload(map(json!({"usr": "a"}))).unwrap(), map(json!({"usr": "a"})));
        assert!(extract_payload(map(json!({}))).unwrap().is_empty());
    }

    #[test]
    fn malformed_data_is_a_validation_error() {
        let err = extract_payload(map(json!({"data": "[1, 2]"}))).unwrap_err();
        assert_eq!(err.to_string(), "Validation error: data: Input should be a valid dictionary");
        assert_eq!(err.status_code(), 400);
    }
}
