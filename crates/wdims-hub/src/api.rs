use crate::hub::HubState;
use axum::{
    extract::{ws::WebSocketUpgrade, ConnectInfo, Path, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc};
use tracing::{info, warn};
use wdims_core::{DisplaySettings, EngineConfig, ErrorKind, Profile};
use wdims_storage::StoreError;

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: ErrorKind,
    message: String,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    kind: ErrorKind,
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::InvalidName => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::AlreadyExists => StatusCode::CONFLICT,
        ErrorKind::Io | ErrorKind::Parse => StatusCode::INTERNAL_SERVER_ERROR,
        ErrorKind::Transport => StatusCode::BAD_GATEWAY,
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let kind = err.kind();
        Self {
            status: status_for(kind),
            kind,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            warn!(event = "api_error", status = self.status.as_u16(), kind = %self.kind, error = %self.message);
        }
        let body = ErrorBody {
            error: &self.message,
            kind: self.kind,
        };
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageBody {
    pub message: String,
}

fn message(text: impl Into<String>) -> Json<MessageBody> {
    Json(MessageBody {
        message: text.into(),
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateProfileRequest {
    name: String,
    #[serde(default)]
    copy_from: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewNameRequest {
    new_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveProfileBody {
    pub profile_name: String,
}

pub fn router(hub: Arc<HubState>) -> Router {
    Router::new()
        .route("/api/profiles", get(list_profiles).post(create_profile))
        .route(
            "/api/profiles/active/current",
            get(get_active_profile).put(set_active_profile),
        )
        .route(
            "/api/profiles/:name",
            get(get_profile).delete(delete_profile),
        )
        .route(
            "/api/profiles/:name/display-settings",
            put(update_display_settings),
        )
        .route(
            "/api/profiles/:name/search-engines",
            put(update_engine_config),
        )
        .route("/api/profiles/:name/clone", post(clone_profile))
        .route("/api/profiles/:name/rename", put(rename_profile))
        .route("/ws", get(ws_handler))
        .route("/health", get(|| async { "ok" }))
        .route_layer(middleware::from_fn(require_loopback))
        .with_state(hub)
}

async fn require_loopback(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    if !addr.ip().is_loopback() {
        warn!(event = "non_loopback_rejected", peer = %addr, path = %request.uri().path());
        return StatusCode::FORBIDDEN.into_response();
    }
    next.run(request).await
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(hub): State<Arc<HubState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        hub.handle_socket(socket, addr).await;
    })
}

async fn list_profiles(State(hub): State<Arc<HubState>>) -> ApiResult<Json<Vec<String>>> {
    let names = hub.with_store(|store| Ok(store.list_profiles())).await?;
    Ok(Json(names.into_iter().collect()))
}

async fn get_profile(
    State(hub): State<Arc<HubState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<Profile>> {
    let profile = hub.with_store(move |store| store.get_profile(&name)).await?;
    Ok(Json(profile))
}

async fn create_profile(
    State(hub): State<Arc<HubState>>,
    Json(body): Json<CreateProfileRequest>,
) -> ApiResult<(StatusCode, Json<MessageBody>)> {
    let copy_from = body.copy_from.filter(|source| !source.is_empty());
    let name = body.name.clone();
    hub.with_store(move |store| store.create_profile(&name, copy_from.as_deref()))
        .await?;
    Ok((
        StatusCode::CREATED,
        message(format!("Profile {} created", body.name)),
    ))
}

async fn update_display_settings(
    State(hub): State<Arc<HubState>>,
    Path(name): Path<String>,
    Json(settings): Json<DisplaySettings>,
) -> ApiResult<Json<MessageBody>> {
    hub.with_store(move |store| store.update_display_settings(&name, &settings))
        .await?;
    Ok(message("Display settings updated"))
}

async fn update_engine_config(
    State(hub): State<Arc<HubState>>,
    Path(name): Path<String>,
    Json(config): Json<EngineConfig>,
) -> ApiResult<Json<MessageBody>> {
    hub.with_store(move |store| store.update_engine_config(&name, &config))
        .await?;
    Ok(message("Search engines updated"))
}

async fn delete_profile(
    State(hub): State<Arc<HubState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<MessageBody>> {
    let target = name.clone();
    hub.with_store(move |store| store.delete_profile(&target))
        .await?;
    Ok(message(format!("Profile {name} deleted")))
}

async fn clone_profile(
    State(hub): State<Arc<HubState>>,
    Path(name): Path<String>,
    Json(body): Json<NewNameRequest>,
) -> ApiResult<(StatusCode, Json<MessageBody>)> {
    let new_name = body.new_name.clone();
    hub.with_store(move |store| store.clone_profile(&name, &new_name))
        .await?;
    Ok((
        StatusCode::CREATED,
        message(format!("Profile cloned to {}", body.new_name)),
    ))
}

async fn rename_profile(
    State(hub): State<Arc<HubState>>,
    Path(name): Path<String>,
    Json(body): Json<NewNameRequest>,
) -> ApiResult<Json<MessageBody>> {
    let new_name = body.new_name.clone();
    hub.with_store(move |store| store.rename_profile(&name, &new_name))
        .await?;
    Ok(message(format!("Profile renamed to {}", body.new_name)))
}

async fn get_active_profile(State(hub): State<Arc<HubState>>) -> ApiResult<Json<ActiveProfileBody>> {
    let profile_name = hub
        .with_store(|store| Ok(store.get_active_profile()))
        .await?;
    Ok(Json(ActiveProfileBody { profile_name }))
}

async fn set_active_profile(
    State(hub): State<Arc<HubState>>,
    Json(body): Json<ActiveProfileBody>,
) -> ApiResult<Json<MessageBody>> {
    let name = body.profile_name.clone();
    hub.with_store(move |store| store.set_active_profile(&name))
        .await?;
    info!(event = "active_profile_changed", profile = %body.profile_name);
    Ok(message("Active profile updated"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::HubConfig;
    use axum::{
        body::{to_bytes, Body},
        extract::connect_info::MockConnectInfo,
        http::{Method, Request as HttpRequest},
    };
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;
    use wdims_storage::ProfileStore;

    fn app_from(peer: [u8; 4]) -> (TempDir, Router) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = ProfileStore::open(dir.path());
        store.ensure_default_profile().expect("seed default");
        let hub = Arc::new(HubState::new(store, HubConfig::default()));
        let app = router(hub).layer(MockConnectInfo(SocketAddr::from((peer, 40000))));
        (dir, app)
    }

    fn app() -> (TempDir, Router) {
        app_from([127, 0, 0, 1])
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = HttpRequest::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                builder = builder.header("content-type", "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        let response = app
            .clone()
            .oneshot(builder.body(body).expect("request"))
            .await
            .expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn create_list_and_get() {
        let (_dir, app) = app();
        let (status, _) = call(&app, Method::POST, "/api/profiles", Some(json!({"name": "work"}))).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = call(&app, Method::GET, "/api/profiles", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!(["default", "work"]));

        let (status, body) = call(&app, Method::GET, "/api/profiles/work", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["displaySettings"]["theme"], "light");
        assert_eq!(body["engineConfig"]["tabs"], json!([]));
        assert!(body.get("warnings").is_none());
    }

    #[tokio::test]
    async fn create_with_empty_copy_from_uses_defaults() {
        let (_dir, app) = app();
        let (status, _) = call(
            &app,
            Method::POST,
            "/api/profiles",
            Some(json!({"name": "fresh", "copyFrom": ""})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = call(
            &app,
            Method::POST,
            "/api/profiles",
            Some(json!({"name": "fresh"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["kind"], "already_exists");
    }

    #[tokio::test]
    async fn error_statuses_follow_error_kind() {
        let (_dir, app) = app();
        let (status, body) = call(&app, Method::GET, "/api/profiles/ghost", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "not_found");
        assert!(body["error"].as_str().is_some());

        let (status, body) = call(&app, Method::GET, "/api/profiles/a%7Cb", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "invalid_name");

        let (status, body) = call(&app, Method::DELETE, "/api/profiles/default", None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["kind"], "forbidden");
    }

    #[tokio::test]
    async fn updates_replace_documents() {
        let (_dir, app) = app();
        let engines = json!({"tabs": [{"id": "t1", "name": "Web", "engines": [
            {"id": "e1", "name": "Search", "url": "https://example.com/?q={query}"}
        ]}]});
        let (status, _) = call(
            &app,
            Method::PUT,
            "/api/profiles/default/search-engines",
            Some(engines.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let mut settings = serde_json::to_value(DisplaySettings::default()).expect("json");
        settings["theme"] = json!("dark");
        let (status, _) = call(
            &app,
            Method::PUT,
            "/api/profiles/default/display-settings",
            Some(settings),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = call(&app, Method::GET, "/api/profiles/default", None).await;
        assert_eq!(body["engineConfig"], engines);
        assert_eq!(body["displaySettings"]["theme"], "dark");

        let (status, _) = call(
            &app,
            Method::PUT,
            "/api/profiles/ghost/search-engines",
            Some(engines),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn clone_rename_and_delete() {
        let (_dir, app) = app();
        let (status, _) = call(
            &app,
            Method::POST,
            "/api/profiles/default/clone",
            Some(json!({"newName": "copy"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, _) = call(
            &app,
            Method::PUT,
            "/api/profiles/copy/rename",
            Some(json!({"newName": "renamed"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = call(
            &app,
            Method::PUT,
            "/api/profiles/default/rename",
            Some(json!({"newName": "other"})),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = call(&app, Method::DELETE, "/api/profiles/renamed", None).await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = call(&app, Method::GET, "/api/profiles", None).await;
        assert_eq!(body, json!(["default"]));
    }

    #[tokio::test]
    async fn deleting_dot_is_rejected_and_keeps_profiles() {
        let (_dir, app) = app();
        call(&app, Method::POST, "/api/profiles", Some(json!({"name": "work"}))).await;

        let (status, body) = call(&app, Method::DELETE, "/api/profiles/%2E", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["kind"], "invalid_name");

        let (_, body) = call(&app, Method::GET, "/api/profiles", None).await;
        assert_eq!(body, json!(["default", "work"]));
        let (status, _) = call(&app, Method::GET, "/api/profiles/default", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn active_pointer_round_trip() {
        let (_dir, app) = app();
        let (status, body) = call(&app, Method::GET, "/api/profiles/active/current", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"profileName": "default"}));

        let (status, _) = call(
            &app,
            Method::PUT,
            "/api/profiles/active/current",
            Some(json!({"profileName": "work"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let (_, body) = call(&app, Method::GET, "/api/profiles/active/current", None).await;
        assert_eq!(body["profileName"], "work");

        let (status, _) = call(
            &app,
            Method::PUT,
            "/api/profiles/active/current",
            Some(json!({"profileName": "../x"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn non_loopback_peers_are_refused() {
        let (_dir, app) = app_from([10, 0, 0, 7]);
        let (status, _) = call(&app, Method::GET, "/api/profiles", None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
