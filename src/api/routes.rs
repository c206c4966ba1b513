use std::convert::Infallible;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

use super::{events, AppState};
use crate::error::{CaptureError, Result};
use crate::storage::StorageType;

const MAX_BODY_BYTES: u64 = 16 * 1024;

#[derive(Debug, Deserialize)]
pub struct SaveRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub storage: Option<StorageType>,
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

/// Recorder commands addressable as `POST /recorder/{action}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderAction {
    Start,
    Pause,
    Resume,
    Stop,
    Discard,
}

impl FromStr for RecorderAction {
    type Err = CaptureError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "start" => Ok(Self::Start),
            "pause" => Ok(Self::Pause),
            "resume" => Ok(Self::Resume),
            "stop" => Ok(Self::Stop),
            "discard" => Ok(Self::Discard),
            other => Err(CaptureError::internal(format!("Unknown recorder action: {}", other))),
        }
    }
}

/// Every control API route, with rejections rendered as JSON errors.
pub fn routes(state: AppState) -> impl Filter<Extract = impl Reply, Error = Infallible> + Clone {
    health_check()
        .or(recorder_routes(state.clone()))
        .or(recordings_routes(state.clone()))
        .or(auth_routes(state))
        .recover(handle_rejection)
}

pub fn health_check() -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("health").and(warp::get()).map(|| {
        warp::reply::json(&serde_json::json!({
            "status": "healthy",
            "service": "cloud-capture",
            "version": env!("CARGO_PKG_VERSION")
        }))
    })
}

pub fn recorder_routes(state: AppState) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let snapshot = warp::path!("recorder")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(get_snapshot);

    let events = warp::path!("recorder" / "events")
        .and(warp::ws())
        .and(with_state(state.clone()))
        .map(|ws: warp::ws::Ws, state: AppState| {
            ws.on_upgrade(move |websocket| events::stream_snapshots(websocket, state.controller))
        });

    let save = warp::path!("recorder" / "save")
        .and(warp::post())
        .and(json_body::<SaveRequest>())
        .and(with_state(state.clone()))
        .and_then(save_recording);

    let command = warp::path!("recorder" / RecorderAction)
        .and(warp::post())
        .and(with_state(state))
        .and_then(run_command);

    snapshot.or(events).or(save).or(command)
}

pub fn recordings_routes(state: AppState) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let list = warp::path!("recordings")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(list_recordings);

    let rename = warp::path!("recordings" / String)
        .and(warp::patch())
        .and(json_body::<RenameRequest>())
        .and(with_state(state.clone()))
        .and_then(rename_recording);

    let delete = warp::path!("recordings" / String)
        .and(warp::delete())
        .and(with_state(state))
        .and_then(delete_recording);

    list.or(rename).or(delete)
}

pub fn auth_routes(state: AppState) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    let status = warp::path!("auth" / "drive")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(auth_status);

    let begin = warp::path!("auth" / "drive")
        .and(warp::post())
        .and(with_state(state.clone()))
        .and_then(begin_auth);

    let sign_out = warp::path!("auth" / "drive")
        .and(warp::delete())
        .and(with_state(state))
        .and_then(sign_out);

    status.or(begin).or(sign_out)
}

async fn get_snapshot(state: AppState) -> std::result::Result<Response, Infallible> {
    Ok(warp::reply::json(&state.controller.snapshot().await).into_response())
}

async fn run_command(action: RecorderAction, state: AppState) -> std::result::Result<Response, Infallible> {
    let controller = &state.controller;
    let result = match action {
        RecorderAction::Start => controller.start().await,
        RecorderAction::Pause => controller.pause().await,
        RecorderAction::Resume => controller.resume().await,
        RecorderAction::Stop => controller.stop().await,
        RecorderAction::Discard => controller.discard().await,
    };
    Ok(respond(result))
}

async fn save_recording(request: SaveRequest, state: AppState) -> std::result::Result<Response, Infallible> {
    Ok(respond(state.controller.save(&request.name, request.storage).await))
}

async fn list_recordings(state: AppState) -> std::result::Result<Response, Infallible> {
    Ok(respond(state.registry.list().await))
}

async fn rename_recording(
    id: String,
    request: RenameRequest,
    state: AppState,
) -> std::result::Result<Response, Infallible> {
    let result = match state.registry.rename(&id, &request.name).await {
        Ok(Some(recording)) => Ok(recording),
        Ok(None) => Err(CaptureError::RecordingNotFound(id)),
        Err(e) => Err(e),
    };
    Ok(respond(result))
}

async fn delete_recording(id: String, state: AppState) -> std::result::Result<Response, Infallible> {
    let result = match state.registry.delete(&id).await {
        Ok(Some(recording)) => Ok(recording),
        Ok(None) => Err(CaptureError::RecordingNotFound(id)),
        Err(e) => Err(e),
    };
    Ok(respond(result))
}

async fn auth_status(state: AppState) -> std::result::Result<Response, Infallible> {
    Ok(respond(state.auth.status().await))
}

async fn begin_auth(state: AppState) -> std::result::Result<Response, Infallible> {
    Ok(respond(state.auth.begin().await))
}

async fn sign_out(state: AppState) -> std::result::Result<Response, Infallible> {
    let result = match state.auth.sign_out().await {
        Ok(()) => state.auth.status().await,
        Err(e) => Err(e),
    };
    Ok(respond(result))
}

fn respond<T: Serialize>(result: Result<T>) -> Response {
    match result {
        Ok(value) => warp::reply::json(&value).into_response(),
        Err(e) => error_reply(&e),
    }
}

fn error_reply(err: &CaptureError) -> Response {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        tracing::error!(code = err.code(), error = %err, "Request failed");
    } else {
        tracing::debug!(code = err.code(), error = %err, "Request rejected");
    }

    let body = ErrorBody {
        code: err.code().to_string(),
        message: err.to_string(),
        remediation: err.remediation().map(str::to_string),
    };
    warp::reply::with_status(warp::reply::json(&body), status).into_response()
}

async fn handle_rejection(rejection: Rejection) -> std::result::Result<Response, Infallible> {
    let (status, code, message) = if rejection.is_not_found() {
        (StatusCode::NOT_FOUND, "NOT_FOUND", "No such route".to_string())
    } else if let Some(e) = rejection.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, "INVALID_REQUEST", e.to_string())
    } else if rejection.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE", "Request body too large".to_string())
    } else if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "METHOD_NOT_ALLOWED", "Method not allowed".to_string())
    } else {
        tracing::error!(rejection = ?rejection, "Unhandled rejection");
        (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", "Internal error".to_string())
    };

    let body = ErrorBody {
        code: code.to_string(),
        message,
        remediation: None,
    };
    Ok(warp::reply::with_status(warp::reply::json(&body), status).into_response())
}

fn json_body<T: serde::de::DeserializeOwned + Send>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone {
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}

fn with_state(state: AppState) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{CloudCredential, CredentialStore, DriveAuthenticator};
    use crate::controller::RecordingController;
    use crate::recording::{CaptureRequest, CaptureSession};
    use crate::storage::{KvStore, RecordingsRegistry, StorageResolver};
    use crate::test_support::{FakeCapture, FakeRemote};
    use std::sync::Arc;

    struct Fixture {
        _dir: tempfile::TempDir,
        state: AppState,
        credentials: Arc<CredentialStore>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let kv = KvStore::open(dir.path().join("state")).unwrap();
        let remote = Arc::new(FakeRemote::new());
        let credentials = Arc::new(CredentialStore::new(kv.clone()));
        let registry = Arc::new(RecordingsRegistry::new(kv, remote.clone(), credentials.clone()));
        let resolver = StorageResolver::new(registry.clone(), remote.clone(), dir.path().join("recordings"));
        let (capture, _counts) = FakeCapture::new();
        let session = CaptureSession::new(Box::new(capture), CaptureRequest::default());
        let controller = Arc::new(RecordingController::new(
            session,
            resolver,
            remote,
            credentials.clone(),
            StorageType::Local,
        ));
        let auth = Arc::new(DriveAuthenticator::new(None, credentials.clone()));

        Fixture {
            _dir: dir,
            state: AppState {
                controller,
                registry,
                auth,
            },
            credentials,
        }
    }

    fn json(response: &warp::http::Response<bytes::Bytes>) -> serde_json::Value {
        serde_json::from_slice(response.body()).unwrap()
    }

    #[tokio::test]
    async fn test_health_check() {
        let f = fixture();
        let response = warp::test::request()
            .method("GET")
            .path("/health")
            .reply(&routes(f.state))
            .await;

        assert_eq!(response.status(), 200);
        assert_eq!(json(&response)["status"], "healthy");
    }

    #[tokio::test]
    async fn test_record_and_save_over_http() {
        let f = fixture();
        let api = routes(f.state.clone());

        for action in ["start", "pause", "resume", "stop"] {
            let response = warp::test::request()
                .method("POST")
                .path(&format!("/recorder/{}", action))
                .reply(&api)
                .await;
            assert_eq!(response.status(), 200, "action {}", action);
        }

        let response = warp::test::request().method("GET").path("/recorder").reply(&api).await;
        assert_eq!(json(&response)["status"], "stopped");
        assert_eq!(json(&response)["hasArtifact"], true);
        assert_eq!(json(&response)["online"], true);

        let response = warp::test::request()
            .method("POST")
            .path("/recorder/save")
            .json(&serde_json::json!({ "name": "Weekly sync" }))
            .reply(&api)
            .await;
        assert_eq!(response.status(), 200);
        let outcome = json(&response);
        assert_eq!(outcome["destination"], "local");
        assert_eq!(outcome["recording"]["name"], "Weekly sync");
        assert_eq!(outcome["recording"]["location"]["kind"], "local");

        let response = warp::test::request().method("GET").path("/recordings").reply(&api).await;
        assert_eq!(json(&response).as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_save_without_recording_is_conflict() {
        let f = fixture();
        let response = warp::test::request()
            .method("POST")
            .path("/recorder/save")
            .json(&serde_json::json!({}))
            .reply(&routes(f.state))
            .await;

        assert_eq!(response.status(), 409);
        assert_eq!(json(&response)["code"], "NOTHING_TO_SAVE");
    }

    #[tokio::test]
    async fn test_unknown_action_is_not_found() {
        let f = fixture();
        let response = warp::test::request()
            .method("POST")
            .path("/recorder/rewind")
            .reply(&routes(f.state))
            .await;

        assert_eq!(response.status(), 404);
        assert_eq!(json(&response)["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_rename_and_delete_recordings() {
        let f = fixture();
        let api = routes(f.state.clone());
        f.state.controller.start().await.unwrap();
        f.state.controller.stop().await.unwrap();
        let saved = f.state.controller.save("Draft", None).await.unwrap().recording;

        let response = warp::test::request()
            .method("PATCH")
            .path(&format!("/recordings/{}", saved.id))
            .json(&serde_json::json!({ "name": "Final" }))
            .reply(&api)
            .await;
        assert_eq!(response.status(), 200);
        assert_eq!(json(&response)["name"], "Final");

        let response = warp::test::request()
            .method("PATCH")
            .path(&format!("/recordings/{}", saved.id))
            .json(&serde_json::json!({ "name": "  " }))
            .reply(&api)
            .await;
        assert_eq!(response.status(), 400);
        assert_eq!(json(&response)["code"], "INVALID_NAME");

        let response = warp::test::request()
            .method("DELETE")
            .path(&format!("/recordings/{}", saved.id))
            .reply(&api)
            .await;
        assert_eq!(response.status(), 200);

        let response = warp::test::request()
            .method("DELETE")
            .path(&format!("/recordings/{}", saved.id))
            .reply(&api)
            .await;
        assert_eq!(response.status(), 404);
        assert_eq!(json(&response)["code"], "RECORDING_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_auth_routes_without_client() {
        let f = fixture();
        let api = routes(f.state.clone());
        f.credentials
            .save(&CloudCredential::new("token", u64::MAX))
            .await
            .unwrap();

        let response = warp::test::request().method("GET").path("/auth/drive").reply(&api).await;
        assert_eq!(json(&response)["authenticated"], true);
        assert_eq!(json(&response)["configured"], false);

        let response = warp::test::request().method("POST").path("/auth/drive").reply(&api).await;
        assert_eq!(response.status(), 503);
        assert_eq!(json(&response)["code"], "AUTH_NOT_CONFIGURED");
        assert!(json(&response)["remediation"].is_string());

        let response = warp::test::request().method("DELETE").path("/auth/drive").reply(&api).await;
        assert_eq!(response.status(), 200);
        assert_eq!(json(&response)["authenticated"], false);
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request() {
        let f = fixture();
        let response = warp::test::request()
            .method("PATCH")
            .path("/recordings/local-1")
            .header("content-type", "application/json")
            .body("{not json")
            .reply(&routes(f.state))
            .await;

        assert_eq!(response.status(), 400);
        assert_eq!(json(&response)["code"], "INVALID_REQUEST");
    }
}
