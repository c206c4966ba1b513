// Shared fixtures for the integration tests: an in-memory capture source,
// an always-offline remote, a fake Drive server and an in-process daemon.

#![allow(dead_code)]

use std::net::{SocketAddr, TcpListener};
use std::sync::{Arc, Mutex};

use cloud_capture::api::{self, AppState};
use cloud_capture::auth::{CloudCredential, CredentialStore, DriveAuthenticator};
use cloud_capture::controller::RecordingController;
use cloud_capture::drive::RemoteStore;
use cloud_capture::error::{CaptureError, Result};
use cloud_capture::recording::{Artifact, CaptureRequest, CaptureSession, CaptureSource};
use cloud_capture::storage::{KvStore, RecordingsRegistry, StorageResolver, StorageType};
use futures::future::{BoxFuture, FutureExt};
use warp::Filter;

pub const MEDIA: &[u8] = b"integration-webm-media";

/// Capture source that records nothing and always finalizes to `MEDIA`.
pub struct ScriptedCapture;

impl CaptureSource for ScriptedCapture {
    fn open(&mut self, _request: CaptureRequest) -> BoxFuture<'_, Result<()>> {
        async { Ok(()) }.boxed()
    }

    fn pause(&mut self) -> Result<()> {
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        Ok(())
    }

    fn finish(&mut self) -> BoxFuture<'_, Result<Artifact>> {
        async { Ok(Artifact::webm(MEDIA)) }.boxed()
    }

    fn release(&mut self) {}
}

/// Remote that is never reachable.
pub struct OfflineRemote;

impl RemoteStore for OfflineRemote {
    fn upload<'a>(
        &'a self,
        _credential: &'a CloudCredential,
        _file_name: &'a str,
        _artifact: &'a Artifact,
    ) -> BoxFuture<'a, Result<String>> {
        async { Err(CaptureError::network("offline")) }.boxed()
    }

    fn delete<'a>(&'a self, _credential: &'a CloudCredential, _file_id: &'a str) -> BoxFuture<'a, Result<()>> {
        async { Err(CaptureError::network("offline")) }.boxed()
    }

    fn rename<'a>(
        &'a self,
        _credential: &'a CloudCredential,
        _file_id: &'a str,
        _name: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        async { Err(CaptureError::network("offline")) }.boxed()
    }

    fn is_reachable(&self) -> BoxFuture<'_, bool> {
        async { false }.boxed()
    }
}

pub struct Daemon {
    pub dir: tempfile::TempDir,
    pub state: AppState,
    pub credentials: Arc<CredentialStore>,
}

impl Daemon {
    pub fn new(remote: Arc<dyn RemoteStore>, preferred: StorageType) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let kv = KvStore::open(dir.path().join("state")).unwrap();
        let credentials = Arc::new(CredentialStore::new(kv.clone()));
        let registry = Arc::new(RecordingsRegistry::new(kv, remote.clone(), credentials.clone()));
        let resolver = StorageResolver::new(registry.clone(), remote.clone(), dir.path().join("recordings"));
        let session = CaptureSession::new(Box::new(ScriptedCapture), CaptureRequest::default());
        let controller = Arc::new(RecordingController::new(
            session,
            resolver,
            remote,
            credentials.clone(),
            preferred,
        ));
        let auth = Arc::new(DriveAuthenticator::new(None, credentials.clone()));

        Self {
            dir,
            state: AppState {
                controller,
                registry,
                auth,
            },
            credentials,
        }
    }

    pub fn controller(&self) -> &Arc<RecordingController> {
        &self.state.controller
    }

    pub async fn sign_in(&self) {
        self.credentials
            .save(&CloudCredential::new("integration-token", u64::MAX))
            .await
            .unwrap();
    }

    /// Serves the control API on an ephemeral port
    pub fn serve(&self) -> SocketAddr {
        let (addr, server) = warp::serve(api::routes(self.state.clone())).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);
        addr
    }
}

#[derive(Debug, Default)]
pub struct DriveLog {
    pub uploads: Vec<String>,
    pub renames: Vec<(String, String)>,
    pub deletes: Vec<String>,
}

/// Fake Drive v3 endpoints; upload ids are `file-1`, `file-2`, ...
pub fn spawn_fake_drive() -> (SocketAddr, Arc<Mutex<DriveLog>>) {
    let log = Arc::new(Mutex::new(DriveLog::default()));

    let upload_log = log.clone();
    let upload = warp::post()
        .and(warp::path!("upload" / "drive" / "v3" / "files"))
        .and(warp::body::bytes())
        .map(move |body: bytes::Bytes| {
            let body = String::from_utf8_lossy(&body);
            let name = body
                .split(r#""name":""#)
                .nth(1)
                .and_then(|rest| rest.split('"').next())
                .unwrap_or_default()
                .to_string();
            let mut log = upload_log.lock().unwrap();
            log.uploads.push(name);
            warp::reply::json(&serde_json::json!({ "id": format!("file-{}", log.uploads.len()) }))
        });

    let rename_log = log.clone();
    let rename = warp::patch()
        .and(warp::path!("drive" / "v3" / "files" / String))
        .and(warp::body::json())
        .map(move |id: String, body: serde_json::Value| {
            let name = body["name"].as_str().unwrap_or_default().to_string();
            rename_log.lock().unwrap().renames.push((id.clone(), name));
            warp::reply::json(&serde_json::json!({ "id": id }))
        });

    let delete_log = log.clone();
    let delete = warp::delete()
        .and(warp::path!("drive" / "v3" / "files" / String))
        .map(move |id: String| {
            delete_log.lock().unwrap().deletes.push(id);
            warp::reply::with_status(warp::reply(), warp::http::StatusCode::NO_CONTENT)
        });

    let (addr, server) = warp::serve(upload.or(rename).or(delete)).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);
    (addr, log)
}

/// An address nothing is listening on
pub fn closed_address() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}
