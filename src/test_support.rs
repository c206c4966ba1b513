//! In-process doubles for the capture device, the cloud drive and the
//! OAuth provider.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt};
use tokio::sync::Notify;
use warp::Filter;

use crate::auth::{CloudCredential, OAuthConfig};
use crate::drive::RemoteStore;
use crate::error::{CaptureError, Result};
use crate::recording::{Artifact, CaptureRequest, CaptureSource};

pub const FAKE_MEDIA: &[u8] = b"fake-webm-media";

#[derive(Default)]
struct CaptureCounters {
    opens: AtomicUsize,
    releases: AtomicUsize,
    finishes: AtomicUsize,
    deny_next_open: AtomicBool,
    fail_next_finish: AtomicBool,
}

pub struct FakeCapture {
    counters: Arc<CaptureCounters>,
}

#[derive(Clone)]
pub struct FakeCaptureCounts {
    counters: Arc<CaptureCounters>,
}

impl FakeCapture {
    pub fn new() -> (Self, FakeCaptureCounts) {
        let counters = Arc::new(CaptureCounters::default());
        (
            Self {
                counters: counters.clone(),
            },
            FakeCaptureCounts { counters },
        )
    }
}

impl FakeCaptureCounts {
    pub fn opens(&self) -> usize {
        self.counters.opens.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.counters.releases.load(Ordering::SeqCst)
    }

    pub fn finishes(&self) -> usize {
        self.counters.finishes.load(Ordering::SeqCst)
    }

    pub fn deny_next_open(&self) {
        self.counters.deny_next_open.store(true, Ordering::SeqCst);
    }

    pub fn fail_next_finish(&self) {
        self.counters.fail_next_finish.store(true, Ordering::SeqCst);
    }
}

impl CaptureSource for FakeCapture {
    fn open(&mut self, _request: CaptureRequest) -> BoxFuture<'_, Result<()>> {
        async move {
            if self.counters.deny_next_open.swap(false, Ordering::SeqCst) {
                return Err(CaptureError::PermissionDenied("user dismissed the prompt".into()));
            }
            self.counters.opens.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        .boxed()
    }

    fn pause(&mut self) -> Result<()> {
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        Ok(())
    }

    fn finish(&mut self) -> BoxFuture<'_, Result<Artifact>> {
        async move {
            self.counters.finishes.fetch_add(1, Ordering::SeqCst);
            if self.counters.fail_next_finish.swap(false, Ordering::SeqCst) {
                return Err(CaptureError::platform("encoder stalled"));
            }
            Ok(Artifact::webm(FAKE_MEDIA))
        }
        .boxed()
    }

    fn release(&mut self) {
        self.counters.releases.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct RemoteLog {
    uploads: Vec<String>,
    renames: Vec<(String, String)>,
    deletes: Vec<String>,
    upload_status: Option<u16>,
    fail_mirrors: bool,
}

pub struct FakeRemote {
    log: Mutex<RemoteLog>,
    reachable: AtomicBool,
    gate: Mutex<Option<Arc<Notify>>>,
    upload_entered: Notify,
}

impl FakeRemote {
    pub fn new() -> Self {
        Self {
            log: Mutex::new(RemoteLog::default()),
            reachable: AtomicBool::new(true),
            gate: Mutex::new(None),
            upload_entered: Notify::new(),
        }
    }

    pub fn uploads(&self) -> Vec<String> {
        self.log.lock().unwrap().uploads.clone()
    }

    pub fn renames(&self) -> Vec<(String, String)> {
        self.log.lock().unwrap().renames.clone()
    }

    pub fn deletes(&self) -> Vec<String> {
        self.log.lock().unwrap().deletes.clone()
    }

    pub fn fail_uploads_with(&self, status: u16) {
        self.log.lock().unwrap().upload_status = Some(status);
    }

    pub fn fail_mirrors(&self) {
        self.log.lock().unwrap().fail_mirrors = true;
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Uploads block until the returned handle is notified.
    pub fn hold_uploads(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Resolves once an upload has started
    pub async fn upload_started(&self) {
        self.upload_entered.notified().await;
    }
}

impl RemoteStore for FakeRemote {
    fn upload<'a>(
        &'a self,
        _credential: &'a CloudCredential,
        file_name: &'a str,
        _artifact: &'a Artifact,
    ) -> BoxFuture<'a, Result<String>> {
        async move {
            self.upload_entered.notify_one();
            let gate = self.gate.lock().unwrap().clone();
            if let Some(gate) = gate {
                gate.notified().await;
            }

            let mut log = self.log.lock().unwrap();
            if let Some(status) = log.upload_status {
                return Err(CaptureError::UploadFailed(status));
            }
            log.uploads.push(file_name.to_string());
            Ok(format!("remote-{}", log.uploads.len()))
        }
        .boxed()
    }

    fn delete<'a>(&'a self, _credential: &'a CloudCredential, file_id: &'a str) -> BoxFuture<'a, Result<()>> {
        async move {
            let mut log = self.log.lock().unwrap();
            if log.fail_mirrors {
                return Err(CaptureError::DriveRequestFailed(503));
            }
            log.deletes.push(file_id.to_string());
            Ok(())
        }
        .boxed()
    }

    fn rename<'a>(
        &'a self,
        _credential: &'a CloudCredential,
        file_id: &'a str,
        name: &'a str,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            let mut log = self.log.lock().unwrap();
            if log.fail_mirrors {
                return Err(CaptureError::DriveRequestFailed(503));
            }
            log.renames.push((file_id.to_string(), name.to_string()));
            Ok(())
        }
        .boxed()
    }

    fn is_reachable(&self) -> BoxFuture<'_, bool> {
        let reachable = self.reachable.load(Ordering::SeqCst);
        async move { reachable }.boxed()
    }
}

/// OAuth device-flow endpoints on an ephemeral port.
///
/// The token endpoint answers `authorization_pending` for `pending_polls`
/// polls, then either grants or fails with `token_error`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FakeProvider {
    pub device_error: Option<&'static str>,
    pub token_error: Option<&'static str>,
    pub pending_polls: usize,
}

impl FakeProvider {
    pub fn granting(pending_polls: usize) -> Self {
        Self {
            pending_polls,
            ..Self::default()
        }
    }

    pub fn rejecting_device(code: &'static str) -> Self {
        Self {
            device_error: Some(code),
            ..Self::default()
        }
    }

    pub fn denying_token(code: &'static str) -> Self {
        Self {
            token_error: Some(code),
            ..Self::default()
        }
    }

    pub fn spawn(self) -> SocketAddr {
        let polls = Arc::new(AtomicUsize::new(0));

        let device = warp::post().and(warp::path!("device" / "code")).map(move || match self.device_error {
            Some(code) => warp::reply::with_status(
                warp::reply::json(&serde_json::json!({ "error": code })),
                warp::http::StatusCode::UNAUTHORIZED,
            ),
            None => warp::reply::with_status(
                warp::reply::json(&serde_json::json!({
                    "device_code": "dev-code",
                    "user_code": "WXYZ-1234",
                    "verification_url": "https://www.google.com/device",
                    "expires_in": 600,
                    "interval": 1
                })),
                warp::http::StatusCode::OK,
            ),
        });

        let token = warp::post().and(warp::path!("token")).map(move || {
            if polls.fetch_add(1, Ordering::SeqCst) < self.pending_polls {
                return warp::reply::with_status(
                    warp::reply::json(&serde_json::json!({ "error": "authorization_pending" })),
                    warp::http::StatusCode::PRECONDITION_REQUIRED,
                );
            }
            match self.token_error {
                Some(code) => warp::reply::with_status(
                    warp::reply::json(&serde_json::json!({
                        "error": code,
                        "error_description": "The user denied access"
                    })),
                    warp::http::StatusCode::FORBIDDEN,
                ),
                None => warp::reply::with_status(
                    warp::reply::json(&serde_json::json!({
                        "access_token": "ya29.granted",
                        "expires_in": 3599,
                        "token_type": "Bearer"
                    })),
                    warp::http::StatusCode::OK,
                ),
            }
        });

        let (addr, server) = warp::serve(device.or(token)).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);
        addr
    }
}

pub fn oauth_config_for(addr: SocketAddr) -> OAuthConfig {
    OAuthConfig {
        client_id: "client".into(),
        client_secret: None,
        device_url: format!("http://{}/device/code", addr),
        token_url: format!("http://{}/token", addr),
        scope: "https://www.googleapis.com/auth/drive.file".into(),
    }
}
