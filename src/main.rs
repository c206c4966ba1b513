use std::sync::Arc;
use std::time::Duration;

use cloud_capture::api::{self, AppState};
use cloud_capture::auth::{CredentialStore, DeviceFlow, DriveAuthenticator};
use cloud_capture::config::Config;
use cloud_capture::controller::RecordingController;
use cloud_capture::drive::{DriveClient, RemoteStore};
use cloud_capture::error::Result;
use cloud_capture::recording::{CaptureSession, ScreenCapture};
use cloud_capture::storage::{KvStore, RecordingsRegistry, StorageResolver};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(e) = run().await {
        tracing::error!(code = e.code(), error = %e, "cloud-capture exited with an error");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "cloud_capture=info,warp=warn".into());
    let registry = tracing_subscriber::registry().with(filter);

    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn run() -> Result<()> {
    let config = Config::from_env()?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting cloud-capture");

    let kv = KvStore::open(config.storage.state_dir())?;
    let credentials = Arc::new(CredentialStore::new(kv.clone()));
    let remote: Arc<dyn RemoteStore> = Arc::new(DriveClient::new(config.drive.clone())?);
    let registry = Arc::new(RecordingsRegistry::new(kv, remote.clone(), credentials.clone()));
    let resolver = StorageResolver::new(registry.clone(), remote.clone(), config.storage.media_dir());

    let request = config.capture.request();
    let source = ScreenCapture::new(config.capture.clone())?;
    let session = CaptureSession::new(Box::new(source), request);
    let controller = Arc::new(RecordingController::new(
        session,
        resolver,
        remote,
        credentials.clone(),
        config.storage.preferred,
    ));

    let connectivity = controller.spawn_connectivity_monitor(Duration::from_secs(
        config.drive.connectivity_interval_secs,
    ));

    let flow = match config.oauth.clone() {
        Some(oauth) => Some(DeviceFlow::new(oauth)?),
        None => {
            tracing::warn!("GOOGLE_CLIENT_ID is not set; recordings will be saved locally");
            None
        }
    };
    let auth = Arc::new(DriveAuthenticator::new(flow, credentials));

    let state = AppState {
        controller: controller.clone(),
        registry,
        auth,
    };

    let (address, server) = warp::serve(api::routes(state))
        .try_bind_with_graceful_shutdown(config.bind_address(), async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
        })
        .map_err(|e| cloud_capture::CaptureError::network(format!("Failed to bind: {}", e)))?;

    tracing::info!(
        address = %address,
        data_dir = %config.storage.data_dir.display(),
        preferred_storage = %config.storage.preferred,
        "Control API listening"
    );
    server.await;

    connectivity.abort();
    controller.shutdown().await;
    tracing::info!("cloud-capture stopped");
    Ok(())
}
