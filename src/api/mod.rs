pub mod events;
pub mod routes;

use std::sync::Arc;

use crate::auth::DriveAuthenticator;
use crate::controller::RecordingController;
use crate::storage::RecordingsRegistry;

/// Shared handles behind every route.
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<RecordingController>,
    pub registry: Arc<RecordingsRegistry>,
    pub auth: Arc<DriveAuthenticator>,
}

pub use routes::routes;
