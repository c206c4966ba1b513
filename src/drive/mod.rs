//! Google Drive integration
//!
//! - `remote`: the `RemoteStore` seam used by the resolver and registry
//! - `client`: reqwest implementation against the Drive v3 REST API

mod client;
mod remote;

pub use client::{DriveClient, DriveConfig, DriveFile, FileMetadata};
pub use remote::RemoteStore;
