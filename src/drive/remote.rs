use futures::future::BoxFuture;

use crate::auth::CloudCredential;
use crate::error::Result;
use crate::recording::Artifact;

/// Cloud drive operations needed by the resolver and the registry.
pub trait RemoteStore: Send + Sync {
    /// Uploads the artifact under `file_name` and returns the remote file id
    fn upload<'a>(
        &'a self,
        credential: &'a CloudCredential,
        file_name: &'a str,
        artifact: &'a Artifact,
    ) -> BoxFuture<'a, Result<String>>;

    fn delete<'a>(&'a self, credential: &'a CloudCredential, file_id: &'a str) -> BoxFuture<'a, Result<()>>;

    fn rename<'a>(
        &'a self,
        credential: &'a CloudCredential,
        file_id: &'a str,
        name: &'a str,
    ) -> BoxFuture<'a, Result<()>>;

    /// Connectivity check; any answer from the service counts as online
    fn is_reachable(&self) -> BoxFuture<'_, bool>;
}
