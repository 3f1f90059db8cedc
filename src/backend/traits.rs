use async_trait::async_trait;
use thiserror::Error;

use crate::event::{EndpointId, StoredEvent};
use crate::tree::BucketDigest;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("backend I/O failure: {0}")]
    Io(String),
}

/// Durable store collaborator, keyed per endpoint.
///
/// The backend persists raw events and, optionally, computed digest entries.
/// Digest persistence is an optimization only: the digest cache can always be
/// rebuilt from the event set, so the default `put_digests`/`load_digests`
/// implementations do nothing.
#[async_trait]
pub trait EventBackend: Send + Sync {
    /// Upsert an event, keyed by `(endpoint, event.id)`.
    async fn put_event(&self, endpoint: EndpointId, event: &StoredEvent)
        -> Result<(), BackendError>;

    /// Delete an event if present; deleting an absent event is not an error.
    async fn delete_event(&self, endpoint: EndpointId, id: &str) -> Result<(), BackendError>;

    /// Retrieve the full event set for an endpoint.
    async fn load_events(&self, endpoint: EndpointId) -> Result<Vec<StoredEvent>, BackendError>;

    /// Persist computed digest entries keyed by `(endpoint, path)`.
    async fn put_digests(
        &self,
        _endpoint: EndpointId,
        _digests: &[BucketDigest],
    ) -> Result<(), BackendError> {
        Ok(())
    }

    /// Retrieve persisted digest entries for an endpoint.
    async fn load_digests(
        &self,
        _endpoint: EndpointId,
    ) -> Result<Vec<BucketDigest>, BackendError> {
        Ok(Vec::new())
    }
}
