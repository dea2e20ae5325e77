//! REST boundary, specified at the seam only.
//!
//! The engine never performs HTTP itself; it hands the collaborator a
//! request carrying the session id it minted so the server can stamp that id
//! onto the corresponding broadcast message.

use fieldlink_core::kind::ResourceKind;
use fieldlink_core::resource::{ResourceBody, ResourceId};
use fieldlink_core::session::SessionId;
use thiserror::Error;

/// The server's authoritative rendition of a saved resource. The server may
/// normalize fields, so this body replaces the one that was sent.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedResource {
    pub id: ResourceId,
    pub body: ResourceBody,
}

/// Save failures are recoverable: the lifecycle rolls the resource back to
/// dirty and the error is surfaced out-of-band for UI display.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("network failure: {0}")]
    Network(String),

    #[error("rejected by server: {0}")]
    Rejected(String),
}

/// Operations the engine consumes from the REST collaborator.
pub trait ResourceTransport {
    fn create(
        &self,
        kind: ResourceKind,
        body: ResourceBody,
        session: SessionId,
    ) -> impl Future<Output = Result<SavedResource, TransportError>>;

    fn update(
        &self,
        kind: ResourceKind,
        id: ResourceId,
        body: ResourceBody,
        session: SessionId,
    ) -> impl Future<Output = Result<SavedResource, TransportError>>;

    fn destroy(
        &self,
        kind: ResourceKind,
        id: ResourceId,
        session: SessionId,
    ) -> impl Future<Output = Result<(), TransportError>>;
}
