use crate::kind::ResourceKind;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum Error {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),

    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),
}

/// Invariant violations in index usage.
///
/// These are programming errors, not recoverable conditions: they are never
/// caught locally and propagate to the caller or crash reporter, since
/// recovering from them would mask a real bug in the calling code.
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("resource not found: {uuid}")]
    ResourceNotFound { uuid: Uuid },

    #[error("mixed-kind batch: expected {expected}, found {found}")]
    MixedKindBatch {
        expected: ResourceKind,
        found: ResourceKind,
    },

    #[error("server id already mapped: {kind}.{id} is {existing}, incoming {incoming}")]
    DuplicateServerId {
        kind: ResourceKind,
        id: i64,
        existing: Uuid,
        incoming: Uuid,
    },
}

/// Push-channel transport corruption.
///
/// Malformed payloads are thrown to the caller, logged, and the message
/// dropped: fail-loud but non-fatal to the engine. Topology noise (wrong
/// segment count, unknown kinds) is classified by the router instead and
/// never raised as an error.
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("malformed payload on {topic}: {reason}")]
    MalformedPayload { topic: String, reason: String },

    #[error("unreadable {kind} body: {reason}")]
    BodyDecode { kind: ResourceKind, reason: String },
}

impl ChannelError {
    pub fn malformed(topic: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedPayload {
            topic: topic.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    NotFound { path: String },

    #[error("failed to parse config: {0}")]
    ParseError(String),

    #[error("invalid config value: {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("snapshot encode failed: {0}")]
    Encode(String),

    #[error("snapshot decode failed: {0}")]
    Decode(String),

    #[error("snapshot version {found} unsupported (expected {expected})")]
    VersionMismatch { found: u32, expected: u32 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl SnapshotError {
    /// Convenience constructor for decode errors — use with `.map_err(SnapshotError::decode)`.
    pub fn decode<E: std::fmt::Display>(e: E) -> Self {
        Self::Decode(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
