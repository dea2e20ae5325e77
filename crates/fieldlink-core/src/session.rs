use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Client-minted correlation token threaded through a write request and its
/// push-channel echo.
///
/// This is the only reliable correlation key between a local write and the
/// broadcast of its commit: server-assigned ids may not exist yet for
/// creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn mint() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse the `args.label` field of a channel payload. Returns `None` for
    /// anything that is not a UUID; such messages cannot be correlated and
    /// are treated as genuine external changes.
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
