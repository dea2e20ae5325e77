//! Inbound sync router: classify a channel message and extract its parts.

use crate::topic::{TopicOutcome, parse_topic};
use fieldlink_core::error::ChannelError;
use fieldlink_core::kind::ResourceKind;
use fieldlink_core::resource::ResourceId;
use fieldlink_core::session::SessionId;
use serde_json::Value;
use tracing::{debug, warn};

/// A classified push-channel message.
#[derive(Debug, Clone, PartialEq)]
pub enum Routed {
    /// Irrelevant channel traffic, or a kind the client intentionally
    /// ignores.
    Skip,
    /// Malformed topic shape; dropped silently as broker noise.
    Invalid { reason: String },
    Update {
        kind: ResourceKind,
        id: ResourceId,
        body: Value,
        session: Option<SessionId>,
    },
    Delete {
        kind: ResourceKind,
        id: ResourceId,
        session: Option<SessionId>,
    },
}

/// Decode one channel message.
///
/// Topology problems (wrong segment count, foreign marker, unknown or
/// excluded kinds) classify without touching the payload. A payload that
/// fails to decode, or that lacks a `body` field entirely, is transport
/// corruption and propagates as an error — `body: null` is the only delete
/// sentinel.
pub fn route(topic: &str, payload: &[u8]) -> Result<Routed, ChannelError> {
    let (kind_segment, id) = match parse_topic(topic) {
        TopicOutcome::Invalid { reason } => return Ok(Routed::Invalid { reason }),
        TopicOutcome::NotSync => return Ok(Routed::Skip),
        TopicOutcome::Sync { kind_segment, id } => (kind_segment, id),
    };

    let Some(kind) = ResourceKind::parse_kind(&kind_segment) else {
        debug!(kind = %kind_segment, "unknown kind on sync channel");
        return Ok(Routed::Skip);
    };
    if !kind.channel_synced() {
        // short-circuit before decoding; the index does not track this kind
        return Ok(Routed::Skip);
    }

    let document: Value = serde_json::from_slice(payload).map_err(|e| {
        warn!(topic, error = %e, "dropping corrupt sync payload");
        ChannelError::malformed(topic, e.to_string())
    })?;
    let Some(body) = document.get("body") else {
        // indistinguishable from a truncated document; do not guess "delete"
        warn!(topic, "sync payload missing body field");
        return Err(ChannelError::malformed(topic, "missing body field"));
    };

    let session = document
        .get("args")
        .and_then(|args| args.get("label"))
        .and_then(Value::as_str)
        .and_then(SessionId::parse);

    if body.is_null() {
        Ok(Routed::Delete { kind, id, session })
    } else {
        Ok(Routed::Update {
            kind,
            id,
            body: body.clone(),
            session,
        })
    }
}
