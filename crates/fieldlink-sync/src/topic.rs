//! Sync topic grammar: `<prefix>/<device>/sync/<Kind>/<id>`.

use fieldlink_core::constants::{NO_SERVER_ID, SYNC_MARKER, TOPIC_SEGMENT_COUNT};
use fieldlink_core::kind::ResourceKind;
use fieldlink_core::resource::ResourceId;

/// Outcome of parsing a channel topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicOutcome {
    /// Wrong segment count — expected noise from unrelated traffic sharing
    /// the broker.
    Invalid { reason: String },
    /// Five segments, but the marker segment carries something else; the
    /// channel multiplexes unrelated traffic.
    NotSync,
    /// Sync traffic addressed at one kind and server id.
    Sync { kind_segment: String, id: ResourceId },
}

pub fn parse_topic(topic: &str) -> TopicOutcome {
    let segments: Vec<&str> = topic.split('/').collect();
    if segments.len() != TOPIC_SEGMENT_COUNT {
        return TopicOutcome::Invalid {
            reason: format!(
                "expected {TOPIC_SEGMENT_COUNT} segments, got {}",
                segments.len()
            ),
        };
    }
    if segments[2] != SYNC_MARKER {
        return TopicOutcome::NotSync;
    }
    // unparsable ids resolve to the "no id yet" sentinel
    let id = segments[4].parse::<ResourceId>().unwrap_or(NO_SERVER_ID);
    TopicOutcome::Sync {
        kind_segment: segments[3].to_string(),
        id,
    }
}

/// Build the topic addressing one resource; the inverse of [`parse_topic`].
pub fn sync_topic(prefix: &str, device_id: &str, kind: ResourceKind, id: ResourceId) -> String {
    format!("{prefix}/{device_id}/{SYNC_MARKER}/{kind}/{id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrong_segment_count_is_invalid() {
        assert!(matches!(
            parse_topic("bot/device_1/sync/Sequence"),
            TopicOutcome::Invalid { .. }
        ));
        assert!(matches!(
            parse_topic("bot/device_1/sync/Sequence/7/extra"),
            TopicOutcome::Invalid { .. }
        ));
        assert!(matches!(parse_topic(""), TopicOutcome::Invalid { .. }));
    }

    #[test]
    fn non_marker_third_segment_is_not_sync() {
        assert_eq!(
            parse_topic("bot/device_1/logs/Sequence/7"),
            TopicOutcome::NotSync
        );
        assert_eq!(
            parse_topic("bot/device_1/status/Sequence/7"),
            TopicOutcome::NotSync
        );
    }

    #[test]
    fn sync_topics_parse_kind_segment_and_id() {
        assert_eq!(
            parse_topic("bot/device_1/sync/FarmEvent/23"),
            TopicOutcome::Sync {
                kind_segment: "FarmEvent".to_string(),
                id: 23,
            }
        );
    }

    #[test]
    fn unparsable_id_defaults_to_sentinel() {
        assert_eq!(
            parse_topic("bot/device_1/sync/Sequence/nope"),
            TopicOutcome::Sync {
                kind_segment: "Sequence".to_string(),
                id: NO_SERVER_ID,
            }
        );
    }

    #[test]
    fn build_parse_roundtrip() {
        let topic = sync_topic("bot", "device_9", ResourceKind::Regimen, 12);
        assert_eq!(topic, "bot/device_9/sync/Regimen/12");
        assert_eq!(
            parse_topic(&topic),
            TopicOutcome::Sync {
                kind_segment: "Regimen".to_string(),
                id: 12,
            }
        );
    }
}
