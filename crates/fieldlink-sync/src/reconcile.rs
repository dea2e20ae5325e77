//! Reconciliation of routed channel messages against the local replica.

use crate::outstanding::OutstandingRequests;
use crate::router::Routed;
use fieldlink_core::error::{Error, IndexError};
use fieldlink_core::kind::ResourceKind;
use fieldlink_core::resource::{Resource, ResourceBody, ResourceId, SpecialStatus};
use fieldlink_core::session::SessionId;
use fieldlink_state::index::ResourceIndex;
use fieldlink_state::pipeline::UpsertStrategy;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

/// What reconciling one message did to the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// Skipped or malformed-topic traffic; nothing touched.
    Ignored,
    /// A genuine external change was merged in.
    Applied { uuid: Uuid, created: bool },
    /// The message echoed a tracked local write; application was suppressed
    /// because the REST flow already applied this exact change.
    EchoSuppressed { uuid: Option<Uuid> },
    Deleted { uuid: Uuid },
    /// Delete for an id that was never indexed.
    DeleteNoop,
}

pub fn apply_routed(
    index: &mut ResourceIndex,
    outstanding: &mut OutstandingRequests,
    routed: Routed,
) -> Result<Reconciliation, Error> {
    match routed {
        Routed::Skip | Routed::Invalid { .. } => Ok(Reconciliation::Ignored),
        Routed::Update {
            kind,
            id,
            body,
            session,
        } => handle_create_or_update(index, outstanding, kind, id, body, session),
        Routed::Delete { kind, id, session } => {
            handle_delete(index, outstanding, kind, id, session)
        }
    }
}

/// Merge an `Update`: edit-and-mark-saved when the addressed resource exists,
/// otherwise synthesize a new resource under a fresh UUID.
///
/// Echo suppression is independent of that branch: when the session id is
/// tracked, the body is not re-applied, but the `(kind, id) → uuid` mapping is
/// still brought up to date so subsequent messages addressing this id resolve
/// correctly even before the REST response has landed.
fn handle_create_or_update(
    index: &mut ResourceIndex,
    outstanding: &mut OutstandingRequests,
    kind: ResourceKind,
    id: ResourceId,
    body: Value,
    session: Option<SessionId>,
) -> Result<Reconciliation, Error> {
    let known = index.lookup_uuid(kind, id);

    if let Some(session) = session.filter(|s| outstanding.is_outstanding(s)) {
        let tracked = outstanding.end(&session);
        if known.is_none() {
            if let Some(uuid) = tracked {
                pin_server_id(index, kind, uuid, id)?;
            }
        }
        debug!(%kind, id, "suppressed echo of local write");
        return Ok(Reconciliation::EchoSuppressed {
            uuid: known.or(tracked),
        });
    }

    let body = ResourceBody::from_wire(kind, body)?;
    match known {
        Some(uuid) => {
            let current = index
                .get_by_uuid(&uuid)
                .ok_or(IndexError::ResourceNotFound { uuid })?;
            let mut updated = current.clone();
            updated.id = Some(id);
            updated.body = body;
            // a non-echo remote change is by definition not locally dirty
            updated.special_status = SpecialStatus::Saved;
            index.upsert(kind, vec![updated], UpsertStrategy::Ongoing)?;
            Ok(Reconciliation::Applied {
                uuid,
                created: false,
            })
        }
        None => {
            let resource = Resource::remote(id, body);
            let uuid = resource.uuid;
            index.upsert(kind, vec![resource], UpsertStrategy::Ongoing)?;
            Ok(Reconciliation::Applied { uuid, created: true })
        }
    }
}

/// Stamp the server id onto the locally-created resource an echo arrived
/// for before its REST response did.
fn pin_server_id(
    index: &mut ResourceIndex,
    kind: ResourceKind,
    uuid: Uuid,
    id: ResourceId,
) -> Result<(), IndexError> {
    let Some(current) = index.get_by_uuid(&uuid) else {
        return Ok(());
    };
    if current.id.is_some() {
        return Ok(());
    }
    let mut updated = current.clone();
    updated.id = Some(id);
    index.upsert(kind, vec![updated], UpsertStrategy::Ongoing)
}

fn handle_delete(
    index: &mut ResourceIndex,
    outstanding: &mut OutstandingRequests,
    kind: ResourceKind,
    id: ResourceId,
    session: Option<SessionId>,
) -> Result<Reconciliation, Error> {
    if let Some(session) = session {
        // the echo of a local destroy; removal below is idempotent either way
        outstanding.end(&session);
    }
    match index.lookup_uuid(kind, id) {
        Some(uuid) => {
            index.remove(uuid)?;
            Ok(Reconciliation::Deleted { uuid })
        }
        None => Ok(Reconciliation::DeleteNoop),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldlink_core::resource::PointBody;
    use serde_json::json;
    use std::time::Duration;

    fn tracker() -> OutstandingRequests {
        OutstandingRequests::new(Duration::from_secs(60))
    }

    fn point_update(id: ResourceId, name: &str, session: Option<SessionId>) -> Routed {
        Routed::Update {
            kind: ResourceKind::Point,
            id,
            body: json!({"name": name}),
            session,
        }
    }

    #[test]
    fn genuine_remote_insert_creates_saved_resource() {
        let mut index = ResourceIndex::new();
        let mut outstanding = tracker();

        let result =
            apply_routed(&mut index, &mut outstanding, point_update(9, "beet", None)).unwrap();
        let Reconciliation::Applied { uuid, created: true } = result else {
            panic!("expected creation, got {result:?}");
        };
        let r = index.get_by_uuid(&uuid).unwrap();
        assert_eq!(r.id, Some(9));
        assert_eq!(r.special_status, SpecialStatus::Saved);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn remote_update_overwrites_existing_by_server_id() {
        let mut index = ResourceIndex::new();
        let mut outstanding = tracker();
        let existing = Resource::remote(
            9,
            ResourceBody::Point(PointBody {
                name: "old".into(),
                ..Default::default()
            }),
        );
        let uuid = existing.uuid;
        index
            .upsert(ResourceKind::Point, vec![existing], UpsertStrategy::Ongoing)
            .unwrap();

        let result =
            apply_routed(&mut index, &mut outstanding, point_update(9, "new", None)).unwrap();
        assert_eq!(
            result,
            Reconciliation::Applied {
                uuid,
                created: false
            }
        );
        match &index.get_by_uuid(&uuid).unwrap().body {
            ResourceBody::Point(b) => assert_eq!(b.name, "new"),
            other => panic!("unexpected body: {other:?}"),
        }
        assert_eq!(index.len(), 1, "no duplicate insertion");
    }

    #[test]
    fn echo_is_suppressed_but_session_is_retired() {
        let mut index = ResourceIndex::new();
        let mut outstanding = tracker();
        let existing = Resource::remote(
            9,
            ResourceBody::Point(PointBody {
                name: "applied via rest".into(),
                ..Default::default()
            }),
        );
        let uuid = existing.uuid;
        index
            .upsert(ResourceKind::Point, vec![existing], UpsertStrategy::Ongoing)
            .unwrap();
        let session = outstanding.begin(uuid);

        let result = apply_routed(
            &mut index,
            &mut outstanding,
            point_update(9, "stale echo", Some(session)),
        )
        .unwrap();
        assert_eq!(result, Reconciliation::EchoSuppressed { uuid: Some(uuid) });
        match &index.get_by_uuid(&uuid).unwrap().body {
            ResourceBody::Point(b) => assert_eq!(b.name, "applied via rest"),
            other => panic!("unexpected body: {other:?}"),
        }
        assert!(!outstanding.is_outstanding(&session));
    }

    #[test]
    fn echo_before_rest_response_pins_the_server_id() {
        let mut index = ResourceIndex::new();
        let mut outstanding = tracker();
        let local = Resource::local(ResourceBody::Point(PointBody {
            name: "mine".into(),
            ..Default::default()
        }));
        let uuid = local.uuid;
        index
            .upsert(ResourceKind::Point, vec![local], UpsertStrategy::Ongoing)
            .unwrap();
        let session = outstanding.begin(uuid);

        let result = apply_routed(
            &mut index,
            &mut outstanding,
            point_update(7, "server copy", Some(session)),
        )
        .unwrap();
        assert_eq!(result, Reconciliation::EchoSuppressed { uuid: Some(uuid) });

        // the mapping now resolves, the body was not touched, and no
        // duplicate resource appeared
        assert_eq!(index.lookup_uuid(ResourceKind::Point, 7), Some(uuid));
        match &index.get_by_uuid(&uuid).unwrap().body {
            ResourceBody::Point(b) => assert_eq!(b.name, "mine"),
            other => panic!("unexpected body: {other:?}"),
        }
        assert_eq!(index.len(), 1);

        // a follow-up message addressing id 7 reaches the same resource
        let result =
            apply_routed(&mut index, &mut outstanding, point_update(7, "newer", None)).unwrap();
        assert_eq!(
            result,
            Reconciliation::Applied {
                uuid,
                created: false
            }
        );
    }

    #[test]
    fn expired_session_is_treated_as_external_change() {
        let mut index = ResourceIndex::new();
        let mut outstanding = OutstandingRequests::new(Duration::ZERO);
        let session = outstanding.begin(Uuid::new_v4());

        let result = apply_routed(
            &mut index,
            &mut outstanding,
            point_update(3, "late echo", Some(session)),
        )
        .unwrap();
        assert!(matches!(
            result,
            Reconciliation::Applied { created: true, .. }
        ));
    }

    #[test]
    fn delete_removes_and_noops_when_absent() {
        let mut index = ResourceIndex::new();
        let mut outstanding = tracker();
        let existing = Resource::remote(4, ResourceBody::Point(PointBody::default()));
        let uuid = existing.uuid;
        index
            .upsert(ResourceKind::Point, vec![existing], UpsertStrategy::Ongoing)
            .unwrap();

        let delete = Routed::Delete {
            kind: ResourceKind::Point,
            id: 4,
            session: None,
        };
        assert_eq!(
            apply_routed(&mut index, &mut outstanding, delete.clone()).unwrap(),
            Reconciliation::Deleted { uuid }
        );
        assert!(index.is_empty());
        assert_eq!(
            apply_routed(&mut index, &mut outstanding, delete).unwrap(),
            Reconciliation::DeleteNoop
        );
    }

    #[test]
    fn skip_and_invalid_touch_nothing() {
        let mut index = ResourceIndex::new();
        let mut outstanding = tracker();
        assert_eq!(
            apply_routed(&mut index, &mut outstanding, Routed::Skip).unwrap(),
            Reconciliation::Ignored
        );
        assert_eq!(
            apply_routed(
                &mut index,
                &mut outstanding,
                Routed::Invalid {
                    reason: "noise".into()
                }
            )
            .unwrap(),
            Reconciliation::Ignored
        );
        assert!(index.is_empty());
    }
}
