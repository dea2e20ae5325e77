//! End-to-end scenarios: local writes, REST round-trips, and channel echoes
//! interleaved in both orders.

use crate::engine::SyncEngine;
use crate::reconcile::Reconciliation;
use crate::rest::SavedResource;
use crate::topic::sync_topic;
use fieldlink_core::config::SyncConfig;
use fieldlink_core::kind::ResourceKind;
use fieldlink_core::resource::{
    PointBody, Resource, ResourceBody, ResourceId, SequenceBody, SpecialStatus,
};
use fieldlink_core::session::SessionId;
use serde_json::{Value, json};

fn engine() -> SyncEngine {
    SyncEngine::new(SyncConfig {
        device_id: "device_1".to_string(),
        ..Default::default()
    })
}

fn topic(kind: ResourceKind, id: ResourceId) -> String {
    sync_topic("bot", "device_1", kind, id)
}

fn payload(body: Value, session: Option<SessionId>) -> Vec<u8> {
    let label = session.map(|s| s.to_string()).unwrap_or_default();
    json!({ "body": body, "args": { "label": label } })
        .to_string()
        .into_bytes()
}

fn seq_body(name: &str) -> ResourceBody {
    ResourceBody::Sequence(SequenceBody {
        name: name.to_string(),
        ..Default::default()
    })
}

fn seq_wire(name: &str) -> Value {
    json!({ "name": name })
}

#[test]
fn create_via_rest_then_echo_arrives() {
    let mut engine = engine();
    let uuid = engine.create_local(seq_body("water bed A")).unwrap();
    let request = engine.begin_save(uuid).unwrap().unwrap();

    engine
        .finish_save(
            uuid,
            request.session,
            Ok(SavedResource {
                id: 7,
                body: seq_body("water bed A"),
            }),
        )
        .unwrap();
    assert_eq!(
        engine.index().lookup_uuid(ResourceKind::Sequence, 7),
        Some(uuid)
    );

    // the broadcast of our own create arrives later
    let outcome = engine
        .handle_message(
            &topic(ResourceKind::Sequence, 7),
            &payload(seq_wire("water bed A"), Some(request.session)),
        )
        .unwrap();

    assert_eq!(
        outcome,
        Reconciliation::EchoSuppressed { uuid: Some(uuid) }
    );
    assert_eq!(engine.index().len(), 1, "no duplicate insertion");
    assert_eq!(
        engine.index().lookup_uuid(ResourceKind::Sequence, 7),
        Some(uuid),
        "the mapping still points at the original resource"
    );
}

#[test]
fn echo_then_rest_response_applies_once_too() {
    let mut engine = engine();
    let uuid = engine.create_local(seq_body("water bed B")).unwrap();
    let request = engine.begin_save(uuid).unwrap().unwrap();

    // the broadcast outruns the REST response
    let outcome = engine
        .handle_message(
            &topic(ResourceKind::Sequence, 8),
            &payload(seq_wire("water bed B"), Some(request.session)),
        )
        .unwrap();
    assert_eq!(
        outcome,
        Reconciliation::EchoSuppressed { uuid: Some(uuid) }
    );
    assert_eq!(
        engine.index().lookup_uuid(ResourceKind::Sequence, 8),
        Some(uuid),
        "the echo pinned the server id onto the local resource"
    );

    engine
        .finish_save(
            uuid,
            request.session,
            Ok(SavedResource {
                id: 8,
                body: seq_body("water bed B"),
            }),
        )
        .unwrap();

    let r = engine.index().get_by_uuid(&uuid).unwrap();
    assert_eq!(r.id, Some(8));
    assert_eq!(r.special_status, SpecialStatus::Saved);
    assert_eq!(engine.index().len(), 1, "applied exactly once");
}

#[test]
fn edit_echo_applies_exactly_once() {
    let mut engine = engine();
    engine
        .load_kind(
            ResourceKind::Sequence,
            vec![Resource::remote(4, seq_body("before"))],
        )
        .unwrap();
    let uuid = engine
        .index()
        .lookup_uuid(ResourceKind::Sequence, 4)
        .unwrap();

    engine.edit(uuid, seq_body("after")).unwrap();
    let request = engine.begin_save(uuid).unwrap().unwrap();
    engine
        .finish_save(
            uuid,
            request.session,
            Ok(SavedResource {
                id: 4,
                body: seq_body("after"),
            }),
        )
        .unwrap();

    engine
        .handle_message(
            &topic(ResourceKind::Sequence, 4),
            &payload(seq_wire("after"), Some(request.session)),
        )
        .unwrap();

    let r = engine.index().get_by_uuid(&uuid).unwrap();
    assert_eq!(r.body, seq_body("after"), "edited once, not reverted");
    assert_eq!(r.special_status, SpecialStatus::Saved);
}

#[test]
fn genuine_remote_insert_grows_the_index() {
    let mut engine = engine();
    let before = engine.index().len();

    let outcome = engine
        .handle_message(
            &topic(ResourceKind::Sequence, 9),
            &payload(seq_wire("someone else's"), Some(SessionId::mint())),
        )
        .unwrap();

    let Reconciliation::Applied { uuid, created: true } = outcome else {
        panic!("expected a creation, got {outcome:?}");
    };
    assert_eq!(engine.index().len(), before + 1);
    assert_eq!(
        engine.index().get_by_uuid(&uuid).unwrap().special_status,
        SpecialStatus::Saved
    );
}

#[test]
fn remote_delete_wins_over_local_dirty_edit() {
    let mut engine = engine();
    engine
        .load_kind(
            ResourceKind::Sequence,
            vec![Resource::remote(4, seq_body("contested"))],
        )
        .unwrap();
    let uuid = engine
        .index()
        .lookup_uuid(ResourceKind::Sequence, 4)
        .unwrap();
    engine.edit(uuid, seq_body("my unsaved take")).unwrap();
    assert_eq!(
        engine.index().get_by_uuid(&uuid).unwrap().special_status,
        SpecialStatus::Dirty
    );

    let outcome = engine
        .handle_message(
            &topic(ResourceKind::Sequence, 4),
            &payload(Value::Null, None),
        )
        .unwrap();

    assert_eq!(outcome, Reconciliation::Deleted { uuid });
    assert!(engine.index().get_by_uuid(&uuid).is_none());
    assert!(engine.index().is_empty());
    assert!(engine.index().consistency_violations().is_empty());
}

#[test]
fn delete_echo_after_confirmed_destroy_is_a_noop() {
    let mut engine = engine();
    engine
        .load_kind(
            ResourceKind::Sequence,
            vec![Resource::remote(4, seq_body("short lived"))],
        )
        .unwrap();
    let uuid = engine
        .index()
        .lookup_uuid(ResourceKind::Sequence, 4)
        .unwrap();

    let request = engine.begin_destroy(uuid).unwrap().unwrap();
    engine.finish_destroy(uuid, request.session, Ok(())).unwrap();
    assert!(engine.index().is_empty());

    // the broadcast of our own delete cannot resurrect anything
    let outcome = engine
        .handle_message(
            &topic(ResourceKind::Sequence, 4),
            &payload(Value::Null, Some(request.session)),
        )
        .unwrap();
    assert_eq!(outcome, Reconciliation::DeleteNoop);
    assert!(engine.index().is_empty());
}

#[test]
fn corrupt_payload_is_loud_but_leaves_the_engine_running() {
    let mut engine = engine();
    engine
        .load_kind(
            ResourceKind::Point,
            vec![Resource::remote(1, ResourceBody::Point(PointBody::default()))],
        )
        .unwrap();

    let err = engine
        .handle_message(&topic(ResourceKind::Point, 1), b"\x00 not json")
        .unwrap_err();
    assert!(matches!(err, fieldlink_core::error::Error::Channel(_)));

    // the index is untouched and the next message still lands
    assert_eq!(engine.index().len(), 1);
    let outcome = engine
        .handle_message(
            &topic(ResourceKind::Point, 1),
            &payload(json!({"name": "still here"}), None),
        )
        .unwrap();
    assert!(matches!(outcome, Reconciliation::Applied { .. }));
}

#[test]
fn unrelated_traffic_and_excluded_kinds_are_skipped() {
    let mut engine = engine();
    for (topic, payload) in [
        ("bot/device_1/status/Sequence/4", b"garbage".as_slice()),
        ("bot/device_1/sync/EnvVar/4", b"garbage".as_slice()),
        ("too/short", b"garbage".as_slice()),
    ] {
        let outcome = engine.handle_message(topic, payload).unwrap();
        assert_eq!(outcome, Reconciliation::Ignored);
    }
    assert!(engine.index().is_empty());
}
