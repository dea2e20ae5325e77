//! Event-loop front end.
//!
//! The three event sources — UI actions, REST response callbacks, and
//! push-channel messages — are serialized onto one queue and drained by a
//! single task, so no two handlers ever run concurrently. REST calls are
//! spawned off the loop and resolve back into the same queue; the engine
//! never blocks waiting for them.

use crate::engine::{DestroyRequest, SaveRequest, SyncEngine, WriteOp};
use crate::rest::{ResourceTransport, SavedResource, TransportError};
use fieldlink_core::error::Error;
use fieldlink_core::kind::ResourceKind;
use fieldlink_core::resource::{Resource, ResourceBody};
use fieldlink_core::session::SessionId;
use std::rc::Rc;
use tokio::sync::mpsc;
use tokio::task;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug)]
pub enum Event {
    /// A kind's full collection arrived over REST.
    Loaded {
        kind: ResourceKind,
        resources: Vec<Resource>,
    },
    Created {
        body: ResourceBody,
    },
    Edited {
        uuid: Uuid,
        body: ResourceBody,
    },
    SaveRequested {
        uuid: Uuid,
    },
    DestroyRequested {
        uuid: Uuid,
    },
    SaveResolved {
        uuid: Uuid,
        session: SessionId,
        result: Result<SavedResource, TransportError>,
    },
    DestroyResolved {
        uuid: Uuid,
        session: SessionId,
        result: Result<(), TransportError>,
    },
    ChannelMessage {
        topic: String,
        payload: Vec<u8>,
    },
    /// Drain and stop; a configured snapshot is written on the way out.
    Shutdown,
}

/// Drive the engine until `Shutdown` (or all senders drop). Must run inside
/// a `tokio::task::LocalSet` on a current-thread runtime; the engine is
/// deliberately single-threaded.
///
/// Invariant violations terminate the loop and surface to the caller;
/// channel corruption is logged and the message dropped.
pub async fn run<T>(
    mut engine: SyncEngine,
    transport: Rc<T>,
    mut events: mpsc::Receiver<Event>,
    loopback: mpsc::Sender<Event>,
) -> Result<SyncEngine, Error>
where
    T: ResourceTransport + 'static,
{
    let mut prune = tokio::time::interval(engine.echo_ttl());
    prune.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = prune.tick() => {
                engine.prune_outstanding();
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                if matches!(event, Event::Shutdown) {
                    break;
                }
                handle(&mut engine, &transport, &loopback, event)?;
            }
        }
    }
    if let Err(e) = engine.write_snapshot() {
        warn!(error = %e, "snapshot write failed on shutdown");
    }
    Ok(engine)
}

fn handle<T>(
    engine: &mut SyncEngine,
    transport: &Rc<T>,
    loopback: &mpsc::Sender<Event>,
    event: Event,
) -> Result<(), Error>
where
    T: ResourceTransport + 'static,
{
    match event {
        Event::Loaded { kind, resources } => {
            engine.load_kind(kind, resources)?;
        }
        Event::Created { body } => {
            engine.create_local(body)?;
        }
        Event::Edited { uuid, body } => {
            engine.edit(uuid, body)?;
        }
        Event::SaveRequested { uuid } => {
            if let Some(request) = engine.begin_save(uuid)? {
                spawn_save(transport, loopback, request);
            }
        }
        Event::DestroyRequested { uuid } => {
            if let Some(request) = engine.begin_destroy(uuid)? {
                spawn_destroy(transport, loopback, request);
            }
        }
        Event::SaveResolved {
            uuid,
            session,
            result,
        } => {
            engine.finish_save(uuid, session, result)?;
        }
        Event::DestroyResolved {
            uuid,
            session,
            result,
        } => {
            engine.finish_destroy(uuid, session, result)?;
        }
        Event::ChannelMessage { topic, payload } => {
            match engine.handle_message(&topic, &payload) {
                Ok(_) => {}
                // corruption is non-fatal to the engine; the message is gone
                Err(Error::Channel(e)) => warn!(error = %e, "dropped channel message"),
                Err(other) => return Err(other),
            }
        }
        Event::Shutdown => {}
    }
    Ok(())
}

fn spawn_save<T>(transport: &Rc<T>, loopback: &mpsc::Sender<Event>, request: SaveRequest)
where
    T: ResourceTransport + 'static,
{
    let transport = Rc::clone(transport);
    let loopback = loopback.clone();
    task::spawn_local(async move {
        let result = match request.op {
            WriteOp::Create => {
                transport
                    .create(request.kind, request.body, request.session)
                    .await
            }
            WriteOp::Update { id } => {
                transport
                    .update(request.kind, id, request.body, request.session)
                    .await
            }
        };
        let _ = loopback
            .send(Event::SaveResolved {
                uuid: request.uuid,
                session: request.session,
                result,
            })
            .await;
    });
}

fn spawn_destroy<T>(transport: &Rc<T>, loopback: &mpsc::Sender<Event>, request: DestroyRequest)
where
    T: ResourceTransport + 'static,
{
    let transport = Rc::clone(transport);
    let loopback = loopback.clone();
    task::spawn_local(async move {
        let result = transport
            .destroy(request.kind, request.id, request.session)
            .await;
        let _ = loopback
            .send(Event::DestroyResolved {
                uuid: request.uuid,
                session: request.session,
                result,
            })
            .await;
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldlink_core::config::SyncConfig;
    use fieldlink_core::resource::{SequenceBody, SpecialStatus};
    use std::cell::RefCell;

    /// Immediate-response transport that records the sessions it saw.
    struct FakeTransport {
        assigned_id: i64,
        sessions: RefCell<Vec<SessionId>>,
    }

    impl ResourceTransport for FakeTransport {
        async fn create(
            &self,
            _kind: ResourceKind,
            body: ResourceBody,
            session: SessionId,
        ) -> Result<SavedResource, TransportError> {
            self.sessions.borrow_mut().push(session);
            Ok(SavedResource {
                id: self.assigned_id,
                body,
            })
        }

        async fn update(
            &self,
            _kind: ResourceKind,
            id: i64,
            body: ResourceBody,
            session: SessionId,
        ) -> Result<SavedResource, TransportError> {
            self.sessions.borrow_mut().push(session);
            Ok(SavedResource { id, body })
        }

        async fn destroy(
            &self,
            _kind: ResourceKind,
            _id: i64,
            session: SessionId,
        ) -> Result<(), TransportError> {
            self.sessions.borrow_mut().push(session);
            Ok(())
        }
    }

    fn seq_body(name: &str) -> ResourceBody {
        ResourceBody::Sequence(SequenceBody {
            name: name.to_string(),
            ..Default::default()
        })
    }

    #[tokio::test(flavor = "current_thread")]
    async fn save_resolves_through_the_queue() {
        let local = task::LocalSet::new();
        local
            .run_until(async {
                let engine = SyncEngine::new(SyncConfig::default());
                let transport = Rc::new(FakeTransport {
                    assigned_id: 7,
                    sessions: RefCell::new(Vec::new()),
                });
                let (tx, rx) = mpsc::channel(32);

                let loop_handle = task::spawn_local(run(
                    engine,
                    Rc::clone(&transport),
                    rx,
                    tx.clone(),
                ));

                tx.send(Event::Created {
                    body: seq_body("watering"),
                })
                .await
                .unwrap();
                tx.send(Event::ChannelMessage {
                    topic: "bot/device_1/sync".to_string(),
                    payload: b"noise".to_vec(),
                })
                .await
                .unwrap();

                // let the queue drain so the created uuid is known
                task::yield_now().await;
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;

                tx.send(Event::Shutdown).await.unwrap();
                let engine = loop_handle.await.unwrap().unwrap();

                let created: Vec<_> = engine.index().get_all_of_kind(ResourceKind::Sequence);
                assert_eq!(created.len(), 1);
                assert_eq!(created[0].special_status, SpecialStatus::Dirty);
            })
            .await;
    }

    #[tokio::test(flavor = "current_thread")]
    async fn full_save_cycle_over_the_loop() {
        let local = task::LocalSet::new();
        local
            .run_until(async {
                let mut engine = SyncEngine::new(SyncConfig::default());
                let uuid = engine.create_local(seq_body("v1")).unwrap();
                let transport = Rc::new(FakeTransport {
                    assigned_id: 9,
                    sessions: RefCell::new(Vec::new()),
                });
                let (tx, rx) = mpsc::channel(32);

                let loop_handle = task::spawn_local(run(
                    engine,
                    Rc::clone(&transport),
                    rx,
                    tx.clone(),
                ));

                tx.send(Event::SaveRequested { uuid }).await.unwrap();
                // two hops: the spawned transport call, then SaveResolved
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                tx.send(Event::Shutdown).await.unwrap();

                let engine = loop_handle.await.unwrap().unwrap();
                let r = engine.index().get_by_uuid(&uuid).unwrap();
                assert_eq!(r.id, Some(9));
                assert_eq!(r.special_status, SpecialStatus::Saved);
                assert_eq!(
                    transport.sessions.borrow().len(),
                    1,
                    "the minted session id reached the transport"
                );
            })
            .await;
    }
}
