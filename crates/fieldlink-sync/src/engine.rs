//! The synchronization engine.
//!
//! One synchronous handler per event source; the host serializes calls onto
//! a single queue (see [`crate::events`]), so correctness rests on ordering
//! and idempotence rather than locking. All index mutation funnels through
//! the pipeline entry points.

use crate::outstanding::OutstandingRequests;
use crate::reconcile::{self, Reconciliation};
use crate::rest::{SavedResource, TransportError};
use crate::router::{self, Routed};
use fieldlink_core::config::SyncConfig;
use fieldlink_core::error::{Error, IndexError, SnapshotError};
use fieldlink_core::kind::ResourceKind;
use fieldlink_core::resource::{Resource, ResourceBody, ResourceId, SpecialStatus};
use fieldlink_core::session::SessionId;
use fieldlink_state::index::ResourceIndex;
use fieldlink_state::lifecycle::{self, EditOutcome};
use fieldlink_state::pipeline::UpsertStrategy;
use fieldlink_state::snapshot;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A write the host must execute against the REST collaborator, carrying the
/// session id to attach for echo-stamping.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveRequest {
    pub uuid: Uuid,
    pub session: SessionId,
    pub kind: ResourceKind,
    pub op: WriteOp,
    pub body: ResourceBody,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    Create,
    Update { id: ResourceId },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DestroyRequest {
    pub uuid: Uuid,
    pub session: SessionId,
    pub kind: ResourceKind,
    pub id: ResourceId,
}

pub struct SyncEngine {
    config: SyncConfig,
    index: ResourceIndex,
    outstanding: OutstandingRequests,
    /// Edits applied while a save was in flight, re-applied on top of the
    /// save's response body so no local work is silently dropped.
    staged_edits: HashMap<Uuid, ResourceBody>,
    /// Pre-destroy statuses, restored when a destroy request fails.
    pending_destroys: HashMap<Uuid, SpecialStatus>,
    /// Last save/destroy failure per resource, for UI display. Cleared on
    /// the next success.
    save_errors: HashMap<Uuid, String>,
}

impl SyncEngine {
    pub fn new(config: SyncConfig) -> Self {
        let outstanding = OutstandingRequests::new(config.echo_ttl());
        Self {
            config,
            index: ResourceIndex::new(),
            outstanding,
            staged_edits: HashMap::new(),
            pending_destroys: HashMap::new(),
            save_errors: HashMap::new(),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn echo_ttl(&self) -> Duration {
        self.config.echo_ttl()
    }

    pub fn index(&self) -> &ResourceIndex {
        &self.index
    }

    /// Mutable access to the arena; mutation still funnels through the
    /// pipeline entry points the index exposes.
    pub fn index_mut(&mut self) -> &mut ResourceIndex {
        &mut self.index
    }

    pub fn outstanding(&self) -> &OutstandingRequests {
        &self.outstanding
    }

    pub fn save_error(&self, uuid: &Uuid) -> Option<&str> {
        self.save_errors.get(uuid).map(String::as_str)
    }

    // ------------------------------------------------------------------
    // Local event source: UI-issued actions.
    // ------------------------------------------------------------------

    /// A kind's full canonical collection arrived over REST.
    pub fn load_kind(
        &mut self,
        kind: ResourceKind,
        resources: Vec<Resource>,
    ) -> Result<(), IndexError> {
        info!(%kind, count = resources.len(), "initial load");
        self.index.upsert(kind, resources, UpsertStrategy::Initial)
    }

    /// Create a resource locally; it stays dirty until saved.
    pub fn create_local(&mut self, body: ResourceBody) -> Result<Uuid, IndexError> {
        let resource = Resource::local(body);
        let uuid = resource.uuid;
        self.index
            .upsert(resource.kind(), vec![resource], UpsertStrategy::Ongoing)?;
        Ok(uuid)
    }

    /// Apply a local edit. Edits landing while a save is in flight are
    /// applied at once (the UI sees the newest body) and staged for
    /// re-application when the save resolves.
    pub fn edit(&mut self, uuid: Uuid, body: ResourceBody) -> Result<EditOutcome, IndexError> {
        let outcome = lifecycle::edit(&mut self.index, uuid, body.clone())?;
        if outcome == EditOutcome::AppliedWhileSaving {
            self.staged_edits.insert(uuid, body);
        }
        Ok(outcome)
    }

    /// Transition a dirty resource into `Saving` and describe the request
    /// the host must dispatch. `None` when there is nothing to save.
    pub fn begin_save(&mut self, uuid: Uuid) -> Result<Option<SaveRequest>, IndexError> {
        let Some(snapshot) = lifecycle::begin_save(&mut self.index, uuid)? else {
            return Ok(None);
        };
        let session = self.outstanding.begin(uuid);
        let op = match snapshot.id {
            Some(id) => WriteOp::Update { id },
            None => WriteOp::Create,
        };
        Ok(Some(SaveRequest {
            uuid,
            session,
            kind: snapshot.kind(),
            op,
            body: snapshot.body,
        }))
    }

    /// REST response callback for a save.
    pub fn finish_save(
        &mut self,
        uuid: Uuid,
        session: SessionId,
        result: Result<SavedResource, TransportError>,
    ) -> Result<(), IndexError> {
        match result {
            Ok(saved) => {
                self.save_errors.remove(&uuid);
                lifecycle::finish_save_ok(&mut self.index, uuid, saved.id, saved.body)?;
                // the in-flight save's response body lands first; a newer
                // staged edit is re-applied on top and marks dirty again
                if let Some(staged) = self.staged_edits.remove(&uuid) {
                    lifecycle::edit(&mut self.index, uuid, staged)?;
                }
                Ok(())
            }
            Err(e) => {
                // a failed request produces no echo
                self.outstanding.end(&session);
                self.staged_edits.remove(&uuid);
                warn!(%uuid, error = %e, "save failed");
                self.save_errors.insert(uuid, e.to_string());
                lifecycle::finish_save_err(&mut self.index, uuid)
            }
        }
    }

    /// Stage a destroy. Resources never saved to the server are removed
    /// locally with no request; otherwise the resource stays indexed (and
    /// readable) until the server confirms.
    pub fn begin_destroy(&mut self, uuid: Uuid) -> Result<Option<DestroyRequest>, IndexError> {
        let current = self
            .index
            .get_by_uuid(&uuid)
            .ok_or(IndexError::ResourceNotFound { uuid })?;
        if self.pending_destroys.contains_key(&uuid) {
            return Ok(None);
        }
        let kind = current.kind();
        let prior = current.special_status;
        let Some(id) = current.id else {
            self.index.remove(uuid)?;
            return Ok(None);
        };
        self.pending_destroys.insert(uuid, prior);
        lifecycle::set_status(&mut self.index, uuid, SpecialStatus::Saving)?;
        let session = self.outstanding.begin(uuid);
        Ok(Some(DestroyRequest {
            uuid,
            session,
            kind,
            id,
        }))
    }

    /// REST response callback for a destroy.
    pub fn finish_destroy(
        &mut self,
        uuid: Uuid,
        session: SessionId,
        result: Result<(), TransportError>,
    ) -> Result<(), IndexError> {
        let prior = self.pending_destroys.remove(&uuid);
        match result {
            Ok(()) => {
                self.save_errors.remove(&uuid);
                self.staged_edits.remove(&uuid);
                // the broadcast delete may have beaten the response here
                if self.index.contains(&uuid) {
                    self.index.remove(uuid)?;
                }
                Ok(())
            }
            Err(e) => {
                self.outstanding.end(&session);
                warn!(%uuid, error = %e, "destroy failed");
                self.save_errors.insert(uuid, e.to_string());
                if self.index.contains(&uuid) {
                    lifecycle::set_status(
                        &mut self.index,
                        uuid,
                        prior.unwrap_or(SpecialStatus::Saved),
                    )?;
                }
                Ok(())
            }
        }
    }

    // ------------------------------------------------------------------
    // Push-channel event source.
    // ------------------------------------------------------------------

    /// Route and reconcile one channel message. Transport corruption
    /// propagates as an error after being logged; the index is untouched.
    pub fn handle_message(
        &mut self,
        topic: &str,
        payload: &[u8],
    ) -> Result<Reconciliation, Error> {
        let routed = router::route(topic, payload)?;
        if let Routed::Invalid { reason } = &routed {
            debug!(topic, reason = %reason, "ignoring malformed topic");
        }
        reconcile::apply_routed(&mut self.index, &mut self.outstanding, routed)
    }

    /// Evict tracker entries whose echo never arrived.
    pub fn prune_outstanding(&mut self) -> usize {
        let dropped = self.outstanding.prune_expired();
        if dropped > 0 {
            debug!(dropped, "pruned expired outstanding requests");
        }
        dropped
    }

    // ------------------------------------------------------------------
    // Best-effort snapshot.
    // ------------------------------------------------------------------

    /// Write the snapshot when a path is configured. Returns whether one was
    /// written.
    pub fn write_snapshot(&self) -> Result<bool, SnapshotError> {
        match &self.config.snapshot_path {
            Some(path) => {
                snapshot::write(&self.index, path)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Seed the index from the configured snapshot, if one is readable.
    /// Returns whether anything was restored; a missing or corrupt snapshot
    /// just means starting empty.
    pub fn restore_snapshot(&mut self) -> Result<bool, IndexError> {
        let Some(path) = self.config.snapshot_path.clone() else {
            return Ok(false);
        };
        match snapshot::read(&path) {
            Ok(snap) => {
                snapshot::restore(&mut self.index, snap)?;
                info!(path = %path.display(), "restored snapshot");
                Ok(true)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "snapshot unusable, starting empty");
                Ok(false)
            }
        }
    }
}
