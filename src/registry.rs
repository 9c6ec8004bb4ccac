use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::model::*;

pub type SharedResourceState = Arc<RwLock<ResourceState>>;

/// Canonical holder of all resource state: the concurrent resource map plus
/// the reverse index from registration/reservation ids to their resource.
///
/// `apply` is the single place a committed `Record` is folded into state.
/// Both the live mutation path and WAL replay go through it.
pub struct ResourceRegistry {
    resources: DashMap<Ulid, SharedResourceState>,
    entity_to_resource: DashMap<Ulid, Ulid>,
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self {
            resources: DashMap::new(),
            entity_to_resource: DashMap::new(),
        }
    }

    // ── Resource map ─────────────────────────────────────────

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn contains(&self, id: &Ulid) -> bool {
        self.resources.contains_key(id)
    }

    pub fn get(&self, id: &Ulid) -> Option<SharedResourceState> {
        self.resources.get(id).map(|e| e.value().clone())
    }

    pub fn insert(&self, id: Ulid, state: SharedResourceState) {
        self.resources.insert(id, state);
    }

    pub fn remove(&self, id: &Ulid) -> Option<(Ulid, SharedResourceState)> {
        self.resources.remove(id)
    }

    pub fn ids(&self) -> Vec<Ulid> {
        self.resources.iter().map(|e| *e.key()).collect()
    }

    /// Uncontended snapshot walk over every resource. Entries whose lock is
    /// held by a writer at that instant are skipped.
    pub fn for_each_snapshot(&self, mut f: impl FnMut(&ResourceState)) {
        for entry in self.resources.iter() {
            let rs = entry.value().clone();
            if let Ok(guard) = rs.try_read() {
                f(&guard);
            }
        }
    }

    // ── Entity index ─────────────────────────────────────────

    pub fn resource_for_entity(&self, entity_id: &Ulid) -> Option<Ulid> {
        self.entity_to_resource.get(entity_id).map(|e| *e.value())
    }

    fn map_entity(&self, entity_id: Ulid, resource_id: Ulid) {
        self.entity_to_resource.insert(entity_id, resource_id);
    }

    fn unmap_entity(&self, entity_id: &Ulid) {
        self.entity_to_resource.remove(entity_id);
    }

    /// Drop index entries for everything the resource owned. Called when a
    /// resource is deleted outright.
    pub fn unmap_resource_entities(&self, rs: &ResourceState) {
        for r in &rs.registrations {
            self.unmap_entity(&r.id);
        }
        for r in &rs.reservations {
            self.unmap_entity(&r.id);
        }
    }

    // ── Record application ───────────────────────────────────

    /// Fold a record into a resource's state (no locking — caller holds the
    /// write guard). Counter math lives here and nowhere else.
    pub fn apply(&self, rs: &mut ResourceState, record: &Record) {
        match record {
            Record::ResourceUpdated {
                name,
                capacity,
                window,
                open,
                promoted,
                ..
            } => {
                rs.name = name.clone();
                rs.capacity = *capacity;
                rs.window = *window;
                rs.open = *open;
                for id in promoted {
                    promote(rs, *id);
                }
            }
            Record::ResourceStatusChanged { status, reason, .. } => {
                rs.status = *status;
                rs.status_reason = reason.clone();
            }
            Record::RegistrationCreated {
                id,
                resource_id,
                subject,
                waitlisted,
                at,
            } => {
                rs.registrations.push(Registration {
                    id: *id,
                    subject: *subject,
                    status: if *waitlisted {
                        RegistrationStatus::Waitlisted
                    } else {
                        RegistrationStatus::Registered
                    },
                    attended: false,
                    cancel_reason: None,
                    requested_at: *at,
                });
                if !*waitlisted {
                    rs.committed += 1;
                }
                self.map_entity(*id, *resource_id);
            }
            Record::RegistrationCanceled {
                id,
                reason,
                promoted,
                ..
            } => {
                let mut freed = false;
                if let Some(reg) = rs.registration_mut(*id) {
                    freed = reg.status == RegistrationStatus::Registered;
                    reg.status = RegistrationStatus::Canceled;
                    reg.cancel_reason = reason.clone();
                }
                if freed {
                    rs.committed -= 1;
                }
                if let Some(pid) = promoted {
                    promote(rs, *pid);
                }
            }
            Record::RegistrationAttended { id, .. } => {
                if let Some(reg) = rs.registration_mut(*id) {
                    reg.attended = true;
                }
            }
            Record::RegistrationDeleted { id, promoted, .. } => {
                if let Some(pos) = rs.registrations.iter().position(|r| r.id == *id) {
                    let removed = rs.registrations.remove(pos);
                    if removed.status == RegistrationStatus::Registered {
                        rs.committed -= 1;
                    }
                }
                if let Some(pid) = promoted {
                    promote(rs, *pid);
                }
                self.unmap_entity(id);
            }
            Record::ReservationRequested {
                id,
                resource_id,
                holder,
                purpose,
                range,
                at,
            } => {
                rs.insert_reservation(Reservation {
                    id: *id,
                    holder: *holder,
                    purpose: *purpose,
                    range: *range,
                    status: ReservationStatus::Pending,
                    decision_reason: None,
                    requested_at: *at,
                });
                self.map_entity(*id, *resource_id);
            }
            Record::ReservationApproved { id, .. } => {
                if let Some(res) = rs.reservation_mut(*id) {
                    res.status = ReservationStatus::Approved;
                    res.decision_reason = None;
                }
            }
            Record::ReservationRejected { id, reason, .. } => {
                if let Some(res) = rs.reservation_mut(*id) {
                    res.status = ReservationStatus::Rejected;
                    res.decision_reason = reason.clone();
                }
            }
            Record::ReservationEdited { id, range, .. } => {
                // Re-insert to keep the vector sorted by the new start.
                if let Some(mut res) = rs.remove_reservation(*id) {
                    res.range = *range;
                    rs.insert_reservation(res);
                }
            }
            // Create/Delete are handled at the registry map level, not here.
            Record::ResourceCreated { .. } | Record::ResourceDeleted { .. } => {}
        }
    }
}

/// Flip a waitlisted registration into a seat. No-op if the id is missing or
/// no longer waitlisted (a replayed record is the source of truth for intent,
/// the state guards the counter).
fn promote(rs: &mut ResourceState, id: Ulid) {
    let promoted = match rs.registration_mut(id) {
        Some(reg) if reg.status == RegistrationStatus::Waitlisted => {
            reg.status = RegistrationStatus::Registered;
            true
        }
        _ => false,
    };
    if promoted {
        rs.committed += 1;
    }
}
