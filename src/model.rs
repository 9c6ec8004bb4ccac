use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds — the only time type.
pub type Ms = i64;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Ms,
    pub end: Ms,
}

impl TimeRange {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "TimeRange start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// The window has opened (attendance may be taken).
    pub fn has_started(&self, now: Ms) -> bool {
        now >= self.start
    }

    /// The window is entirely in the past.
    pub fn has_ended(&self, now: Ms) -> bool {
        now >= self.end
    }
}

// ── Statuses ─────────────────────────────────────────────────────

/// Resource lifecycle. Transitions are checked centrally via `can_become`,
/// never by ad-hoc status writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceStatus {
    Draft,
    PendingApproval,
    Approved,
    Rejected,
    Canceled,
}

impl ResourceStatus {
    /// The transition table. `Canceled` is terminal.
    pub fn can_become(self, next: ResourceStatus) -> bool {
        use ResourceStatus::*;
        matches!(
            (self, next),
            (Draft, PendingApproval)
                | (Draft, Canceled)
                | (PendingApproval, Approved)
                | (PendingApproval, Rejected)
                | (PendingApproval, Canceled)
                | (Rejected, PendingApproval)
                | (Approved, Canceled)
        )
    }
}

/// Seat admission state. `Canceled` is terminal; `Waitlisted` may be
/// promoted to `Registered` when a seat frees up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationStatus {
    Registered,
    Waitlisted,
    Canceled,
}

/// Booking decision state. `Rejected` may be re-approved (a fresh decision
/// that re-runs the conflict check), `Approved` may be rejected to vacate
/// the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationStatus {
    Pending,
    Approved,
    Rejected,
}

// ── Admission & booking records ──────────────────────────────────

/// One subject's seat claim on a capacity resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub id: Ulid,
    pub subject: Ulid,
    pub status: RegistrationStatus,
    pub attended: bool,
    pub cancel_reason: Option<String>,
    pub requested_at: Ms,
}

/// One interval claim on a bookable resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub holder: Ulid,
    /// What the slot is for (an event resource), by id only.
    pub purpose: Option<Ulid>,
    pub range: TimeRange,
    pub status: ReservationStatus,
    pub decision_reason: Option<String>,
    pub requested_at: Ms,
}

#[derive(Debug, Clone)]
pub struct ResourceState {
    pub id: Ulid,
    pub name: Option<String>,
    /// Seat limit. `None` = unlimited.
    pub capacity: Option<u32>,
    /// Seats held by `Registered` registrations. Never exceeds `capacity`.
    pub committed: u32,
    pub status: ResourceStatus,
    pub status_reason: Option<String>,
    /// The event's time window; `None` for resources with no time dimension.
    pub window: Option<TimeRange>,
    /// Configuration switch: `false` disallows new registrations.
    pub open: bool,
    /// In creation order. The waitlist is the `Waitlisted` subsequence.
    pub registrations: Vec<Registration>,
    /// Sorted by `range.start`.
    pub reservations: Vec<Reservation>,
}

impl ResourceState {
    pub fn new(
        id: Ulid,
        name: Option<String>,
        capacity: Option<u32>,
        window: Option<TimeRange>,
        open: bool,
    ) -> Self {
        Self {
            id,
            name,
            capacity,
            committed: 0,
            status: ResourceStatus::Draft,
            status_reason: None,
            window,
            open,
            registrations: Vec::new(),
            reservations: Vec::new(),
        }
    }

    /// All seats taken. Unlimited capacity is never full.
    pub fn is_full(&self) -> bool {
        match self.capacity {
            Some(cap) => self.committed >= cap,
            None => false,
        }
    }

    pub fn registration(&self, id: Ulid) -> Option<&Registration> {
        self.registrations.iter().find(|r| r.id == id)
    }

    pub fn registration_mut(&mut self, id: Ulid) -> Option<&mut Registration> {
        self.registrations.iter_mut().find(|r| r.id == id)
    }

    /// The subject's live (non-canceled) registration, if any.
    pub fn registration_for_subject(&self, subject: Ulid) -> Option<&Registration> {
        self.registrations
            .iter()
            .find(|r| r.subject == subject && r.status != RegistrationStatus::Canceled)
    }

    /// Oldest waitlisted registration. Promotion drains only from here.
    pub fn head_of_waitlist(&self) -> Option<Ulid> {
        self.registrations
            .iter()
            .find(|r| r.status == RegistrationStatus::Waitlisted)
            .map(|r| r.id)
    }

    /// Oldest `n` waitlisted registrations, in order.
    pub fn waitlist_head(&self, n: usize) -> Vec<Ulid> {
        self.registrations
            .iter()
            .filter(|r| r.status == RegistrationStatus::Waitlisted)
            .take(n)
            .map(|r| r.id)
            .collect()
    }

    /// Insert reservation maintaining sort order by range.start.
    pub fn insert_reservation(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .binary_search_by_key(&reservation.range.start, |r| r.range.start)
            .unwrap_or_else(|e| e);
        self.reservations.insert(pos, reservation);
    }

    pub fn remove_reservation(&mut self, id: Ulid) -> Option<Reservation> {
        if let Some(pos) = self.reservations.iter().position(|r| r.id == id) {
            Some(self.reservations.remove(pos))
        } else {
            None
        }
    }

    pub fn reservation(&self, id: Ulid) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == id)
    }

    pub fn reservation_mut(&mut self, id: Ulid) -> Option<&mut Reservation> {
        self.reservations.iter_mut().find(|r| r.id == id)
    }

    /// Return only reservations whose range overlaps the query window.
    /// Uses binary search to skip reservations starting at or after `query.end`.
    pub fn overlapping(&self, query: &TimeRange) -> impl Iterator<Item = &Reservation> {
        // Everything at index >= right_bound starts at or after query.end → can't overlap.
        let right_bound = self
            .reservations
            .partition_point(|r| r.range.start < query.end);
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.range.end > query.start)
    }
}

/// The record types — flat, no nesting. This is the WAL entry format and the
/// payload broadcast to signal subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Record {
    ResourceCreated {
        id: Ulid,
        name: Option<String>,
        capacity: Option<u32>,
        window: Option<TimeRange>,
        open: bool,
    },
    ResourceUpdated {
        id: Ulid,
        name: Option<String>,
        capacity: Option<u32>,
        window: Option<TimeRange>,
        open: bool,
        /// Registrations promoted into seats a capacity raise freed, oldest first.
        promoted: Vec<Ulid>,
    },
    ResourceStatusChanged {
        id: Ulid,
        status: ResourceStatus,
        reason: Option<String>,
    },
    ResourceDeleted {
        id: Ulid,
    },
    RegistrationCreated {
        id: Ulid,
        resource_id: Ulid,
        subject: Ulid,
        waitlisted: bool,
        at: Ms,
    },
    RegistrationCanceled {
        id: Ulid,
        resource_id: Ulid,
        reason: Option<String>,
        /// Waitlist head promoted into the freed seat, if the canceled
        /// registration held one. Bundled so cancellation and promotion
        /// replay as a unit.
        promoted: Option<Ulid>,
    },
    RegistrationAttended {
        id: Ulid,
        resource_id: Ulid,
    },
    RegistrationDeleted {
        id: Ulid,
        resource_id: Ulid,
        promoted: Option<Ulid>,
    },
    ReservationRequested {
        id: Ulid,
        resource_id: Ulid,
        holder: Ulid,
        purpose: Option<Ulid>,
        range: TimeRange,
        at: Ms,
    },
    ReservationApproved {
        id: Ulid,
        resource_id: Ulid,
    },
    ReservationRejected {
        id: Ulid,
        resource_id: Ulid,
        reason: Option<String>,
    },
    ReservationEdited {
        id: Ulid,
        resource_id: Ulid,
        range: TimeRange,
    },
}

/// Extract the owning resource id (None for resource-level create/delete,
/// which are handled at the registry map level).
pub fn record_resource_id(record: &Record) -> Option<Ulid> {
    match record {
        Record::RegistrationCreated { resource_id, .. }
        | Record::RegistrationCanceled { resource_id, .. }
        | Record::RegistrationAttended { resource_id, .. }
        | Record::RegistrationDeleted { resource_id, .. }
        | Record::ReservationRequested { resource_id, .. }
        | Record::ReservationApproved { resource_id, .. }
        | Record::ReservationRejected { resource_id, .. }
        | Record::ReservationEdited { resource_id, .. } => Some(*resource_id),
        Record::ResourceUpdated { id, .. } | Record::ResourceStatusChanged { id, .. } => Some(*id),
        Record::ResourceCreated { .. } | Record::ResourceDeleted { .. } => None,
    }
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceInfo {
    pub id: Ulid,
    pub name: Option<String>,
    pub capacity: Option<u32>,
    pub committed: u32,
    pub status: ResourceStatus,
    pub window: Option<TimeRange>,
    pub open: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationInfo {
    pub id: Ulid,
    pub resource_id: Ulid,
    pub subject: Ulid,
    pub status: RegistrationStatus,
    pub attended: bool,
    pub requested_at: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationInfo {
    pub id: Ulid,
    pub resource_id: Ulid,
    pub holder: Ulid,
    pub purpose: Option<Ulid>,
    pub start: Ms,
    pub end: Ms,
    pub status: ReservationStatus,
    pub requested_at: Ms,
}
