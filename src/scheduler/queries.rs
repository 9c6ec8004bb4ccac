use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::approved_conflicts;
use super::{ScheduleError, Scheduler};

fn registration_info(resource_id: Ulid, reg: &Registration) -> RegistrationInfo {
    RegistrationInfo {
        id: reg.id,
        resource_id,
        subject: reg.subject,
        status: reg.status,
        attended: reg.attended,
        requested_at: reg.requested_at,
    }
}

fn reservation_info(resource_id: Ulid, res: &Reservation) -> ReservationInfo {
    ReservationInfo {
        id: res.id,
        resource_id,
        holder: res.holder,
        purpose: res.purpose,
        start: res.range.start,
        end: res.range.end,
        status: res.status,
        requested_at: res.requested_at,
    }
}

fn resource_info(rs: &ResourceState) -> ResourceInfo {
    ResourceInfo {
        id: rs.id,
        name: rs.name.clone(),
        capacity: rs.capacity,
        committed: rs.committed,
        status: rs.status,
        window: rs.window,
        open: rs.open,
    }
}

impl Scheduler {
    /// The current waitlist, oldest first. Missing resource → empty.
    pub async fn waitlist(&self, resource_id: Ulid) -> Vec<RegistrationInfo> {
        let Some(rs) = self.registry.get(&resource_id) else {
            return Vec::new();
        };
        let guard = rs.read().await;
        guard
            .registrations
            .iter()
            .filter(|r| r.status == RegistrationStatus::Waitlisted)
            .map(|r| registration_info(resource_id, r))
            .collect()
    }

    /// Every registration on the resource, in creation order.
    pub async fn registrations(&self, resource_id: Ulid) -> Vec<RegistrationInfo> {
        let Some(rs) = self.registry.get(&resource_id) else {
            return Vec::new();
        };
        let guard = rs.read().await;
        guard
            .registrations
            .iter()
            .map(|r| registration_info(resource_id, r))
            .collect()
    }

    /// The subject's live registration on the resource, if any.
    pub async fn registration_for(
        &self,
        resource_id: Ulid,
        subject: Ulid,
    ) -> Option<RegistrationInfo> {
        let rs = self.registry.get(&resource_id)?;
        let guard = rs.read().await;
        guard
            .registration_for_subject(subject)
            .map(|r| registration_info(resource_id, r))
    }

    /// A subject's registrations across every resource. Uncontended
    /// snapshot walk; entries mid-write at that instant are skipped.
    pub fn registrations_for_subject(&self, subject: Ulid) -> Vec<RegistrationInfo> {
        let mut out = Vec::new();
        self.registry.for_each_snapshot(|rs| {
            for r in &rs.registrations {
                if r.subject == subject {
                    out.push(registration_info(rs.id, r));
                }
            }
        });
        out
    }

    /// Seats currently committed.
    pub async fn committed_count(&self, resource_id: Ulid) -> Result<u32, ScheduleError> {
        let rs = self
            .registry
            .get(&resource_id)
            .ok_or(ScheduleError::NotFound(resource_id))?;
        let guard = rs.read().await;
        Ok(guard.committed)
    }

    /// Registered attendees who showed up.
    pub async fn attended_count(&self, resource_id: Ulid) -> Result<usize, ScheduleError> {
        let rs = self
            .registry
            .get(&resource_id)
            .ok_or(ScheduleError::NotFound(resource_id))?;
        let guard = rs.read().await;
        Ok(guard.registrations.iter().filter(|r| r.attended).count())
    }

    /// Approved reservations overlapping `[start, end)`, optionally
    /// excluding one id. The public face of the interval index.
    pub async fn conflicts(
        &self,
        resource_id: Ulid,
        start: Ms,
        end: Ms,
        exclude: Option<Ulid>,
    ) -> Result<Vec<ReservationInfo>, ScheduleError> {
        if end <= start {
            return Err(ScheduleError::InvalidRange { start, end });
        }
        if end - start > MAX_QUERY_WINDOW_MS {
            return Err(ScheduleError::LimitExceeded("query window too wide"));
        }
        let Some(rs) = self.registry.get(&resource_id) else {
            return Ok(Vec::new());
        };
        let guard = rs.read().await;
        let range = TimeRange::new(start, end);
        Ok(approved_conflicts(&guard, &range, exclude)
            .into_iter()
            .map(|r| reservation_info(resource_id, r))
            .collect())
    }

    /// Reservations on the resource, optionally filtered by status, in
    /// start order.
    pub async fn reservations(
        &self,
        resource_id: Ulid,
        status: Option<ReservationStatus>,
    ) -> Vec<ReservationInfo> {
        let Some(rs) = self.registry.get(&resource_id) else {
            return Vec::new();
        };
        let guard = rs.read().await;
        guard
            .reservations
            .iter()
            .filter(|r| status.is_none_or(|s| r.status == s))
            .map(|r| reservation_info(resource_id, r))
            .collect()
    }

    pub async fn resource(&self, resource_id: Ulid) -> Result<ResourceInfo, ScheduleError> {
        let rs = self
            .registry
            .get(&resource_id)
            .ok_or(ScheduleError::NotFound(resource_id))?;
        let guard = rs.read().await;
        Ok(resource_info(&guard))
    }

    pub fn list_resources(&self) -> Vec<ResourceInfo> {
        let mut out = Vec::new();
        self.registry.for_each_snapshot(|rs| {
            out.push(resource_info(rs));
        });
        out
    }
}
