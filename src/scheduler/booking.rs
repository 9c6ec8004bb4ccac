use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::conflict::{check_slot_free, now_ms, validate_range};
use super::{ScheduleError, Scheduler};

impl Scheduler {
    /// File a booking request. Pending requests for overlapping slots may
    /// pile up freely; contention is resolved at approval time. A range
    /// already held by an approved reservation is dead on arrival and fails
    /// fast with `SlotConflict`.
    pub async fn request_reservation(
        &self,
        resource_id: Ulid,
        holder: Ulid,
        purpose: Option<Ulid>,
        start: Ms,
        end: Ms,
    ) -> Result<Ulid, ScheduleError> {
        self.require_subject(holder).await?;
        let range = validate_range(start, end)?;
        let mut guard = self.write_resource(&resource_id).await?;

        if guard.reservations.len() >= MAX_RESERVATIONS_PER_RESOURCE {
            return Err(ScheduleError::LimitExceeded(
                "too many reservations on resource",
            ));
        }
        check_slot_free(&guard, &range, None)?;

        let id = Ulid::new();
        let record = Record::ReservationRequested {
            id,
            resource_id,
            holder,
            purpose,
            range,
            at: now_ms(),
        };
        self.persist_and_apply(resource_id, &mut guard, &[record])
            .await?;

        metrics::counter!(observability::BOOKING_REQUESTS_TOTAL).increment(1);
        Ok(id)
    }

    /// Approve a pending (or re-approve a rejected) reservation. The
    /// conflict re-check excludes the candidate itself and runs under the
    /// same write guard as the status flip, so the check and the commit are
    /// one unit. On conflict the reservation's status is untouched.
    /// Idempotent on an already-approved reservation.
    pub async fn approve_reservation(&self, reservation_id: Ulid) -> Result<(), ScheduleError> {
        let (resource_id, mut guard) = self.resolve_entity_write(&reservation_id).await?;

        let res = guard
            .reservation(reservation_id)
            .ok_or(ScheduleError::NotFound(reservation_id))?;
        if res.status == ReservationStatus::Approved {
            return Ok(());
        }
        let range = res.range;

        if let Err(e) = check_slot_free(&guard, &range, Some(reservation_id)) {
            metrics::counter!(observability::BOOKING_DECISIONS_TOTAL, "decision" => "conflict")
                .increment(1);
            return Err(e);
        }

        let record = Record::ReservationApproved {
            id: reservation_id,
            resource_id,
        };
        self.persist_and_apply(resource_id, &mut guard, &[record])
            .await?;

        metrics::counter!(observability::BOOKING_DECISIONS_TOTAL, "decision" => "approved")
            .increment(1);
        Ok(())
    }

    /// Reject a pending reservation, or vacate an approved one (the only
    /// way to free its slot; an approval is never silently invalidated).
    /// Idempotent from rejected.
    pub async fn reject_reservation(
        &self,
        reservation_id: Ulid,
        reason: Option<String>,
    ) -> Result<(), ScheduleError> {
        if let Some(ref r) = reason
            && r.len() > MAX_REASON_LEN
        {
            return Err(ScheduleError::LimitExceeded("reason too long"));
        }
        let (resource_id, mut guard) = self.resolve_entity_write(&reservation_id).await?;

        let res = guard
            .reservation(reservation_id)
            .ok_or(ScheduleError::NotFound(reservation_id))?;
        if res.status == ReservationStatus::Rejected {
            return Ok(());
        }

        let record = Record::ReservationRejected {
            id: reservation_id,
            resource_id,
            reason,
        };
        self.persist_and_apply(resource_id, &mut guard, &[record])
            .await?;

        metrics::counter!(observability::BOOKING_DECISIONS_TOTAL, "decision" => "rejected")
            .increment(1);
        Ok(())
    }

    /// Change a pending reservation's range. An approved reservation must be
    /// rejected and re-requested instead, since editing it would silently
    /// invalidate the conflict guarantee its approval carries.
    pub async fn edit_reservation(
        &self,
        reservation_id: Ulid,
        start: Ms,
        end: Ms,
    ) -> Result<(), ScheduleError> {
        let range = validate_range(start, end)?;
        let (resource_id, mut guard) = self.resolve_entity_write(&reservation_id).await?;

        let res = guard
            .reservation(reservation_id)
            .ok_or(ScheduleError::NotFound(reservation_id))?;
        if res.status != ReservationStatus::Pending {
            return Err(ScheduleError::InvalidTransition(
                "only pending reservations can be edited",
            ));
        }
        check_slot_free(&guard, &range, Some(reservation_id))?;

        let record = Record::ReservationEdited {
            id: reservation_id,
            resource_id,
            range,
        };
        self.persist_and_apply(resource_id, &mut guard, &[record])
            .await
    }

    /// Pending reservations whose whole range has passed, so they can no
    /// longer be honored. Sweeper input; uncontended snapshot walk.
    pub fn collect_lapsed_pending(&self, now: Ms) -> Vec<(Ulid, Ulid)> {
        let mut lapsed = Vec::new();
        self.registry.for_each_snapshot(|rs| {
            for r in &rs.reservations {
                if r.status == ReservationStatus::Pending && r.range.has_ended(now) {
                    lapsed.push((r.id, rs.id));
                }
            }
        });
        lapsed
    }
}
