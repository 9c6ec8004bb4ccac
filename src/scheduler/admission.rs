use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::conflict::now_ms;
use super::{ScheduleError, Scheduler};

/// Outcome of a registration request. Both carry the new registration id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted(Ulid),
    Waitlisted(Ulid),
}

impl Admission {
    pub fn id(&self) -> Ulid {
        match self {
            Admission::Admitted(id) | Admission::Waitlisted(id) => *id,
        }
    }
}

impl Scheduler {
    /// Request a seat. At capacity the registration lands on the waitlist;
    /// below it the seat check and the insert are one unit under the
    /// resource write guard, so two callers can never both take the last
    /// seat.
    pub async fn register(
        &self,
        resource_id: Ulid,
        subject: Ulid,
    ) -> Result<Admission, ScheduleError> {
        self.require_subject(subject).await?;
        let mut guard = self.write_resource(&resource_id).await?;

        if guard.registrations.len() >= MAX_REGISTRATIONS_PER_RESOURCE {
            return Err(ScheduleError::LimitExceeded(
                "too many registrations on resource",
            ));
        }
        if guard.status != ResourceStatus::Approved {
            return Err(ScheduleError::RegistrationClosed("resource is not approved"));
        }
        if !guard.open {
            return Err(ScheduleError::RegistrationClosed(
                "registration disallowed by configuration",
            ));
        }
        let now = now_ms();
        if let Some(window) = guard.window
            && window.has_started(now)
        {
            return Err(ScheduleError::RegistrationClosed(
                "resource window has already started",
            ));
        }
        if guard.registration_for_subject(subject).is_some() {
            return Err(ScheduleError::AlreadyRegistered {
                resource: resource_id,
                subject,
            });
        }

        let id = Ulid::new();
        let waitlisted = guard.is_full();
        let record = Record::RegistrationCreated {
            id,
            resource_id,
            subject,
            waitlisted,
            at: now,
        };
        self.persist_and_apply(resource_id, &mut guard, &[record])
            .await?;

        if waitlisted {
            metrics::counter!(observability::ADMISSIONS_TOTAL, "outcome" => "waitlisted")
                .increment(1);
            Ok(Admission::Waitlisted(id))
        } else {
            metrics::counter!(observability::ADMISSIONS_TOTAL, "outcome" => "admitted").increment(1);
            Ok(Admission::Admitted(id))
        }
    }

    /// Cancel a registration. If the victim held a seat, the waitlist head
    /// (oldest first; the fairness policy lives in `head_of_waitlist`) is
    /// promoted into it within the same record. One WAL entry, one guard:
    /// there is no window where the seat is free but unclaimed.
    pub async fn cancel(
        &self,
        registration_id: Ulid,
        reason: Option<String>,
    ) -> Result<(), ScheduleError> {
        if let Some(ref r) = reason
            && r.len() > MAX_REASON_LEN
        {
            return Err(ScheduleError::LimitExceeded("reason too long"));
        }
        let (resource_id, mut guard) = self.resolve_entity_write(&registration_id).await?;

        let reg = guard
            .registration(registration_id)
            .ok_or(ScheduleError::NotFound(registration_id))?;
        let held_seat = match reg.status {
            RegistrationStatus::Canceled => {
                return Err(ScheduleError::InvalidTransition(
                    "registration is already canceled",
                ));
            }
            RegistrationStatus::Registered => true,
            RegistrationStatus::Waitlisted => false,
        };

        let promoted = if held_seat { guard.head_of_waitlist() } else { None };
        let record = Record::RegistrationCanceled {
            id: registration_id,
            resource_id,
            reason,
            promoted,
        };
        self.persist_and_apply(resource_id, &mut guard, &[record])
            .await?;

        metrics::counter!(observability::CANCELLATIONS_TOTAL).increment(1);
        if promoted.is_some() {
            metrics::counter!(observability::PROMOTIONS_TOTAL).increment(1);
        }
        Ok(())
    }

    /// Record attendance. Idempotent on a registered attendee; only valid
    /// once the resource window has opened.
    pub async fn mark_attended(&self, registration_id: Ulid) -> Result<(), ScheduleError> {
        let (resource_id, mut guard) = self.resolve_entity_write(&registration_id).await?;

        let reg = guard
            .registration(registration_id)
            .ok_or(ScheduleError::NotFound(registration_id))?;
        let (status, already_attended) = (reg.status, reg.attended);

        match status {
            RegistrationStatus::Waitlisted => Err(ScheduleError::InvalidTransition(
                "waitlisted registration cannot be marked attended",
            )),
            RegistrationStatus::Canceled => Err(ScheduleError::InvalidTransition(
                "canceled registration cannot be marked attended",
            )),
            RegistrationStatus::Registered => {
                if already_attended {
                    return Ok(());
                }
                if let Some(window) = guard.window
                    && !window.has_started(now_ms())
                {
                    return Err(ScheduleError::InvalidTransition(
                        "resource window has not started",
                    ));
                }
                let record = Record::RegistrationAttended {
                    id: registration_id,
                    resource_id,
                };
                self.persist_and_apply(resource_id, &mut guard, &[record])
                    .await
            }
        }
    }

    /// Administrative hard delete. Unlike cancellation this removes the row,
    /// but it frees the seat the same way: decrement and promotion in one
    /// record.
    pub async fn delete_registration(&self, registration_id: Ulid) -> Result<(), ScheduleError> {
        let (resource_id, mut guard) = self.resolve_entity_write(&registration_id).await?;

        let reg = guard
            .registration(registration_id)
            .ok_or(ScheduleError::NotFound(registration_id))?;
        let held_seat = reg.status == RegistrationStatus::Registered;

        let promoted = if held_seat { guard.head_of_waitlist() } else { None };
        let record = Record::RegistrationDeleted {
            id: registration_id,
            resource_id,
            promoted,
        };
        self.persist_and_apply(resource_id, &mut guard, &[record])
            .await?;

        if promoted.is_some() {
            metrics::counter!(observability::PROMOTIONS_TOTAL).increment(1);
        }
        Ok(())
    }
}
