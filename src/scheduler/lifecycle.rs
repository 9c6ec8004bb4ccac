use std::sync::Arc;

use tokio::sync::RwLock;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;

use super::conflict::validate_range;
use super::{ScheduleError, Scheduler};

impl Scheduler {
    /// Create a resource in `Draft`. Registration requires walking it to
    /// `Approved` via the transition table; reservations only require that
    /// it exists.
    pub async fn create_resource(
        &self,
        id: Ulid,
        name: Option<String>,
        capacity: Option<u32>,
        window: Option<TimeRange>,
        open: bool,
    ) -> Result<(), ScheduleError> {
        if self.registry.len() >= MAX_RESOURCES {
            return Err(ScheduleError::LimitExceeded("too many resources"));
        }
        if let Some(ref n) = name
            && n.len() > MAX_NAME_LEN
        {
            return Err(ScheduleError::LimitExceeded("resource name too long"));
        }
        if let Some(w) = window {
            validate_range(w.start, w.end)?;
        }
        if self.registry.contains(&id) {
            return Err(ScheduleError::AlreadyExists(id));
        }

        let record = Record::ResourceCreated {
            id,
            name: name.clone(),
            capacity,
            window,
            open,
        };
        self.wal_append(vec![record.clone()]).await?;
        let rs = ResourceState::new(id, name, capacity, window, open);
        self.registry.insert(id, Arc::new(RwLock::new(rs)));
        self.hub.send(id, &record);
        Ok(())
    }

    /// Update configuration. Shrinking capacity below the committed count is
    /// refused; admitted subjects are never evicted. A raise promotes
    /// waitlisted registrations into the new seats, oldest first, in the
    /// same record.
    pub async fn update_resource(
        &self,
        id: Ulid,
        name: Option<String>,
        capacity: Option<u32>,
        window: Option<TimeRange>,
        open: bool,
    ) -> Result<(), ScheduleError> {
        if let Some(ref n) = name
            && n.len() > MAX_NAME_LEN
        {
            return Err(ScheduleError::LimitExceeded("resource name too long"));
        }
        if let Some(w) = window {
            validate_range(w.start, w.end)?;
        }
        let mut guard = self.write_resource(&id).await?;

        if let Some(cap) = capacity
            && cap < guard.committed
        {
            return Err(ScheduleError::InvalidTransition(
                "capacity below committed seats",
            ));
        }

        let free_seats = match capacity {
            Some(cap) => (cap - guard.committed) as usize,
            None => usize::MAX, // unlimited: everyone waiting fits
        };
        let promoted = guard.waitlist_head(free_seats);

        let record = Record::ResourceUpdated {
            id,
            name,
            capacity,
            window,
            open,
            promoted: promoted.clone(),
        };
        self.persist_and_apply(id, &mut guard, &[record]).await?;

        if !promoted.is_empty() {
            metrics::counter!(observability::PROMOTIONS_TOTAL).increment(promoted.len() as u64);
        }
        Ok(())
    }

    pub async fn submit_resource(&self, id: Ulid) -> Result<(), ScheduleError> {
        self.transition_resource(id, ResourceStatus::PendingApproval, None)
            .await
    }

    pub async fn approve_resource(&self, id: Ulid) -> Result<(), ScheduleError> {
        self.transition_resource(id, ResourceStatus::Approved, None)
            .await
    }

    pub async fn reject_resource(
        &self,
        id: Ulid,
        reason: Option<String>,
    ) -> Result<(), ScheduleError> {
        self.transition_resource(id, ResourceStatus::Rejected, reason)
            .await
    }

    pub async fn cancel_resource(
        &self,
        id: Ulid,
        reason: Option<String>,
    ) -> Result<(), ScheduleError> {
        self.transition_resource(id, ResourceStatus::Canceled, reason)
            .await
    }

    /// All lifecycle moves funnel through here and the transition table;
    /// there is no other way to write a resource status.
    async fn transition_resource(
        &self,
        id: Ulid,
        next: ResourceStatus,
        reason: Option<String>,
    ) -> Result<(), ScheduleError> {
        if let Some(ref r) = reason
            && r.len() > MAX_REASON_LEN
        {
            return Err(ScheduleError::LimitExceeded("reason too long"));
        }
        let mut guard = self.write_resource(&id).await?;

        if !guard.status.can_become(next) {
            return Err(ScheduleError::InvalidTransition(
                "resource lifecycle does not allow this status change",
            ));
        }

        tracing::info!("resource {id} status -> {next:?}");
        let record = Record::ResourceStatusChanged {
            id,
            status: next,
            reason,
        };
        self.persist_and_apply(id, &mut guard, &[record]).await
    }

    /// Administrative removal of a resource and everything on it.
    pub async fn delete_resource(&self, id: Ulid) -> Result<(), ScheduleError> {
        let guard = self.write_resource(&id).await?;

        let record = Record::ResourceDeleted { id };
        self.wal_append(vec![record.clone()]).await?;
        self.registry.unmap_resource_entities(&guard);
        self.registry.remove(&id);
        drop(guard);

        self.hub.send(id, &record);
        self.hub.remove(&id);
        Ok(())
    }
}
