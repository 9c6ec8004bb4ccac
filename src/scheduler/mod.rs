mod admission;
mod booking;
mod conflict;
mod error;
mod lifecycle;
mod queries;

pub use admission::Admission;
pub use error::ScheduleError;

pub(crate) use conflict::now_ms;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, OwnedRwLockWriteGuard};
use ulid::Ulid;

use crate::directory::SubjectDirectory;
use crate::limits::{LOCK_RETRIES, LOCK_WAIT_MS};
use crate::model::*;
use crate::registry::{ResourceRegistry, SharedResourceState};
use crate::signal::SignalHub;
use crate::wal::Wal;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        records: Vec<Record>,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        records: Vec<Record>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { records, response } => {
                let mut batch = vec![(records, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { records, response }) => {
                            batch.push((records, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            flush_and_respond(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

type PendingAppend = (Vec<Record>, oneshot::Sender<io::Result<()>>);

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<PendingAppend>) {
    let record_count: usize = batch.iter().map(|(records, _)| records.len()).sum();
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(record_count as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    respond_batch(batch, &result);
}

fn flush_batch(wal: &mut Wal, batch: &mut [PendingAppend]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    'outer: for (records, _) in batch.iter() {
        for record in records {
            if let Err(e) = wal.append_buffered(record) {
                append_err = Some(e);
                break 'outer;
            }
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(batch: &mut Vec<PendingAppend>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { records, response } => {
            let result = Wal::write_compact_file(wal.path(), &records)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// The scheduling façade. Routes admission calls (register/cancel/attend)
/// and booking calls (request/approve/reject/edit) onto per-resource state,
/// each mutation running check → WAL append → apply under one write guard.
pub struct Scheduler {
    pub registry: ResourceRegistry,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub hub: Arc<SignalHub>,
    directory: Arc<dyn SubjectDirectory>,
}

impl Scheduler {
    pub fn new(
        wal_path: PathBuf,
        hub: Arc<SignalHub>,
        directory: Arc<dyn SubjectDirectory>,
    ) -> io::Result<Self> {
        let records = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let scheduler = Self {
            registry: ResourceRegistry::new(),
            wal_tx,
            hub,
            directory,
        };

        // Replay records — we're the sole owner of these Arcs, so try_write
        // always succeeds instantly (no contention). Never use blocking_write
        // here because this may run inside an async context.
        for record in &records {
            match record {
                Record::ResourceCreated {
                    id,
                    name,
                    capacity,
                    window,
                    open,
                } => {
                    let rs = ResourceState::new(*id, name.clone(), *capacity, *window, *open);
                    scheduler
                        .registry
                        .insert(*id, Arc::new(tokio::sync::RwLock::new(rs)));
                }
                Record::ResourceDeleted { id } => {
                    if let Some(entry) = scheduler.registry.get(id) {
                        let guard = entry.try_read().expect("replay: uncontended read");
                        scheduler.registry.unmap_resource_entities(&guard);
                    }
                    scheduler.registry.remove(id);
                }
                other => {
                    if let Some(resource_id) = record_resource_id(other)
                        && let Some(entry) = scheduler.registry.get(&resource_id)
                    {
                        let mut guard = entry.try_write().expect("replay: uncontended write");
                        scheduler.registry.apply(&mut guard, other);
                    }
                }
            }
        }

        Ok(scheduler)
    }

    /// Write records to the WAL via the background group-commit writer.
    /// One call = one durable unit from the caller's perspective.
    pub(super) async fn wal_append(&self, records: Vec<Record>) -> Result<(), ScheduleError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                records,
                response: tx,
            })
            .await
            .map_err(|_| ScheduleError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| ScheduleError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| ScheduleError::WalError(e.to_string()))
    }

    /// WAL-append + apply + publish in one call. The WAL append happens
    /// first: on failure the in-memory state is untouched.
    pub(super) async fn persist_and_apply(
        &self,
        resource_id: Ulid,
        rs: &mut ResourceState,
        records: &[Record],
    ) -> Result<(), ScheduleError> {
        self.wal_append(records.to_vec()).await?;
        for record in records {
            self.registry.apply(rs, record);
            self.hub.send(resource_id, record);
        }
        Ok(())
    }

    /// Bounded write-lock acquisition: a few timed attempts, then `Busy`.
    /// Contended callers fail fast instead of queuing indefinitely.
    pub(super) async fn lock_write(
        &self,
        rs: &SharedResourceState,
    ) -> Result<OwnedRwLockWriteGuard<ResourceState>, ScheduleError> {
        for _ in 0..LOCK_RETRIES {
            match tokio::time::timeout(
                Duration::from_millis(LOCK_WAIT_MS),
                rs.clone().write_owned(),
            )
            .await
            {
                Ok(guard) => return Ok(guard),
                Err(_) => continue,
            }
        }
        Err(ScheduleError::Busy)
    }

    /// Look up a resource and acquire its write lock.
    pub(super) async fn write_resource(
        &self,
        id: &Ulid,
    ) -> Result<OwnedRwLockWriteGuard<ResourceState>, ScheduleError> {
        let rs = self.registry.get(id).ok_or(ScheduleError::NotFound(*id))?;
        self.lock_write(&rs).await
    }

    /// Lookup entity → resource, get resource, acquire write lock.
    pub(super) async fn resolve_entity_write(
        &self,
        entity_id: &Ulid,
    ) -> Result<(Ulid, OwnedRwLockWriteGuard<ResourceState>), ScheduleError> {
        let resource_id = self
            .registry
            .resource_for_entity(entity_id)
            .ok_or(ScheduleError::NotFound(*entity_id))?;
        let guard = self.write_resource(&resource_id).await?;
        Ok((resource_id, guard))
    }

    /// Validate a requester against the identity collaborator.
    pub(super) async fn require_subject(&self, id: Ulid) -> Result<(), ScheduleError> {
        if self.directory.subject_exists(id).await {
            Ok(())
        } else {
            Err(ScheduleError::NotFound(id))
        }
    }

    /// Compact the WAL by rewriting it with only the records needed to
    /// recreate the current state.
    pub async fn compact_wal(&self) -> Result<(), ScheduleError> {
        let mut records = Vec::new();

        for id in self.registry.ids() {
            let Some(rs) = self.registry.get(&id) else {
                continue;
            };
            let guard = rs.read().await;

            records.push(Record::ResourceCreated {
                id: guard.id,
                name: guard.name.clone(),
                capacity: guard.capacity,
                window: guard.window,
                open: guard.open,
            });
            if guard.status != ResourceStatus::Draft {
                records.push(Record::ResourceStatusChanged {
                    id: guard.id,
                    status: guard.status,
                    reason: guard.status_reason.clone(),
                });
            }

            for reg in &guard.registrations {
                match reg.status {
                    RegistrationStatus::Registered => {
                        records.push(Record::RegistrationCreated {
                            id: reg.id,
                            resource_id: guard.id,
                            subject: reg.subject,
                            waitlisted: false,
                            at: reg.requested_at,
                        });
                        if reg.attended {
                            records.push(Record::RegistrationAttended {
                                id: reg.id,
                                resource_id: guard.id,
                            });
                        }
                    }
                    RegistrationStatus::Waitlisted => {
                        records.push(Record::RegistrationCreated {
                            id: reg.id,
                            resource_id: guard.id,
                            subject: reg.subject,
                            waitlisted: true,
                            at: reg.requested_at,
                        });
                    }
                    RegistrationStatus::Canceled => {
                        // Recreate as waitlisted so the cancel touches no
                        // counter, then cancel to preserve the reason.
                        records.push(Record::RegistrationCreated {
                            id: reg.id,
                            resource_id: guard.id,
                            subject: reg.subject,
                            waitlisted: true,
                            at: reg.requested_at,
                        });
                        if reg.attended {
                            records.push(Record::RegistrationAttended {
                                id: reg.id,
                                resource_id: guard.id,
                            });
                        }
                        records.push(Record::RegistrationCanceled {
                            id: reg.id,
                            resource_id: guard.id,
                            reason: reg.cancel_reason.clone(),
                            promoted: None,
                        });
                    }
                }
            }

            for res in &guard.reservations {
                records.push(Record::ReservationRequested {
                    id: res.id,
                    resource_id: guard.id,
                    holder: res.holder,
                    purpose: res.purpose,
                    range: res.range,
                    at: res.requested_at,
                });
                match res.status {
                    ReservationStatus::Pending => {}
                    ReservationStatus::Approved => {
                        records.push(Record::ReservationApproved {
                            id: res.id,
                            resource_id: guard.id,
                        });
                    }
                    ReservationStatus::Rejected => {
                        records.push(Record::ReservationRejected {
                            id: res.id,
                            resource_id: guard.id,
                            reason: res.decision_reason.clone(),
                        });
                    }
                }
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                records,
                response: tx,
            })
            .await
            .map_err(|_| ScheduleError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| ScheduleError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| ScheduleError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
