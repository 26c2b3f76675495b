mod booking;
mod error;
mod overlap;
mod queries;
mod slots;

pub use error::EngineError;
pub use overlap::overlaps_any;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

pub type SharedProviderState = Arc<RwLock<ProviderState>>;
pub type SharedSlot = Arc<RwLock<Slot>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
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
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE)
                                .record(batch.len() as f64);
                            let flush_start = std::time::Instant::now();
                            let result = flush_batch(&mut wal, &mut batch);
                            metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
                                .record(flush_start.elapsed().as_secs_f64());
                            respond_batch(&mut batch, &result);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE)
                        .record(batch.len() as f64);
                    let flush_start = std::time::Instant::now();
                    let result = flush_batch(&mut wal, &mut batch);
                    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
                        .record(flush_start.elapsed().as_secs_f64());
                    respond_batch(&mut batch, &result);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_batch(
    wal: &mut Wal,
    batch: &mut [(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
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

fn respond_batch(batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
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
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// The booking engine: slots, appointments, and the registries they resolve
/// against, with two mutual-exclusion domains layered on top:
///
/// - per-provider (`providers` RwLocks) — serializes the check-then-insert
///   overlap validation for slot create/update/delete;
/// - per-slot (`slots` RwLocks) — serializes booking against every other
///   mutation of the same slot record.
///
/// Lock order is always gate → provider → slot. `book` takes only the gate
/// and the slot lock and resolves providers/consumers through plain map
/// lookups, so the order is never inverted.
pub struct Engine {
    pub(super) providers: DashMap<Ulid, SharedProviderState>,
    pub(super) slots: DashMap<Ulid, SharedSlot>,
    pub(super) consumers: DashMap<Ulid, Consumer>,
    pub(super) appointments: DashMap<Ulid, Appointment>,
    /// consumer id → appointment ids, in booking order.
    pub(super) by_consumer: DashMap<Ulid, Vec<Ulid>>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    /// Serializes compaction against in-flight commits. Every mutator holds
    /// it in read mode across its WAL append + in-memory apply; `compact_wal`
    /// holds it in write mode across its state snapshot + log swap. Without
    /// it, a record acked by the WAL writer but not yet applied to the maps
    /// would be in neither the snapshot nor the rewritten log.
    pub(super) compaction_gate: RwLock<()>,
    pub notify: Arc<NotifyHub>,
}

impl Engine {
    pub fn new(wal_path: PathBuf, notify: Arc<NotifyHub>) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            providers: DashMap::new(),
            slots: DashMap::new(),
            consumers: DashMap::new(),
            appointments: DashMap::new(),
            by_consumer: DashMap::new(),
            wal_tx,
            compaction_gate: RwLock::new(()),
            notify,
        };

        // Replay events — we're the sole owner of these Arcs, so try_write
        // always succeeds instantly (no contention). Never use blocking_write
        // here because this may run inside an async context.
        for event in &events {
            engine.apply_replayed(event);
        }

        Ok(engine)
    }

    /// Engine whose WAL writer is already gone: every append fails with
    /// `StorageFailure`. State is seeded through `apply_replayed`.
    #[cfg(test)]
    pub(super) fn with_disconnected_wal(notify: Arc<NotifyHub>) -> Self {
        let (wal_tx, _) = mpsc::channel(1);
        Self {
            providers: DashMap::new(),
            slots: DashMap::new(),
            consumers: DashMap::new(),
            appointments: DashMap::new(),
            by_consumer: DashMap::new(),
            wal_tx,
            compaction_gate: RwLock::new(()),
            notify,
        }
    }

    /// Rebuild state from one committed event. Replay-only: assumes the locks
    /// are uncontended and that the WAL was written in commit order, so
    /// referenced providers/slots already exist.
    fn apply_replayed(&self, event: &Event) {
        match event {
            Event::ProviderRegistered { id, name } => {
                self.providers.insert(
                    *id,
                    Arc::new(RwLock::new(ProviderState::new(*id, name.clone()))),
                );
            }
            Event::ConsumerRegistered { id, name } => {
                self.consumers.insert(
                    *id,
                    Consumer {
                        id: *id,
                        name: name.clone(),
                    },
                );
            }
            Event::SlotCreated {
                id,
                provider_id,
                span,
                metadata,
                created_at,
            } => {
                if let Some(ps) = self.provider_arc(provider_id) {
                    let mut guard = ps.try_write().expect("replay: uncontended write");
                    guard.insert_entry(SlotEntry { id: *id, span: *span });
                    guard.slot_ids.push(*id);
                    self.slots.insert(
                        *id,
                        Arc::new(RwLock::new(Slot {
                            id: *id,
                            provider_id: *provider_id,
                            span: *span,
                            status: SlotStatus::Available,
                            metadata: metadata.clone(),
                            created_at: *created_at,
                        })),
                    );
                }
            }
            Event::SlotUpdated {
                id,
                provider_id,
                span,
                status,
                metadata,
            } => {
                if let Some(ps) = self.provider_arc(provider_id)
                    && let Some(slot) = self.slot_arc(id)
                {
                    let mut guard = ps.try_write().expect("replay: uncontended write");
                    guard.remove_entry(*id);
                    if *status != SlotStatus::Cancelled {
                        guard.insert_entry(SlotEntry { id: *id, span: *span });
                    }
                    let mut s = slot.try_write().expect("replay: uncontended write");
                    s.span = *span;
                    s.status = *status;
                    s.metadata = metadata.clone();
                }
            }
            Event::SlotDeleted { id, provider_id } => {
                if let Some(ps) = self.provider_arc(provider_id) {
                    let mut guard = ps.try_write().expect("replay: uncontended write");
                    guard.remove_entry(*id);
                    guard.slot_ids.retain(|s| s != id);
                }
                self.slots.remove(id);
            }
            Event::SlotBooked {
                slot_id,
                provider_id,
                appointment_id,
                consumer_id,
                created_at,
            } => {
                if let Some(slot) = self.slot_arc(slot_id) {
                    let mut s = slot.try_write().expect("replay: uncontended write");
                    s.status = SlotStatus::Booked;
                    let appointment = Appointment {
                        id: *appointment_id,
                        slot_id: *slot_id,
                        provider_id: *provider_id,
                        consumer_id: *consumer_id,
                        status: AppointmentStatus::Confirmed,
                        created_at: *created_at,
                    };
                    self.appointments.insert(*appointment_id, appointment);
                    self.by_consumer
                        .entry(*consumer_id)
                        .or_default()
                        .push(*appointment_id);
                }
            }
        }
    }

    /// Write event to WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::StorageFailure("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::StorageFailure("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::StorageFailure(e.to_string()))
    }

    pub(super) fn provider_arc(&self, id: &Ulid) -> Option<SharedProviderState> {
        self.providers.get(id).map(|e| e.value().clone())
    }

    pub(super) fn slot_arc(&self, id: &Ulid) -> Option<SharedSlot> {
        self.slots.get(id).map(|e| e.value().clone())
    }

    /// Compact the WAL by rewriting it with only the events needed to
    /// recreate the current state: registries first, then slots, then the
    /// cancellations and bookings layered on top.
    ///
    /// Holds the compaction gate in write mode for the whole snapshot + swap,
    /// so no commit can be acked by the writer and then dropped from both the
    /// snapshot and the rewritten log.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _gate = self.compaction_gate.write().await;
        let mut events = Vec::new();

        let provider_arcs: Vec<SharedProviderState> =
            self.providers.iter().map(|e| e.value().clone()).collect();
        for ps in &provider_arcs {
            let guard = ps.read().await;
            events.push(Event::ProviderRegistered {
                id: guard.id,
                name: guard.name.clone(),
            });
        }

        for c in self.consumers.iter() {
            events.push(Event::ConsumerRegistered {
                id: c.id,
                name: c.name.clone(),
            });
        }

        let slot_arcs: Vec<SharedSlot> = self.slots.iter().map(|e| e.value().clone()).collect();
        let mut cancelled = Vec::new();
        for arc in &slot_arcs {
            let s = arc.read().await;
            events.push(Event::SlotCreated {
                id: s.id,
                provider_id: s.provider_id,
                span: s.span,
                metadata: s.metadata.clone(),
                created_at: s.created_at,
            });
            // SlotCreated replays as available; restate the cancellation.
            if s.status == SlotStatus::Cancelled {
                cancelled.push(Event::SlotUpdated {
                    id: s.id,
                    provider_id: s.provider_id,
                    span: s.span,
                    status: SlotStatus::Cancelled,
                    metadata: s.metadata.clone(),
                });
            }
        }
        events.extend(cancelled);

        for a in self.appointments.iter() {
            events.push(Event::SlotBooked {
                slot_id: a.slot_id,
                provider_id: a.provider_id,
                appointment_id: a.id,
                consumer_id: a.consumer_id,
                created_at: a.created_at,
            });
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::StorageFailure("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::StorageFailure("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::StorageFailure(e.to_string()))
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
