//! The booking state machine: available → booked, exactly once per slot.

use std::time::Duration;

use tokio::sync::RwLockWriteGuard;
use ulid::Ulid;

use crate::model::*;

use super::overlap::now_ms;
use super::{Engine, EngineError};

impl Engine {
    /// Reserve `slot_id` for `consumer_id`, blocking until exclusive access
    /// to the slot record is granted.
    ///
    /// When callers race for the same slot, whoever acquires the lock first
    /// and observes `Available` wins; everyone after observes `Booked` and
    /// gets `SlotUnavailable`. The engine never retries on its own — whether
    /// a losing consumer tries again is the caller's policy.
    pub async fn book(
        &self,
        provider_id: Ulid,
        slot_id: Ulid,
        consumer_id: Ulid,
    ) -> Result<Appointment, EngineError> {
        let slot_arc = self
            .slot_arc(&slot_id)
            .ok_or(EngineError::SlotNotFound(slot_id))?;
        let _gate = self.compaction_gate.read().await;
        let guard = slot_arc.write().await;
        self.book_locked(provider_id, slot_id, consumer_id, guard)
            .await
    }

    /// Like [`Engine::book`], but gives up with `Timeout` if exclusive access
    /// is not granted within `wait`. A timed-out call has no effect. Once the
    /// lock is held the critical section always runs to completion.
    pub async fn book_within(
        &self,
        provider_id: Ulid,
        slot_id: Ulid,
        consumer_id: Ulid,
        wait: Duration,
    ) -> Result<Appointment, EngineError> {
        let slot_arc = self
            .slot_arc(&slot_id)
            .ok_or(EngineError::SlotNotFound(slot_id))?;
        // The wait budget covers both acquisitions, gate first.
        let (_gate, guard) = tokio::time::timeout(wait, async {
            let gate = self.compaction_gate.read().await;
            let guard = slot_arc.write().await;
            (gate, guard)
        })
        .await
        .map_err(|_| EngineError::Timeout { slot_id })?;
        self.book_locked(provider_id, slot_id, consumer_id, guard)
            .await
    }

    /// Steps 2–5 of the booking protocol, entered with the slot's write lock
    /// held. The slot state is re-read under the lock, never from a snapshot
    /// taken before it.
    async fn book_locked(
        &self,
        provider_id: Ulid,
        slot_id: Ulid,
        consumer_id: Ulid,
        mut slot: RwLockWriteGuard<'_, Slot>,
    ) -> Result<Appointment, EngineError> {
        // A concurrent delete may have won the lock first and detached the
        // record; the map is the source of truth for existence.
        if !self.slots.contains_key(&slot_id) {
            return Err(EngineError::SlotNotFound(slot_id));
        }
        if slot.provider_id != provider_id {
            return Err(EngineError::SlotProviderMismatch {
                slot_id,
                provider_id,
            });
        }
        if slot.status != SlotStatus::Available {
            metrics::counter!(crate::observability::BOOKINGS_LOST_TOTAL).increment(1);
            return Err(EngineError::SlotUnavailable {
                slot_id,
                status: slot.status,
            });
        }
        if !self.providers.contains_key(&provider_id) {
            return Err(EngineError::ProviderNotFound(provider_id));
        }
        if !self.consumers.contains_key(&consumer_id) {
            return Err(EngineError::ConsumerNotFound(consumer_id));
        }

        let appointment = Appointment {
            id: Ulid::new(),
            slot_id,
            provider_id,
            consumer_id,
            status: AppointmentStatus::Confirmed,
            created_at: now_ms(),
        };
        let event = Event::SlotBooked {
            slot_id,
            provider_id,
            appointment_id: appointment.id,
            consumer_id,
            created_at: appointment.created_at,
        };
        // One WAL record carries both writes. If the append fails nothing
        // below runs: the slot stays available and no appointment exists.
        self.wal_append(&event).await?;

        slot.status = SlotStatus::Booked;
        self.appointments
            .insert(appointment.id, appointment.clone());
        self.by_consumer
            .entry(consumer_id)
            .or_default()
            .push(appointment.id);
        self.notify.send(&event);
        metrics::counter!(crate::observability::BOOKINGS_CONFIRMED_TOTAL).increment(1);
        tracing::debug!(
            slot = %slot_id,
            consumer = %consumer_id,
            appointment = %appointment.id,
            "slot booked"
        );
        Ok(appointment)
    }
}
