//! Read-only views. Lists take per-record read locks only; they are
//! eventually consistent with in-flight mutations.

use ulid::Ulid;

use crate::model::*;

use super::{Engine, EngineError};

impl Engine {
    pub async fn get_slot(&self, slot_id: Ulid) -> Result<Slot, EngineError> {
        let arc = self
            .slot_arc(&slot_id)
            .ok_or(EngineError::SlotNotFound(slot_id))?;
        let guard = arc.read().await;
        Ok(guard.clone())
    }

    /// All slots of a provider (cancelled included), ordered by start time.
    pub async fn list_slots(&self, provider_id: Ulid) -> Result<Vec<Slot>, EngineError> {
        let ps = self
            .provider_arc(&provider_id)
            .ok_or(EngineError::ProviderNotFound(provider_id))?;
        let ids = { ps.read().await.slot_ids.clone() };

        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            // A concurrent delete between the id snapshot and here just
            // drops the slot from the listing.
            if let Some(arc) = self.slot_arc(&id) {
                out.push(arc.read().await.clone());
            }
        }
        out.sort_by_key(|s| s.span.start);
        Ok(out)
    }

    /// Only the slots a consumer could still book.
    pub async fn list_available(&self, provider_id: Ulid) -> Result<Vec<Slot>, EngineError> {
        let mut slots = self.list_slots(provider_id).await?;
        slots.retain(|s| s.status == SlotStatus::Available);
        Ok(slots)
    }

    pub async fn list_providers(&self) -> Vec<Provider> {
        let arcs: Vec<_> = self.providers.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::with_capacity(arcs.len());
        for ps in arcs {
            let guard = ps.read().await;
            out.push(Provider {
                id: guard.id,
                name: guard.name.clone(),
            });
        }
        out.sort_by_key(|p| p.id);
        out
    }

    pub fn get_consumer(&self, id: &Ulid) -> Option<Consumer> {
        self.consumers.get(id).map(|c| c.value().clone())
    }

    pub fn get_appointment(&self, id: &Ulid) -> Option<Appointment> {
        self.appointments.get(id).map(|a| a.value().clone())
    }

    /// A consumer's appointments ordered by creation time (ties keep booking
    /// order). Unknown consumers simply have no appointments.
    pub fn appointments_by_consumer(&self, consumer_id: Ulid) -> Vec<Appointment> {
        let ids = self
            .by_consumer
            .get(&consumer_id)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        let mut out: Vec<Appointment> = ids
            .iter()
            .filter_map(|id| self.appointments.get(id).map(|a| a.value().clone()))
            .collect();
        out.sort_by_key(|a| a.created_at);
        out
    }

    /// Appointment count across all consumers. Test and metrics helper.
    pub fn appointment_count(&self) -> usize {
        self.appointments.len()
    }

    #[cfg(test)]
    pub(super) fn slot_lock_handle(&self, slot_id: &Ulid) -> Option<super::SharedSlot> {
        self.slot_arc(slot_id)
    }
}
