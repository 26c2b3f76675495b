//! Slot store: registries plus slot create/update/delete.
//!
//! Every mutation holds the compaction gate in read mode across its WAL
//! append and in-memory apply. Slot mutations additionally run inside the
//! owning provider's write lock, so the overlap check always sees all slots
//! of that provider as of commit; where a slot record itself changes, its own
//! write lock is taken as well (order: gate, provider, slot).

use std::sync::Arc;

use tokio::sync::RwLock;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::overlap::{find_conflict, now_ms, validate_interval, validate_metadata};
use super::{Engine, EngineError};

fn validate_name(name: Option<&str>) -> Result<(), EngineError> {
    if name.is_some_and(|n| n.len() > MAX_NAME_LEN) {
        return Err(EngineError::LimitExceeded("name too long"));
    }
    Ok(())
}

impl Engine {
    /// Register a resource provider. Ids come from the identity layer, which
    /// has already authenticated the party behind them.
    pub async fn register_provider(
        &self,
        id: Ulid,
        name: Option<String>,
    ) -> Result<(), EngineError> {
        validate_name(name.as_deref())?;
        let _gate = self.compaction_gate.read().await;
        if self.providers.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::ProviderRegistered {
            id,
            name: name.clone(),
        };
        self.wal_append(&event).await?;
        self.providers
            .insert(id, Arc::new(RwLock::new(ProviderState::new(id, name))));
        self.notify.send(&event);
        Ok(())
    }

    pub async fn register_consumer(
        &self,
        id: Ulid,
        name: Option<String>,
    ) -> Result<(), EngineError> {
        validate_name(name.as_deref())?;
        let _gate = self.compaction_gate.read().await;
        if self.consumers.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let event = Event::ConsumerRegistered {
            id,
            name: name.clone(),
        };
        self.wal_append(&event).await?;
        self.consumers.insert(id, Consumer { id, name });
        self.notify.send(&event);
        Ok(())
    }

    /// Create an available slot for `provider_id` over `[start, end)`.
    ///
    /// The overlap check runs under the provider's write lock against the
    /// current committed state, so two racing creates with overlapping
    /// intervals cannot both succeed.
    pub async fn create_slot(
        &self,
        provider_id: Ulid,
        start: Ms,
        end: Ms,
        metadata: Option<String>,
    ) -> Result<Slot, EngineError> {
        let span = validate_interval(start, end)?;
        validate_metadata(metadata.as_deref())?;
        let _gate = self.compaction_gate.read().await;
        let ps = self
            .provider_arc(&provider_id)
            .ok_or(EngineError::ProviderNotFound(provider_id))?;
        let mut guard = ps.write().await;

        if guard.slot_ids.len() >= MAX_SLOTS_PER_PROVIDER {
            return Err(EngineError::LimitExceeded("too many slots for provider"));
        }
        if let Some(conflicting) = find_conflict(&guard, &span, None) {
            metrics::counter!(crate::observability::SLOT_OVERLAP_REJECTED_TOTAL).increment(1);
            return Err(EngineError::SlotOverlap { conflicting });
        }

        let slot = Slot {
            id: Ulid::new(),
            provider_id,
            span,
            status: SlotStatus::Available,
            metadata,
            created_at: now_ms(),
        };
        let event = Event::SlotCreated {
            id: slot.id,
            provider_id,
            span,
            metadata: slot.metadata.clone(),
            created_at: slot.created_at,
        };
        self.wal_append(&event).await?;

        guard.insert_entry(SlotEntry {
            id: slot.id,
            span,
        });
        guard.slot_ids.push(slot.id);
        self.slots
            .insert(slot.id, Arc::new(RwLock::new(slot.clone())));
        self.notify.send(&event);
        metrics::counter!(crate::observability::SLOTS_CREATED_TOTAL).increment(1);
        tracing::debug!(slot = %slot.id, provider = %provider_id, "slot created");
        Ok(slot)
    }

    /// Reschedule a slot, optionally flipping it between available and
    /// cancelled or replacing its metadata.
    ///
    /// A booked slot cannot be updated: its interval belongs to the consumer
    /// who reserved it. The overlap check excludes the slot's own record. On
    /// any error the stored record is untouched.
    pub async fn update_slot(
        &self,
        provider_id: Ulid,
        slot_id: Ulid,
        start: Ms,
        end: Ms,
        status: Option<ProviderStatus>,
        metadata: Option<String>,
    ) -> Result<Slot, EngineError> {
        let span = validate_interval(start, end)?;
        validate_metadata(metadata.as_deref())?;
        let _gate = self.compaction_gate.read().await;
        let ps = self
            .provider_arc(&provider_id)
            .ok_or(EngineError::ProviderNotFound(provider_id))?;
        let mut guard = ps.write().await;

        let slot_arc = self
            .slot_arc(&slot_id)
            .ok_or(EngineError::SlotNotFound(slot_id))?;
        let mut slot = slot_arc.write().await;
        if slot.provider_id != provider_id {
            return Err(EngineError::NotOwner {
                slot_id,
                provider_id,
            });
        }
        if slot.status == SlotStatus::Booked {
            return Err(EngineError::SlotUnavailable {
                slot_id,
                status: slot.status,
            });
        }

        let new_status = status.map_or(slot.status, SlotStatus::from);
        if new_status != SlotStatus::Cancelled
            && let Some(conflicting) = find_conflict(&guard, &span, Some(slot_id))
        {
            metrics::counter!(crate::observability::SLOT_OVERLAP_REJECTED_TOTAL).increment(1);
            return Err(EngineError::SlotOverlap { conflicting });
        }

        // Metadata is only replaced when provided.
        let new_metadata = metadata.or_else(|| slot.metadata.clone());
        let event = Event::SlotUpdated {
            id: slot_id,
            provider_id,
            span,
            status: new_status,
            metadata: new_metadata.clone(),
        };
        self.wal_append(&event).await?;

        slot.span = span;
        slot.status = new_status;
        slot.metadata = new_metadata;
        guard.remove_entry(slot_id);
        if new_status != SlotStatus::Cancelled {
            guard.insert_entry(SlotEntry { id: slot_id, span });
        }
        self.notify.send(&event);
        tracing::debug!(slot = %slot_id, provider = %provider_id, "slot updated");
        Ok(slot.clone())
    }

    /// Delete a slot. A booked slot is never silently deleted — the provider
    /// has to resolve the appointment through whatever cancellation flow the
    /// embedding service offers first.
    pub async fn delete_slot(&self, provider_id: Ulid, slot_id: Ulid) -> Result<(), EngineError> {
        let _gate = self.compaction_gate.read().await;
        let ps = self
            .provider_arc(&provider_id)
            .ok_or(EngineError::ProviderNotFound(provider_id))?;
        let mut guard = ps.write().await;

        let slot_arc = self
            .slot_arc(&slot_id)
            .ok_or(EngineError::SlotNotFound(slot_id))?;
        let slot = slot_arc.write().await;
        if slot.provider_id != provider_id {
            return Err(EngineError::NotOwner {
                slot_id,
                provider_id,
            });
        }
        if slot.status == SlotStatus::Booked {
            return Err(EngineError::SlotUnavailable {
                slot_id,
                status: slot.status,
            });
        }

        let event = Event::SlotDeleted {
            id: slot_id,
            provider_id,
        };
        self.wal_append(&event).await?;

        guard.remove_entry(slot_id);
        guard.slot_ids.retain(|s| *s != slot_id);
        // Removed from the map while the slot's write lock is still held, so
        // a booker waiting on this lock re-checks presence and sees NotFound.
        self.slots.remove(&slot_id);
        self.notify.send(&event);
        tracing::debug!(slot = %slot_id, provider = %provider_id, "slot deleted");
        Ok(())
    }
}
