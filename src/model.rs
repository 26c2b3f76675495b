use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds — the only time type. Callers normalize offset-aware
/// wall times to UTC instants before they reach the engine.
pub type Ms = i64;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// Two half-open intervals overlap iff `s1 < e2 && s2 < e1`.
    /// Touching endpoints do not overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Slot lifecycle. `Booked` is reachable only through `Engine::book`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotStatus {
    Available,
    Booked,
    Cancelled,
}

/// The statuses a provider may set directly on its own slot. A transition
/// into `Booked` is not representable here — booking is the engine's
/// exclusive privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderStatus {
    Available,
    Cancelled,
}

impl From<ProviderStatus> for SlotStatus {
    fn from(s: ProviderStatus) -> Self {
        match s {
            ProviderStatus::Available => SlotStatus::Available,
            ProviderStatus::Cancelled => SlotStatus::Cancelled,
        }
    }
}

/// A provider-owned, bookable time interval.
///
/// `metadata` is an opaque JSON document; the engine validates that it parses
/// and otherwise never looks inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub id: Ulid,
    pub provider_id: Ulid,
    pub span: Span,
    pub status: SlotStatus,
    pub metadata: Option<String>,
    pub created_at: Ms,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppointmentStatus {
    Confirmed,
    Cancelled,
    Completed,
}

/// The record of a successful reservation of one slot by one consumer.
/// References other entities by id only — no back-pointers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Ulid,
    pub slot_id: Ulid,
    pub provider_id: Ulid,
    pub consumer_id: Ulid,
    pub status: AppointmentStatus,
    pub created_at: Ms,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provider {
    pub id: Ulid,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Consumer {
    pub id: Ulid,
    pub name: Option<String>,
}

/// Overlap-index entry: one non-cancelled slot of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotEntry {
    pub id: Ulid,
    pub span: Span,
}

/// Per-provider state — the serialization domain for overlap checks.
///
/// `index` holds every non-cancelled slot sorted by `span.start`; it is the
/// consistent view the check-then-insert sequence validates against. Booked
/// slots cannot be rescheduled, cancelled, or deleted, so `book` never needs
/// to touch the index.
#[derive(Debug, Clone)]
pub struct ProviderState {
    pub id: Ulid,
    pub name: Option<String>,
    /// Non-cancelled slots, sorted by `span.start`.
    pub index: Vec<SlotEntry>,
    /// Every slot owned by this provider, in creation order.
    pub slot_ids: Vec<Ulid>,
}

impl ProviderState {
    pub fn new(id: Ulid, name: Option<String>) -> Self {
        Self {
            id,
            name,
            index: Vec::new(),
            slot_ids: Vec::new(),
        }
    }

    /// Insert an index entry maintaining sort order by span.start.
    pub fn insert_entry(&mut self, entry: SlotEntry) {
        let pos = self
            .index
            .binary_search_by_key(&entry.span.start, |e| e.span.start)
            .unwrap_or_else(|e| e);
        self.index.insert(pos, entry);
    }

    /// Remove an index entry by slot id.
    pub fn remove_entry(&mut self, id: Ulid) -> Option<SlotEntry> {
        self.index
            .iter()
            .position(|e| e.id == id)
            .map(|pos| self.index.remove(pos))
    }

    /// Return only entries whose span overlaps the query window.
    /// Uses binary search to skip entries starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &SlotEntry> {
        // Everything at index >= right_bound starts at or after query.end → can't overlap.
        let right_bound = self.index.partition_point(|e| e.span.start < query.end);
        self.index[..right_bound]
            .iter()
            .filter(move |e| e.span.end > query.start)
    }
}

/// The event types — flat, no nesting. This is the WAL record format.
///
/// `SlotBooked` carries both the slot transition and the appointment: the
/// available→booked write and the appointment insert are one WAL record, so
/// neither can be replayed without the other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ProviderRegistered {
        id: Ulid,
        name: Option<String>,
    },
    ConsumerRegistered {
        id: Ulid,
        name: Option<String>,
    },
    SlotCreated {
        id: Ulid,
        provider_id: Ulid,
        span: Span,
        metadata: Option<String>,
        created_at: Ms,
    },
    /// Carries the slot's full post-update state.
    SlotUpdated {
        id: Ulid,
        provider_id: Ulid,
        span: Span,
        status: SlotStatus,
        metadata: Option<String>,
    },
    SlotDeleted {
        id: Ulid,
        provider_id: Ulid,
    },
    SlotBooked {
        slot_id: Ulid,
        provider_id: Ulid,
        appointment_id: Ulid,
        consumer_id: Ulid,
        created_at: Ms,
    },
}

impl Event {
    /// The provider whose notification channel this event belongs on.
    pub fn provider_id(&self) -> Option<Ulid> {
        match self {
            Event::ProviderRegistered { id, .. } => Some(*id),
            Event::ConsumerRegistered { .. } => None,
            Event::SlotCreated { provider_id, .. }
            | Event::SlotUpdated { provider_id, .. }
            | Event::SlotDeleted { provider_id, .. }
            | Event::SlotBooked { provider_id, .. } => Some(*provider_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_basics() {
        let s = Span::new(100, 200);
        assert_eq!(s.duration_ms(), 100);
    }

    #[test]
    fn span_overlap() {
        let a = Span::new(100, 200);
        let b = Span::new(150, 250);
        let c = Span::new(200, 300);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
        assert!(!c.overlaps(&a));
    }

    #[test]
    fn span_single_ms_overlap() {
        let a = Span::new(100, 201);
        let b = Span::new(200, 300);
        assert!(a.overlaps(&b));
    }

    fn entry(start: Ms, end: Ms) -> SlotEntry {
        SlotEntry {
            id: Ulid::new(),
            span: Span::new(start, end),
        }
    }

    #[test]
    fn index_ordering() {
        let mut ps = ProviderState::new(Ulid::new(), None);
        ps.insert_entry(entry(300, 400));
        ps.insert_entry(entry(100, 200));
        ps.insert_entry(entry(200, 300));
        assert_eq!(ps.index[0].span.start, 100);
        assert_eq!(ps.index[1].span.start, 200);
        assert_eq!(ps.index[2].span.start, 300);
    }

    #[test]
    fn index_remove() {
        let mut ps = ProviderState::new(Ulid::new(), None);
        let e = entry(100, 200);
        ps.insert_entry(e);
        assert_eq!(ps.remove_entry(e.id).map(|r| r.span), Some(e.span));
        assert!(ps.index.is_empty());
        assert!(ps.remove_entry(e.id).is_none());
    }

    #[test]
    fn overlapping_skips_disjoint() {
        let mut ps = ProviderState::new(Ulid::new(), None);
        ps.insert_entry(entry(100, 200)); // past
        ps.insert_entry(entry(450, 600)); // hit
        ps.insert_entry(entry(1000, 1100)); // future

        let hits: Vec<_> = ps.overlapping(&Span::new(500, 800)).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].span, Span::new(450, 600));
    }

    #[test]
    fn overlapping_adjacent_not_included() {
        // Entry ending exactly at query.start is NOT overlapping (half-open)
        let mut ps = ProviderState::new(Ulid::new(), None);
        ps.insert_entry(entry(100, 200));
        let hits: Vec<_> = ps.overlapping(&Span::new(200, 300)).collect();
        assert!(hits.is_empty());
    }

    #[test]
    fn overlapping_wide_entry_spanning_query() {
        let mut ps = ProviderState::new(Ulid::new(), None);
        ps.insert_entry(entry(0, 10_000));
        let hits: Vec<_> = ps.overlapping(&Span::new(500, 600)).collect();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn overlapping_empty_index() {
        let ps = ProviderState::new(Ulid::new(), None);
        assert!(ps.overlapping(&Span::new(0, 1000)).next().is_none());
    }

    #[test]
    fn provider_status_into_slot_status() {
        assert_eq!(
            SlotStatus::from(ProviderStatus::Available),
            SlotStatus::Available
        );
        assert_eq!(
            SlotStatus::from(ProviderStatus::Cancelled),
            SlotStatus::Cancelled
        );
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::SlotBooked {
            slot_id: Ulid::new(),
            provider_id: Ulid::new(),
            appointment_id: Ulid::new(),
            consumer_id: Ulid::new(),
            created_at: 1_700_000_000_000,
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }

    #[test]
    fn event_provider_channel() {
        let pid = Ulid::new();
        let e = Event::SlotDeleted {
            id: Ulid::new(),
            provider_id: pid,
        };
        assert_eq!(e.provider_id(), Some(pid));
        assert_eq!(
            Event::ConsumerRegistered {
                id: Ulid::new(),
                name: None
            }
            .provider_id(),
            None
        );
    }
}
