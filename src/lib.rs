//! rota — a slot allocation and appointment-booking engine.
//!
//! Providers publish non-overlapping time slots; consumers race to book them.
//! The engine guarantees two things under true parallelism:
//! - a provider's non-cancelled slots never overlap in time, and
//! - a slot is booked by at most one consumer, with the slot transition and
//!   the appointment insert committed as a single atomic unit of work.
//!
//! State lives in memory and is made durable through an append-only WAL that
//! is replayed on startup. Identity, authorization, and the request surface
//! are the embedding service's problem; the engine trusts the ids it is given.

pub mod compactor;
pub mod engine;
mod limits;
pub mod model;
pub mod notify;
pub mod observability;
mod wal;

pub use engine::{Engine, EngineError};
pub use model::{
    Appointment, AppointmentStatus, Consumer, Event, Ms, Provider, ProviderStatus, Slot,
    SlotStatus, Span,
};
