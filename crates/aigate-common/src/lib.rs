//! Shared data model for the gateway: the immutable per-request envelope,
//! the router's candidate/attempt bookkeeping, and the billing/trace records
//! that the rest of the workspace is built around.
//!
//! This crate intentionally carries no I/O. Everything here is plain data
//! plus the small amount of logic (`RequestEnvelope::remaining_deadline`,
//! ordinal bookkeeping) that every consumer would otherwise reimplement.

pub mod attempt;
pub mod breaker;
pub mod envelope;
pub mod quota;
pub mod trace;
pub mod usage;

pub use attempt::{Attempt, AttemptOutcome, Candidate, CompactedAttempt, ErrorClass};
pub use breaker::{BreakerParams, CircuitState, CircuitStatus};
pub use envelope::{ApiFamily, ControlRoomId, PrincipalId, RequestEnvelope, RequestId, Tag, TraceId};
pub use quota::{QuotaKind, QuotaReservationId, QuotaWindow, QuotaWindowSpec};
pub use trace::{TraceEvent, TraceEventKind};
pub use usage::{UsageRecord, UsageStatus};
