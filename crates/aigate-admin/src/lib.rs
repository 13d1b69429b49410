//! The admin HTTP surface (§6 persisted state inspection): usage listing,
//! trace query, breaker and quota snapshots. Kept thin on purpose — the
//! workspaces/users/api-key CRUD the teacher's own admin crate carries
//! belongs to an external auth collaborator this core never owns.

pub mod router;

pub use router::{router, AdminState};
