//! Candidate selection, weighted ordering, retry budget, and circuit
//! breaker gating for one request (§4.2). The Router is the only thing
//! that invokes Adapters; everything upstream of it deals in canonical
//! request/response shapes.

pub mod route_table;
pub mod router;
pub mod select;

pub use route_table::RouteTable;
pub use router::{
    BreakerTransition, ExecuteSuccess, Router, RouterConfig, RouterFailure, RouterFailureReason,
    StreamingSuccess,
};
pub use select::order_candidates;
