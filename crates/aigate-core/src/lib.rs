//! The gateway core: Quota Enforcer, Trace Store, Usage Sink, Streaming
//! Event Bus and the `Gateway` orchestrator that ties them to the Router
//! (§4.4-§4.8). `bootstrap` and `state` wire these into a process the way
//! the teacher's `gproxy-core` wires its own `AppState` from `CliArgs`.

pub mod bootstrap;
pub mod bus;
pub mod gateway;
pub mod quota;
pub mod state;
pub mod trace;
pub mod usage;

pub use bootstrap::{bootstrap, bootstrap_from_env, Bootstrap, CliArgs, RoutesFile};
pub use bus::{BusTopic, StreamingEventBus};
pub use gateway::{Gateway, GatewayError, GatewayOutcome, ModelRoute};
pub use quota::{PrincipalQuotaConfig, QuotaEnforcer, QuotaExceeded};
pub use state::{AppState, SecretLookup};
pub use trace::TraceStore;
pub use usage::{UsageAggregate, UsageSink};
