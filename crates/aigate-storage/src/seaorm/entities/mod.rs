pub mod breaker_states;
pub mod quota_windows;
pub mod trace_events;
pub mod usage_records;

pub use breaker_states::Entity as BreakerStates;
pub use quota_windows::Entity as QuotaWindows;
pub use trace_events::Entity as TraceEvents;
pub use usage_records::Entity as UsageRecords;
