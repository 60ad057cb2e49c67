pub mod cache;
pub mod config;
pub mod delivery;
pub mod metrics_server;
pub mod observability;
pub mod pipeline;
pub mod scheduler;
pub mod sinks;
pub mod sources;
pub mod transform;

#[cfg(test)]
mod testing;

pub use cache::{BoundedRetryCache, SharedCache};
pub use delivery::{DeliveryError, DeliveryWriter};
pub use pipeline::{Bridge, Envelope, SourceEvent};
pub use scheduler::{RetryScheduler, TickOutcome};
