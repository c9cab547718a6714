//! HHR Queue Engine
//!
//! Store-and-forward core between HHR-Pro instances and SServer:
//! - [`QueueEngine`]: outbound backlog and single-flight drain loop
//! - [`StatusNotifier`]: per-subject delivery status pushed to origin servers
//! - [`PublisherRegistry`]: producer credentials
//! - [`RelayEngine`]: inbound relay and stale-record sweep
//! - [`QueueService`]: facade used by the HTTP layer and the [`RetryScheduler`]

pub mod attempt;
pub mod auth;
pub mod engine;
pub mod notifier;
pub mod publishers;
pub mod relay;
pub mod scheduler;
pub mod schema;
pub mod service;

pub use attempt::{Attempt, DeliveryAttempt};
pub use auth::AdminKey;
pub use engine::QueueEngine;
pub use notifier::StatusNotifier;
pub use publishers::PublisherRegistry;
pub use relay::{RelayEngine, SweepReport};
pub use scheduler::RetryScheduler;
pub use service::{QueueService, Remotes, Stores};
