pub mod azure;
pub mod client;
pub mod error;
pub mod local;

pub use azure::{AzureServiceBusClient, AzureServiceBusConfig};
pub use client::{AccessKeys, AuthorizationRule, QueuesClient, ReplicationWaiter};
pub use error::DriverError;
pub use local::LocalServiceBus;
