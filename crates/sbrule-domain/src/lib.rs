pub mod error;
pub mod types;
pub mod validate;


pub use error::DomainError;
pub use types::*;

/// Resource type name reported in "already exists" errors.
pub const RESOURCE_TYPE: &str = "azurerm_servicebus_queue_authorization_rule";
