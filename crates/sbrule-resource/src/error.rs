use std::time::Duration;

use sbrule_domain::DomainError;
use sbrule_driver::DriverError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error(
        "a resource with the ID {id:?} already exists - to be managed it needs to be imported into the state. \
         Please see `sbrule import` for {resource_type:?}"
    )]
    AlreadyExists {
        resource_type: &'static str,
        id: String,
    },

    #[error("{0} was not found")]
    NotFound(String),

    #[error("{operation} {id}: {source}")]
    Api {
        operation: &'static str,
        id: String,
        #[source]
        source: DriverError,
    },

    #[error(
        "waiting for replication to complete for Service Bus Namespace Disaster Recovery Configs \
         (Namespace {namespace:?} / Resource Group {resource_group:?}): {source}"
    )]
    Replication {
        namespace: String,
        resource_group: String,
        #[source]
        source: DriverError,
    },

    #[error("{operation} did not finish within {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("validation failed: {0}")]
    Validation(#[from] DomainError),

    #[error("parsing resource id {id:?}: {source}")]
    InvalidId {
        id: String,
        #[source]
        source: DomainError,
    },

    #[error("address {0:?} already tracks a resource; destroy or remove it before importing")]
    AddressInUse(String),

    #[error("store error: {0}")]
    Store(#[from] sbrule_store::StoreError),
}

impl ResourceError {
    pub(crate) fn api(operation: &'static str, id: &impl std::fmt::Display, source: DriverError) -> Self {
        ResourceError::Api {
            operation,
            id: id.to_string(),
            source,
        }
    }
}
