pub mod context;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod plan;
pub mod report;

#[cfg(test)]
mod testing;

pub use context::{ProviderContext, Timeouts};
pub use engine::Engine;
pub use error::ResourceError;
pub use handlers::{create_update, delete, import, read, Mode};
pub use plan::{plan, Plan};
pub use report::{Change, Report};
