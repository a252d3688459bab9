mod raw;
mod loader;
pub mod error;
pub mod settings;

pub use loader::{load_declarations, Declaration, Declarations};
pub use error::ConfigError;
pub use settings::{ProviderSettings, TimeoutSettings};
