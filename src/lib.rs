pub mod config;
pub mod elasticsearch;
pub mod logging;
pub mod paths;
pub mod source;

// Re-export commonly used types
pub use config::Config;
pub use elasticsearch::{IndexDefinitionLoader, IndexFacade, IndexRegistry};
