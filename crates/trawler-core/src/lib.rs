pub mod config;
pub mod types;

pub use config::TrawlerConfig;
pub use types::*;
