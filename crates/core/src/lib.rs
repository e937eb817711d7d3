pub mod config;
pub mod error;
pub mod executor;
pub mod types;

pub use config::AppConfig;
pub use error::CrawlError;
pub use executor::WorkExecutor;
pub use types::*;
