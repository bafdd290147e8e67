pub mod config;
pub mod error;
pub mod summary;
pub mod types;

pub use config::Config;
pub use error::StopSearchError;
pub use summary::StatisticSummary;
pub use types::*;
