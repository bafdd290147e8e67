pub mod aggregate;
pub mod fetcher;
pub mod narrow;
pub mod persist;
pub mod reader;
pub mod refresher;
pub mod source;
pub mod store;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod types;
pub mod validator;

pub use reader::CachedStatistics;
pub use refresher::{refresh_cache, Refresher};
pub use types::{RefreshOutcome, RefreshStats};
