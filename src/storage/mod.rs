// storage/mod.rs
// Database operations module

pub mod cache;
pub mod lease;
pub mod migrations;
pub mod options;
pub mod pool;
pub mod scan_state;
pub mod settings;
#[cfg(test)]
pub mod test_helpers;

// Re-export commonly used items
pub use cache::SqliteResolutionCache;
pub use lease::{new_token, LeaseStore};
pub use migrations::run_migrations;
pub use options::OptionsStore;
pub use pool::init_db_pool_with_path;
pub use scan_state::{ScanState, ScanStateStore};
pub use settings::SqliteSettings;
