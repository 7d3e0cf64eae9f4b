//! Store closure insights: cluster summaries, store search and forecast
//! calibration over precomputed clustering output.

pub mod config;
pub mod error;
pub mod filter;
pub mod forecast;
pub mod loader;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod report;
pub mod taxonomy;

pub use error::{DashboardError, DashboardResult};
pub use loader::{load, StoreCache};
pub use models::{Store, StoreTable};
pub use taxonomy::{ClusterFilter, ClusterLabel};
