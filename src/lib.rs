pub mod analysis;
pub mod api;
pub mod backfill;
pub mod error;
pub mod extractor;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod price_resolver;
pub mod reconciler;
pub mod store;
pub mod utils;
pub mod visualize;
