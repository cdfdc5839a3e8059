//! Engine services
//!
//! - `fetch_coordinator`: per-source fetch jobs and their tasks
//! - `aggregation`: deduplicated cross-job track list
//! - `preview`: rule set previews over enrichment views
//! - `fixture_fetcher`: file-backed fetcher used by the CLI

pub mod aggregation;
pub mod fetch_coordinator;
pub mod fixture_fetcher;
pub mod preview;

pub use aggregation::{aggregate_jobs, Aggregation, AggregationView, SourceSummary};
pub use fetch_coordinator::{SourceFetchCoordinator, TrackSourceFetcher, CANCELLED_MESSAGE};
pub use fixture_fetcher::FixtureFetcher;
pub use preview::{build_previews, Preview};
