pub mod price_snapshot_job;

pub use price_snapshot_job::{run_price_snapshot, RunReport};
