//! Report rendering and analysis snapshots.

pub mod generator;
pub mod snapshot;

pub use generator::{
    generate_coalition_markdown, generate_json_report, generate_outlier_markdown,
    generate_prediction_markdown, write_report,
};
pub use snapshot::{build_snapshot, SnapshotCache};
