//! Analysis modules.
//!
//! The outlier and coalition passes work on an in-memory snapshot loaded by
//! the store; the predictor reads the store directly for one bill.

pub mod aggregator;
pub mod coalitions;
pub mod louvain;
pub mod outliers;
pub mod predictor;
pub mod regression;

pub use coalitions::{analyze_coalitions, CoalitionParams};
pub use outliers::{analyze_outliers, OutlierParams};
pub use predictor::{predict_bill, BillPrediction};
