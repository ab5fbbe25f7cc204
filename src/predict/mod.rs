//! Prediction and inference
//!
//! Load the trained classifier with its scaler and predict live matches.

pub mod inference;
pub mod live;

pub use inference::{format_prediction, Predictor};
pub use live::{CounterPickEdge, LivePrediction, LiveReport, LiveService};
