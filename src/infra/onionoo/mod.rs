//! Onionoo relay weight histories, an alternative to consensus archives for
//! building a daily panel.

mod client;
mod history;

pub use client::{OnionooClient, PAGE_SIZE, WEIGHTS_URL};
pub use history::{
    History, HistoryWindow, RelayWeights, WeightSample, WeightsPage, nearest_daily_samples,
};
