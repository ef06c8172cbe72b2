mod client;

pub use client::{CollectorClient, RECENT_BASE_URL};
