pub mod config;
pub mod error;
pub mod fetch;
pub mod infra;
pub mod offsets;
pub mod output;
pub mod parser;
pub mod pull;
pub mod services;
pub mod stability;
pub mod validate;
