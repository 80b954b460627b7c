pub mod config;
pub mod error;
pub mod lines;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod textutil;
