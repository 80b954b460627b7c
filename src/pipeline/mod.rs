pub mod batch;
mod config;
pub mod driver;
pub mod emit;
pub mod scores;
pub mod trace;

pub use config::{init_default_config, RunConfig, RunOverrides};
pub use driver::{BatchDriver, DriverOptions, RunSummary};
