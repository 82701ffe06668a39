pub mod batcher;
pub mod runner;

pub use batcher::EventBatcher;
pub use runner::{run_collector, tick};
